// Transport seam between the link manager and the byte stream it reads

use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use serialport::{ClearBuffer, SerialPort};

use crate::codec::{format_frame, ControlFrame};
use crate::config::LinkConfig;
use crate::error::LinkError;

/// Line-oriented byte stream owned by the reader thread
///
/// Implemented by [`SerialTransport`] for real ports and by
/// [`ScriptedTransport`](super::ScriptedTransport) for tests.
pub trait LinkTransport: Send {
    /// Bytes available without blocking
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Next complete (or dropped oversized) line, or `None` on timeout
    fn read_line(&mut self) -> io::Result<Option<ReceivedLine>>;

    /// Discard anything received so far
    fn clear_input(&mut self) -> io::Result<()>;

    /// Independent handle for writing control frames
    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>>;
}

const READ_CHUNK: usize = 256;

/// One unit of input taken off the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedLine {
    /// Line with its terminator stripped; `bytes` is the raw length including `\r\n`
    Frame { text: String, bytes: usize },
    /// Input that reached the frame limit without a newline and was dropped
    Overflow { bytes: usize },
}

impl ReceivedLine {
    pub fn bytes(&self) -> usize {
        match self {
            ReceivedLine::Frame { bytes, .. } | ReceivedLine::Overflow { bytes } => *bytes,
        }
    }
}

/// Splits a byte stream into newline-terminated lines
///
/// Never holds more than `max_frame_bytes` of input and searches each byte
/// for a terminator only once.
#[derive(Debug)]
pub struct LineAssembler {
    pending: Vec<u8>,
    /// Prefix of `pending` known to contain no newline
    scanned: usize,
    max_frame_bytes: usize,
}

impl LineAssembler {
    pub fn new(max_frame_bytes: usize) -> Self {
        let max_frame_bytes = max_frame_bytes.max(1);
        Self {
            pending: Vec::with_capacity(max_frame_bytes),
            scanned: 0,
            max_frame_bytes,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buffered input that may still hold a complete line
    pub fn has_unscanned(&self) -> bool {
        self.scanned < self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.scanned = 0;
    }

    /// Take the next line out of the buffered input
    ///
    /// A full buffer with no newline is dropped and reported as an overflow;
    /// whatever follows up to the next newline arrives as its own line.
    pub fn next_line(&mut self) -> Option<ReceivedLine> {
        match self.pending[self.scanned..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let end = self.scanned + offset;
                let text = String::from_utf8_lossy(&self.pending[..end])
                    .trim_end()
                    .to_string();
                self.pending.drain(..=end);
                self.scanned = 0;
                Some(ReceivedLine::Frame {
                    text,
                    bytes: end + 1,
                })
            }
            None if self.pending.len() >= self.max_frame_bytes => {
                let bytes = self.pending.len();
                self.clear();
                Some(ReceivedLine::Overflow { bytes })
            }
            None => {
                self.scanned = self.pending.len();
                None
            }
        }
    }

    /// Read at most one chunk from `source` and return the next line
    ///
    /// Reads are sized so the buffer never grows past the frame limit.
    /// Timeouts yield `None`.
    pub fn read_from<R: Read + ?Sized>(
        &mut self,
        source: &mut R,
    ) -> io::Result<Option<ReceivedLine>> {
        if let Some(line) = self.next_line() {
            return Ok(Some(line));
        }

        let room = (self.max_frame_bytes - self.pending.len()).min(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        match source.read(&mut chunk[..room]) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(self.next_line())
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Transport over an open serial port
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    lines: LineAssembler,
}

impl SerialTransport {
    /// Open `port_name` with the configured baud rate and read timeout
    pub fn open(port_name: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| LinkError::OpenFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::new(port, config.max_frame_bytes))
    }

    pub fn new(port: Box<dyn SerialPort>, max_frame_bytes: usize) -> Self {
        Self {
            port,
            lines: LineAssembler::new(max_frame_bytes),
        }
    }
}

impl LinkTransport for SerialTransport {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        let buffered = if self.lines.has_unscanned() {
            self.lines.pending_len()
        } else {
            0
        };
        Ok(waiting + buffered)
    }

    fn read_line(&mut self) -> io::Result<Option<ReceivedLine>> {
        self.lines.read_from(&mut self.port)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.lines.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(io::Error::from)
    }

    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        let clone = self.port.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(clone))
    }
}

/// Cloneable handle for sending control frames over the link
///
/// All clones share one underlying writer; closing the link closes every clone.
#[derive(Clone, Default)]
pub struct LinkWriter {
    inner: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
}

impl LinkWriter {
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Write one newline-terminated frame; returns the bytes written
    pub fn send(&self, frame: &dyn ControlFrame) -> Result<usize, LinkError> {
        let line = format_frame(frame);
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or(LinkError::NotConnected)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        Ok(line.len())
    }

    pub(crate) fn replace(&self, writer: Option<Box<dyn Write + Send>>) {
        *self.lock() = writer;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for LinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkWriter")
            .field("open", &self.is_open())
            .finish()
    }
}
