// In-memory transport for exercising the link without hardware

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use super::transport::{LinkTransport, ReceivedLine};

#[derive(Debug)]
enum ScriptItem {
    Line(String),
    /// Run of input longer than the frame limit
    Oversized(usize),
    Fault(ErrorKind),
}

#[derive(Debug, Default)]
struct ScriptState {
    queue: VecDeque<ScriptItem>,
    written: Vec<u8>,
    /// Every read fails while set
    failing: bool,
    cleared: usize,
}

/// Scripted stand-in for a serial port
///
/// Lines pushed through the paired [`ScriptHandle`] are delivered one per
/// `read_line` call, each counted as if it had arrived with a `\n`.
/// Everything written through the link is captured.
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

/// Test-side control of a [`ScriptedTransport`]
#[derive(Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Transport plus the handle that scripts it
    pub fn pair() -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptHandle { state },
        )
    }
}

impl ScriptHandle {
    pub fn push_line(&self, line: impl Into<String>) {
        lock(&self.state).queue.push_back(ScriptItem::Line(line.into()));
    }

    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = lock(&self.state);
        for line in lines {
            state.queue.push_back(ScriptItem::Line(line.into()));
        }
    }

    /// Queue input that overran the frame limit before any newline
    pub fn push_oversized(&self, bytes: usize) {
        lock(&self.state).queue.push_back(ScriptItem::Oversized(bytes));
    }

    /// Queue a single transient read failure
    pub fn push_fault(&self, kind: ErrorKind) {
        lock(&self.state).queue.push_back(ScriptItem::Fault(kind));
    }

    /// Make every subsequent read fail (cable pulled)
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Times the input was flushed
    pub fn clear_count(&self) -> usize {
        lock(&self.state).cleared
    }

    /// Everything written to the transport so far
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&lock(&self.state).written).into_owned()
    }
}

impl LinkTransport for ScriptedTransport {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let state = lock(&self.state);
        if state.failing {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted link failure"));
        }
        Ok(state
            .queue
            .iter()
            .map(|item| match item {
                ScriptItem::Line(line) => line.len() + 1,
                ScriptItem::Oversized(bytes) => *bytes,
                ScriptItem::Fault(_) => 1,
            })
            .sum())
    }

    fn read_line(&mut self) -> io::Result<Option<ReceivedLine>> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted link failure"));
        }
        match state.queue.pop_front() {
            Some(ScriptItem::Line(line)) => Ok(Some(ReceivedLine::Frame {
                text: line.trim_end().to_string(),
                bytes: line.len() + 1,
            })),
            Some(ScriptItem::Oversized(bytes)) => Ok(Some(ReceivedLine::Overflow { bytes })),
            Some(ScriptItem::Fault(kind)) => Err(io::Error::new(kind, "scripted fault")),
            None => Ok(None),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.queue.clear();
        state.cleared += 1;
        Ok(())
    }

    fn try_clone_writer(&self) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(ScriptWriter {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptWriter {
    state: Arc<Mutex<ScriptState>>,
}

impl Write for ScriptWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.state);
        if state.failing {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "scripted link failure"));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_delivered_in_order() {
        let (mut transport, handle) = ScriptedTransport::pair();
        handle.push_lines(["AMP:1", "AMP:2"]);
        handle.push_line("BEAT:1\r");
        handle.push_oversized(600);
        assert_eq!(transport.bytes_to_read().unwrap(), 12 + 8 + 600);

        let frame = |text: &str, bytes| Some(ReceivedLine::Frame {
            text: text.to_string(),
            bytes,
        });
        assert_eq!(transport.read_line().unwrap(), frame("AMP:1", 6));
        assert_eq!(transport.read_line().unwrap(), frame("AMP:2", 6));
        assert_eq!(transport.read_line().unwrap(), frame("BEAT:1", 8));
        assert_eq!(
            transport.read_line().unwrap(),
            Some(ReceivedLine::Overflow { bytes: 600 })
        );
        assert_eq!(transport.read_line().unwrap(), None);
    }

    #[test]
    fn test_faults_and_failing_mode() {
        let (mut transport, handle) = ScriptedTransport::pair();
        handle.push_fault(ErrorKind::Interrupted);
        handle.push_line("AMP:1");
        assert!(transport.read_line().is_err());
        assert!(transport.read_line().unwrap().is_some());

        handle.set_failing(true);
        assert!(transport.bytes_to_read().is_err());
        let mut writer = transport.try_clone_writer().unwrap();
        assert!(writer.write_all(b"X\n").is_err());
    }

    #[test]
    fn test_clear_input_and_written_capture() {
        let (mut transport, handle) = ScriptedTransport::pair();
        handle.push_line("stale");
        transport.clear_input().unwrap();
        assert_eq!(handle.pending(), 0);
        assert_eq!(handle.clear_count(), 1);

        let mut writer = transport.try_clone_writer().unwrap();
        writer.write_all(b"CLEAR_WINDINGS\n").unwrap();
        assert_eq!(handle.written(), "CLEAR_WINDINGS\n");
    }
}
