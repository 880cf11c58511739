//! Serial link manager
//!
//! Owns the connection to the sensing device and the dedicated reader thread.
//!
//! Lifecycle:
//! `Disconnected -> Connecting -> SelfTesting -> Connected -> Reading -> Disconnected`
//!
//! - [`SerialLink::connect`] discovers (or uses the configured) port, opens it,
//!   waits for the device to boot, flushes stale input and runs the self-test.
//! - [`SerialLink::start_reading`] moves the transport into the reader thread,
//!   which parses frames and forwards them to a sink.
//! - [`SerialLink::disconnect`] stops and joins the reader with a bounded
//!   timeout and closes the port. Calling it again is a no-op.
//!
//! Malformed lines and transient read errors are absorbed by the reader and
//! only show up in [`LinkStatistics`]; too many consecutive transport errors
//! end the reader and drop the link back to `Disconnected`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::codec::{self, ControlFrame, RawTelemetry};
use crate::config::LinkConfig;
use crate::error::{log_link_error, ErrorCode, LinkError};
use crate::telemetry::{DiagnosticError, TelemetryHub};
use crate::worker::{spawn_worker, WorkerHandle};

pub mod discovery;
pub mod stats;
pub mod stub;
pub mod transport;

pub use discovery::{is_candidate, list_candidate_ports, list_ports, PortDescriptor};
pub use stats::{LinkStatistics, LinkStatsHandle, LossEstimator};
pub use stub::{ScriptHandle, ScriptedTransport};
pub use transport::{LineAssembler, LinkTransport, LinkWriter, ReceivedLine, SerialTransport};

/// Good frames between two packet-loss metric events
const LOSS_REPORT_INTERVAL: u64 = 50;

/// Connection state of a [`SerialLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    SelfTesting = 2,
    Connected = 3,
    Reading = 4,
}

impl LinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LinkState::Connecting,
            2 => LinkState::SelfTesting,
            3 => LinkState::Connected,
            4 => LinkState::Reading,
            _ => LinkState::Disconnected,
        }
    }
}

/// Lock-free view of a link's state, valid after the link is moved
#[derive(Debug, Clone)]
pub struct LinkStateHandle(Arc<AtomicU8>);

impl LinkStateHandle {
    pub fn get(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// State shared between the link owner and its reader thread
#[derive(Clone)]
struct SharedState {
    state: Arc<AtomicU8>,
    hub: Arc<TelemetryHub>,
    port: Arc<std::sync::Mutex<Option<String>>>,
}

impl SharedState {
    fn get(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, next: LinkState) {
        let previous = LinkState::from_u8(self.state.swap(next as u8, Ordering::SeqCst));
        if previous != next {
            let port = self.port_name();
            tracing::debug!("[SerialLink] {:?} -> {:?}", previous, next);
            self.hub.record_link_state(next, port.as_deref());
        }
    }

    fn port_name(&self) -> Option<String> {
        self.port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_port_name(&self, name: Option<String>) {
        *self
            .port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = name;
    }
}

/// Result of a self-test that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfTestOutcome {
    /// At least the configured minimum of frames parsed
    Passed { frames: usize },
    /// Some frames parsed, fewer than the minimum
    Partial { frames: usize },
}

impl SelfTestOutcome {
    pub fn frames(&self) -> usize {
        match self {
            SelfTestOutcome::Passed { frames } | SelfTestOutcome::Partial { frames } => *frames,
        }
    }
}

/// Serial link to the sensing device
pub struct SerialLink {
    config: LinkConfig,
    shared: SharedState,
    stats: LinkStatsHandle,
    transport: Option<Box<dyn LinkTransport>>,
    writer: LinkWriter,
    reader: Option<WorkerHandle>,
}

impl SerialLink {
    pub fn new(config: LinkConfig, hub: Arc<TelemetryHub>) -> Self {
        Self {
            config,
            shared: SharedState {
                state: Arc::new(AtomicU8::new(LinkState::Disconnected as u8)),
                hub,
                port: Arc::new(std::sync::Mutex::new(None)),
            },
            stats: LinkStatsHandle::default(),
            transport: None,
            writer: LinkWriter::default(),
            reader: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.shared.get()
    }

    pub fn port_name(&self) -> Option<String> {
        self.shared.port_name()
    }

    /// Copy of the current counters
    pub fn statistics(&self) -> LinkStatistics {
        self.stats.snapshot()
    }

    /// State handle for observers that must not hold the link itself
    pub fn state_handle(&self) -> LinkStateHandle {
        LinkStateHandle(Arc::clone(&self.shared.state))
    }

    /// Shared handle that stays valid after the link is moved or dropped
    pub fn stats_handle(&self) -> LinkStatsHandle {
        self.stats.clone()
    }

    /// Cloneable writer for control frames
    pub fn writer(&self) -> LinkWriter {
        self.writer.clone()
    }

    /// Open the configured port (or the first discovered candidate) and self-test it
    pub fn connect(&mut self) -> Result<SelfTestOutcome, LinkError> {
        self.disconnect();
        self.shared.set(LinkState::Connecting);

        let port_name = match self.resolve_port() {
            Ok(name) => name,
            Err(err) => {
                log_link_error(&err, "connect");
                self.shared.set(LinkState::Disconnected);
                return Err(err);
            }
        };

        tracing::info!(
            "[SerialLink] Opening {} at {} baud",
            port_name,
            self.config.baud_rate
        );
        let transport = match SerialTransport::open(&port_name, &self.config) {
            Ok(transport) => transport,
            Err(err) => {
                log_link_error(&err, "connect");
                self.shared.set(LinkState::Disconnected);
                return Err(err);
            }
        };

        self.attach(&port_name, Box::new(transport))
    }

    /// Use an already-open transport: settle, flush stale input and self-test
    pub fn attach(
        &mut self,
        port_name: &str,
        mut transport: Box<dyn LinkTransport>,
    ) -> Result<SelfTestOutcome, LinkError> {
        if self.transport.is_some() || self.reader.is_some() {
            self.disconnect();
        }
        self.shared.set_port_name(Some(port_name.to_string()));
        self.stats.reset(Some(port_name.to_string()));
        self.shared.set(LinkState::Connecting);

        if self.config.settle_delay_ms > 0 {
            tracing::debug!(
                "[SerialLink] Waiting {} ms for device boot",
                self.config.settle_delay_ms
            );
            thread::sleep(Duration::from_millis(self.config.settle_delay_ms));
        }

        if let Err(e) = transport.clear_input() {
            let err = LinkError::from(e);
            log_link_error(&err, "attach");
            self.close();
            return Err(err);
        }

        match transport.try_clone_writer() {
            Ok(writer) => self.writer.replace(Some(writer)),
            Err(e) => tracing::warn!(
                "[SerialLink] No write handle for {}: {}. Control frames disabled.",
                port_name,
                e
            ),
        }

        self.transport = Some(transport);
        self.self_test()
    }

    /// Read for up to the self-test window and count parseable frames
    ///
    /// A link that produced no frame at all is closed.
    pub fn self_test(&mut self) -> Result<SelfTestOutcome, LinkError> {
        if self.reader.is_some() {
            return Err(LinkError::AlreadyReading);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(LinkError::NotConnected);
        };

        self.shared.set(LinkState::SelfTesting);
        let window = Duration::from_millis(self.config.self_test_window_ms);
        let poll = Duration::from_millis(self.config.self_test_poll_ms.max(1));
        let required = self.config.self_test_min_frames.max(1);
        let started = Instant::now();
        let mut frames = 0usize;

        while frames < required && started.elapsed() < window {
            let line = match transport.bytes_to_read() {
                Ok(0) => None,
                Ok(_) => transport.read_line().unwrap_or_else(|e| {
                    tracing::debug!("[SerialLink] Self-test read error: {}", e);
                    None
                }),
                Err(e) => {
                    tracing::debug!("[SerialLink] Self-test poll error: {}", e);
                    None
                }
            };

            match line {
                Some(ReceivedLine::Frame { text, .. }) => {
                    if codec::parse(&text).is_ok() {
                        frames += 1;
                    }
                }
                Some(ReceivedLine::Overflow { .. }) => {}
                None => thread::sleep(poll),
            }
        }

        if frames >= required {
            tracing::info!("[SerialLink] Self-test passed ({} frames)", frames);
            self.shared.set(LinkState::Connected);
            Ok(SelfTestOutcome::Passed { frames })
        } else if frames > 0 {
            tracing::warn!(
                "[SerialLink] Self-test partial: {} of {} frames within {:?}",
                frames,
                required,
                window
            );
            self.shared.set(LinkState::Connected);
            Ok(SelfTestOutcome::Partial { frames })
        } else {
            let err = LinkError::SelfTestFailed {
                window_ms: self.config.self_test_window_ms,
            };
            log_link_error(&err, "self_test");
            self.close();
            Err(err)
        }
    }

    /// Spawn the reader thread; every parsed frame is handed to `sink`
    pub fn start_reading<F>(&mut self, sink: F) -> Result<(), LinkError>
    where
        F: FnMut(RawTelemetry) + Send + 'static,
    {
        if self.reader.is_some() {
            return Err(LinkError::AlreadyReading);
        }
        let transport = self.transport.take().ok_or(LinkError::NotConnected)?;

        let reader = ReaderWorker {
            transport,
            sink,
            stats: self.stats.clone(),
            shared: self.shared.clone(),
            estimator: LossEstimator::from_config(&self.config),
            max_consecutive_errors: self.config.max_consecutive_errors.max(1),
            error_backoff: Duration::from_millis(self.config.error_backoff_ms),
            idle_poll: Duration::from_millis(self.config.idle_poll_ms),
        };

        self.shared.set(LinkState::Reading);
        match spawn_worker("serial-reader", move |stop| reader.run(stop)) {
            Ok(handle) => {
                self.reader = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = LinkError::ThreadSpawn {
                    reason: e.to_string(),
                };
                log_link_error(&err, "start_reading");
                self.close();
                Err(err)
            }
        }
    }

    /// True while the reader thread is alive
    pub fn is_reading(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Write one control frame to the device
    pub fn send(&self, frame: &dyn ControlFrame) -> Result<(), LinkError> {
        match self.writer.send(frame) {
            Ok(bytes) => {
                self.stats.update(|s| s.bytes_sent += bytes as u64);
                Ok(())
            }
            Err(err) => {
                if err != LinkError::NotConnected {
                    self.stats.update(|s| s.send_errors += 1);
                    self.shared.hub.record_error(
                        DiagnosticError::Transport,
                        format!("send failed ({}): {}", err.code(), err.message()),
                    );
                }
                Err(err)
            }
        }
    }

    /// Stop the reader, close the port and log final statistics
    ///
    /// Safe to call in any state; a second call does nothing.
    pub fn disconnect(&mut self) {
        if self.reader.is_none() && self.transport.is_none() && !self.writer.is_open() {
            if self.state() != LinkState::Disconnected {
                self.shared.set(LinkState::Disconnected);
            }
            return;
        }

        if let Some(reader) = self.reader.take() {
            if !reader.shutdown(self.config.join_timeout()) {
                tracing::warn!("[SerialLink] Reader thread abandoned after join timeout");
            }
        }
        self.close();

        let stats = self.stats.snapshot();
        tracing::info!(
            "[SerialLink] Disconnected from {}: {} packets, {} lost ({:.1}% loss), {} bytes received",
            stats.port_name.as_deref().unwrap_or("<unknown>"),
            stats.packets_received,
            stats.packets_lost,
            stats.loss_rate() * 100.0,
            stats.bytes_received
        );
    }

    fn close(&mut self) {
        self.transport = None;
        self.writer.replace(None);
        self.shared.set(LinkState::Disconnected);
    }

    fn resolve_port(&self) -> Result<String, LinkError> {
        if !self.config.is_auto() {
            return Ok(self.config.port.clone());
        }

        let candidates = list_candidate_ports(&self.config)?;
        let first = candidates.into_iter().next().ok_or(LinkError::NoDeviceFound)?;
        tracing::info!(
            "[SerialLink] Auto-selected {} ({})",
            first.name,
            first.description()
        );
        Ok(first.name)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Reader thread state; owns the transport for the lifetime of the thread
struct ReaderWorker<F> {
    transport: Box<dyn LinkTransport>,
    sink: F,
    stats: LinkStatsHandle,
    shared: SharedState,
    estimator: LossEstimator,
    max_consecutive_errors: u32,
    error_backoff: Duration,
    idle_poll: Duration,
}

impl<F> ReaderWorker<F>
where
    F: FnMut(RawTelemetry) + Send + 'static,
{
    fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            "[SerialLink] Reader thread started on {}",
            self.shared.port_name().as_deref().unwrap_or("<unknown>")
        );
        let mut consecutive_errors = 0u32;

        while !stop.load(Ordering::Relaxed) {
            match self.poll_line() {
                Ok(Some(ReceivedLine::Frame { text, bytes })) => {
                    consecutive_errors = 0;
                    self.handle_frame(&text, bytes);
                }
                Ok(Some(ReceivedLine::Overflow { bytes })) => {
                    consecutive_errors = 0;
                    self.handle_overflow(bytes);
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    thread::sleep(self.idle_poll);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    self.stats.update(|s| s.transport_errors += 1);
                    tracing::warn!(
                        "[SerialLink] Read error {}/{}: {}",
                        consecutive_errors,
                        self.max_consecutive_errors,
                        e
                    );
                    self.shared
                        .hub
                        .record_error(DiagnosticError::Transport, e.to_string());

                    if consecutive_errors >= self.max_consecutive_errors {
                        tracing::error!(
                            "[SerialLink] {} consecutive read errors, stopping reader",
                            consecutive_errors
                        );
                        self.shared.hub.record_error(
                            DiagnosticError::ReaderFailStop,
                            format!("{} consecutive read errors", consecutive_errors),
                        );
                        self.shared.set(LinkState::Disconnected);
                        return;
                    }
                    thread::sleep(self.error_backoff);
                }
            }
        }

        tracing::info!("[SerialLink] Reader thread stopped");
    }

    fn poll_line(&mut self) -> std::io::Result<Option<ReceivedLine>> {
        if self.transport.bytes_to_read()? == 0 {
            return Ok(None);
        }
        self.transport.read_line()
    }

    fn handle_frame(&mut self, line: &str, bytes: usize) {
        match codec::parse(line) {
            Ok(raw) => {
                let received = self.stats.update(|s| {
                    s.record_packet(raw.timestamp, bytes, &self.estimator);
                    s.packets_received
                });
                (self.sink)(raw);

                if received % LOSS_REPORT_INTERVAL == 0 {
                    let stats = self.stats.snapshot();
                    self.shared.hub.record_packet_loss(
                        stats.packets_received,
                        stats.packets_lost,
                        stats.loss_rate(),
                    );
                }
            }
            Err(err) => {
                self.stats.update(|s| s.record_malformed(bytes));
                tracing::debug!("[SerialLink] Dropped malformed frame {:?}: {}", line, err);
                self.shared
                    .hub
                    .record_error(DiagnosticError::MalformedFrame, err.to_string());
            }
        }
    }

    fn handle_overflow(&mut self, bytes: usize) {
        self.stats.update(|s| s.record_malformed(bytes));
        tracing::debug!("[SerialLink] Dropped {} bytes with no line terminator", bytes);
        self.shared.hub.record_error(
            DiagnosticError::MalformedFrame,
            format!("{} bytes without a line terminator", bytes),
        );
    }
}
