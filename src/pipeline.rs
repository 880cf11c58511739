// Pipeline: consumer-facing boundary of the acquisition pipeline
//
// Owns the two bounded buffers, the serial link (when enabled) and the
// feature engine thread. Consumers poll latest_snapshot()/recent_snapshots()
// or subscribe to the snapshot broadcast; neither path ever blocks the engine
// for longer than one buffer copy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::analysis::{spawn_feature_engine, EngineCounters, FeatureEngine, FeatureSnapshot};
use crate::buffer::BoundedBuffer;
use crate::codec::RawTelemetry;
use crate::config::AppConfig;
use crate::control::ControlPublisher;
use crate::error::{log_pipeline_error, LinkError, PipelineError};
use crate::link::{
    LinkState, LinkStateHandle, LinkStatistics, LinkStatsHandle, LinkTransport, SelfTestOutcome,
    SerialLink,
};
use crate::telemetry::TelemetryHub;
use crate::worker::WorkerHandle;

/// Point-in-time view of pipeline health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatistics {
    pub samples_processed: u64,
    /// Occupancy of the feature snapshot buffer, 0.0..=1.0
    pub buffer_fill_ratio: f64,
    /// Occupancy of the raw telemetry buffer, 0.0..=1.0
    pub raw_fill_ratio: f64,
    pub avg_processing_time: Duration,
    /// False once stopped or once the serial link has been lost
    pub running: bool,
    /// State of the link in use, `None` on an external feed or when stopped
    pub link_state: Option<LinkState>,
    /// The reader gave up and the link dropped while the pipeline was started
    pub link_failed: bool,
    /// Present once a serial link has been attached
    pub link: Option<LinkStatistics>,
}

/// Threads and link owned by a running pipeline
#[derive(Default)]
struct RunState {
    link: Option<SerialLink>,
    engine: Option<WorkerHandle>,
}

/// Where raw frames come from
enum LinkSource<'a> {
    /// Frames arrive through submit()
    External,
    /// Open the configured or first discovered port
    Discover,
    Attach {
        port_name: &'a str,
        transport: Box<dyn LinkTransport>,
    },
}

pub struct Pipeline {
    config: AppConfig,
    hub: Arc<TelemetryHub>,
    raw: Arc<BoundedBuffer<RawTelemetry>>,
    features: Arc<BoundedBuffer<FeatureSnapshot>>,
    snapshot_tx: broadcast::Sender<FeatureSnapshot>,
    counters: Arc<EngineCounters>,
    /// Set for the whole of start(), including the link self-test
    starting: AtomicBool,
    running: AtomicBool,
    /// Only ever locked to install or take handles, never across I/O
    run_state: Mutex<RunState>,
    link_state: Mutex<Option<LinkStateHandle>>,
    link_stats: Mutex<Option<LinkStatsHandle>>,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        for warning in config.warnings() {
            tracing::warn!("[Pipeline] Config: {}", warning);
        }

        let engine = &config.engine;
        let (snapshot_tx, _) = broadcast::channel(engine.snapshot_channel_capacity.max(1));
        Self {
            raw: Arc::new(BoundedBuffer::new(engine.raw_capacity)),
            features: Arc::new(BoundedBuffer::new(engine.feature_capacity)),
            snapshot_tx,
            counters: Arc::new(EngineCounters::default()),
            hub: Arc::new(TelemetryHub::default()),
            starting: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_state: Mutex::new(RunState::default()),
            link_state: Mutex::new(None),
            link_stats: Mutex::new(None),
            config,
        }
    }

    /// Start acquisition and feature extraction
    ///
    /// With `link.enabled` the serial link is connected (auto-discovery or
    /// the configured port) and self-tested first; a link failure is returned
    /// and nothing is left running. Without a link, frames come from submit().
    ///
    /// Observers are not blocked while the link settles and self-tests;
    /// link_state() reports its progress.
    ///
    /// # Errors
    /// - `AlreadyRunning` if the pipeline is running or another start() is in progress
    /// - `Link` if the device could not be opened or failed its self-test
    /// - `ThreadSpawn` if a worker thread could not be created
    pub fn start(&self) -> Result<(), PipelineError> {
        let source = if self.config.link.enabled {
            LinkSource::Discover
        } else {
            LinkSource::External
        };
        self.start_from(source)
    }

    /// Start on an already-open transport instead of discovering a port
    ///
    /// The transport still goes through the settle delay and self-test.
    pub fn start_with_transport(
        &self,
        port_name: &str,
        transport: Box<dyn LinkTransport>,
    ) -> Result<(), PipelineError> {
        self.start_from(LinkSource::Attach {
            port_name,
            transport,
        })
    }

    fn start_from(&self, source: LinkSource<'_>) -> Result<(), PipelineError> {
        if self
            .starting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = PipelineError::AlreadyRunning;
            log_pipeline_error(&err, "start");
            return Err(err);
        }

        let result = self.start_unguarded(source);
        self.starting.store(false, Ordering::SeqCst);
        if let Err(err) = &result {
            log_pipeline_error(err, "start");
        }
        result
    }

    fn start_unguarded(&self, source: LinkSource<'_>) -> Result<(), PipelineError> {
        if self.lock_run_state().engine.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let link = match source {
            LinkSource::External => None,
            LinkSource::Discover => Some(self.open_link(|link| link.connect())?),
            LinkSource::Attach {
                port_name,
                transport,
            } => Some(self.open_link(|link| link.attach(port_name, transport))?),
        };

        let mut engine = FeatureEngine::new(
            &self.config.engine,
            Arc::clone(&self.raw),
            Arc::clone(&self.features),
            self.snapshot_tx.clone(),
            Arc::clone(&self.counters),
            Arc::clone(&self.hub),
        );
        if let Some(link) = link.as_ref() {
            engine = engine.with_source(link.state_handle());
            if self.config.control.enabled {
                engine = engine.with_publisher(ControlPublisher::new(
                    &self.config.control,
                    link.writer(),
                    Arc::clone(&self.hub),
                ));
            }
        }

        let handle = match spawn_feature_engine(engine) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(mut link) = link {
                    link.disconnect();
                }
                *lock_or_recover(&self.link_state) = None;
                return Err(PipelineError::ThreadSpawn {
                    reason: e.to_string(),
                });
            }
        };

        let serial = link.is_some();
        {
            let mut state = self.lock_run_state();
            state.link = link;
            state.engine = Some(handle);
        }
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "[Pipeline] Started ({})",
            if serial { "serial link" } else { "external feed" }
        );
        Ok(())
    }

    /// Connect a fresh link and start its reader, without holding `run_state`
    fn open_link<F>(&self, establish: F) -> Result<SerialLink, PipelineError>
    where
        F: FnOnce(&mut SerialLink) -> Result<SelfTestOutcome, LinkError>,
    {
        let mut link = SerialLink::new(self.config.link.clone(), Arc::clone(&self.hub));
        *lock_or_recover(&self.link_state) = Some(link.state_handle());

        let outcome = match establish(&mut link) {
            Ok(outcome) => outcome,
            Err(err) => {
                *lock_or_recover(&self.link_state) = None;
                return Err(PipelineError::from(err));
            }
        };
        tracing::info!(
            "[Pipeline] Link ready on {} ({} self-test frames)",
            link.port_name().unwrap_or_default(),
            outcome.frames()
        );

        let raw = Arc::clone(&self.raw);
        if let Err(err) = link.start_reading(move |frame| raw.push(frame)) {
            *lock_or_recover(&self.link_state) = None;
            return Err(PipelineError::from(err));
        }
        *lock_or_recover(&self.link_stats) = Some(link.stats_handle());
        Ok(link)
    }

    /// Stop the engine and the link
    ///
    /// Safe to call repeatedly; a stopped pipeline is left untouched.
    pub fn stop(&self) {
        let (engine, link) = {
            let mut state = self.lock_run_state();
            (state.engine.take(), state.link.take())
        };
        if engine.is_none() && link.is_none() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        if let Some(engine) = engine {
            if !engine.shutdown(self.config.engine.join_timeout()) {
                tracing::warn!("[Pipeline] Feature engine abandoned after join timeout");
            }
        }
        if let Some(mut link) = link {
            link.disconnect();
        }
        *lock_or_recover(&self.link_state) = None;

        let stats = self.counters.snapshot();
        tracing::info!(
            "[Pipeline] Stopped: {} snapshots, avg {:?}/cycle",
            stats.samples_processed,
            stats.avg_processing_time
        );
    }

    /// True between a successful start() and stop(), unless the link was lost
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.link_failed()
    }

    /// The serial reader gave up while the pipeline was started
    ///
    /// The pipeline stays allocated until stop() is called.
    pub fn link_failed(&self) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.link_state() == Some(LinkState::Disconnected)
    }

    /// Feed one frame from an external source
    ///
    /// Works whether or not a link is attached; frames share the raw buffer.
    pub fn submit(&self, frame: RawTelemetry) {
        self.raw.push(frame);
    }

    pub fn latest_snapshot(&self) -> Option<FeatureSnapshot> {
        self.features.latest()
    }

    /// Up to `n` most recent snapshots, oldest first
    pub fn recent_snapshots(&self, n: usize) -> Vec<FeatureSnapshot> {
        self.features.snapshot_tail(n)
    }

    /// Push-style access to every snapshot the engine produces
    pub fn subscribe(&self) -> broadcast::Receiver<FeatureSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn statistics(&self) -> PipelineStatistics {
        let engine = self.counters.snapshot();
        PipelineStatistics {
            samples_processed: engine.samples_processed,
            buffer_fill_ratio: self.features.fill_ratio(),
            raw_fill_ratio: self.raw.fill_ratio(),
            avg_processing_time: engine.avg_processing_time,
            running: self.is_running(),
            link_state: self.link_state(),
            link_failed: self.link_failed(),
            link: lock_or_recover(&self.link_stats)
                .as_ref()
                .map(LinkStatsHandle::snapshot),
        }
    }

    /// State of the link in use, `None` on an external feed or when stopped
    ///
    /// Also reports progress while start() is connecting and self-testing.
    pub fn link_state(&self) -> Option<LinkState> {
        lock_or_recover(&self.link_state)
            .as_ref()
            .map(LinkStateHandle::get)
    }

    pub fn hub(&self) -> Arc<TelemetryHub> {
        Arc::clone(&self.hub)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn lock_run_state(&self) -> MutexGuard<'_, RunState> {
        lock_or_recover(&self.run_state)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
