// Analysis module - Feature extraction engine
//
// This module runs the feature engine: a dedicated worker that peeks at the
// raw telemetry buffer, computes one FeatureSnapshot per cycle and pushes it
// into the feature buffer for the consumer.
//
// Architecture:
// - FeatureEngine: capped-rate loop (default 100 Hz) owned by one thread
// - Pipeline: spectral -> rhythm -> harmonic -> envelope -> texture -> events -> visual
// - Output: FeatureSnapshot pushed to the feature buffer and broadcast to subscribers
//
// The engine re-processes the newest raw frame every cycle regardless of
// whether a new one arrived; the stateful analyzers tolerate repeats.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::buffer::BoundedBuffer;
use crate::codec::RawTelemetry;
use crate::config::EngineConfig;
use crate::control::ControlPublisher;
use crate::link::{LinkState, LinkStateHandle};
use crate::telemetry::TelemetryHub;
use crate::worker::{spawn_worker, WorkerHandle};

pub mod envelope;
pub mod features;
pub mod key;
pub mod tempo;

pub use envelope::{EnvelopeAnalyzer, EnvelopePhase};
pub use features::{
    EnvelopeFeatures, EventFeatures, FeatureExtractor, FeatureSnapshot, FrequencyBands,
    HarmonicFeatures, RhythmFeatures, SpectralFeatures, TextureFeatures, VisualFeatures,
};
pub use key::{KeyTracker, PitchClass};
pub use tempo::TempoTracker;

/// Cycles between two debug progress lines
const LOG_EVERY_N_CYCLES: u64 = 1000;

/// Processing counters shared between the engine thread and observers
#[derive(Debug, Default)]
pub struct EngineCounters {
    samples_processed: AtomicU64,
    total_processing_ns: AtomicU64,
}

impl EngineCounters {
    fn record(&self, elapsed: Duration) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
        self.total_processing_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EngineStatistics {
        let samples = self.samples_processed.load(Ordering::Relaxed);
        let total_ns = self.total_processing_ns.load(Ordering::Relaxed);
        EngineStatistics {
            samples_processed: samples,
            avg_processing_time: if samples == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(total_ns / samples)
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatistics {
    pub samples_processed: u64,
    /// Running mean of per-cycle compute time (sleep excluded)
    pub avg_processing_time: Duration,
}

/// Feature engine state, moved into its worker thread
pub struct FeatureEngine {
    raw: Arc<BoundedBuffer<RawTelemetry>>,
    features: Arc<BoundedBuffer<FeatureSnapshot>>,
    snapshot_tx: broadcast::Sender<FeatureSnapshot>,
    counters: Arc<EngineCounters>,
    hub: Arc<TelemetryHub>,
    extractor: FeatureExtractor,
    publisher: Option<ControlPublisher>,
    /// Serial source; cycles pause once it has dropped
    source: Option<LinkStateHandle>,
    window: usize,
    cycle_budget: Duration,
    idle_sleep: Duration,
}

impl FeatureEngine {
    pub fn new(
        config: &EngineConfig,
        raw: Arc<BoundedBuffer<RawTelemetry>>,
        features: Arc<BoundedBuffer<FeatureSnapshot>>,
        snapshot_tx: broadcast::Sender<FeatureSnapshot>,
        counters: Arc<EngineCounters>,
        hub: Arc<TelemetryHub>,
    ) -> Self {
        Self {
            raw,
            features,
            snapshot_tx,
            counters,
            hub,
            extractor: FeatureExtractor::new(config),
            publisher: None,
            source: None,
            window: config.analysis_window.max(1),
            cycle_budget: config.cycle_budget(),
            idle_sleep: Duration::from_millis(config.idle_sleep_ms.max(1)),
        }
    }

    /// Forward every snapshot to a control publisher
    pub fn with_publisher(mut self, publisher: ControlPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Stop producing snapshots once the link feeding the raw buffer is lost
    pub fn with_source(mut self, source: LinkStateHandle) -> Self {
        self.source = Some(source);
        self
    }

    fn source_lost(&self) -> bool {
        self.source
            .as_ref()
            .is_some_and(|source| source.get() == LinkState::Disconnected)
    }

    /// Run one cycle if enough data is buffered
    ///
    /// # Returns
    /// The snapshot produced, or `None` when fewer than two raw frames exist
    /// or the serial source has dropped
    pub fn process_once(&mut self) -> Option<FeatureSnapshot> {
        if self.raw.len() < 2 || self.source_lost() {
            return None;
        }

        let started = Instant::now();
        let history = self.raw.snapshot_tail(self.window);
        let current = *history.last()?;

        let snapshot = self.extractor.extract(&current, &history);
        self.features.push(snapshot.clone());
        // Lagging receivers lose old snapshots; the buffer stays authoritative
        if self.snapshot_tx.receiver_count() > 0 && self.snapshot_tx.send(snapshot.clone()).is_err() {
            tracing::debug!("[FeatureEngine] Last subscriber left before broadcast");
        }
        if let Some(publisher) = self.publisher.as_mut() {
            publisher.publish(&snapshot);
        }

        let elapsed = started.elapsed();
        self.counters.record(elapsed);
        self.hub.record_processing_time(elapsed.as_secs_f32() * 1000.0);
        self.hub
            .record_buffer_occupancy("raw", (self.raw.fill_ratio() * 100.0) as f32);
        self.hub
            .record_buffer_occupancy("features", (self.features.fill_ratio() * 100.0) as f32);

        Some(snapshot)
    }

    /// Main loop; returns once `stop` is set
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            "[FeatureEngine] Started (window {}, cycle budget {:?})",
            self.window,
            self.cycle_budget
        );

        let mut cycles = 0u64;
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            if self.process_once().is_none() {
                thread::sleep(self.idle_sleep);
                continue;
            }

            cycles += 1;
            if cycles % LOG_EVERY_N_CYCLES == 0 {
                let stats = self.counters.snapshot();
                tracing::debug!(
                    "[FeatureEngine] {} snapshots, avg {:?}/cycle, raw buffer {:.0}%",
                    stats.samples_processed,
                    stats.avg_processing_time,
                    self.raw.fill_ratio() * 100.0
                );
            }

            // Never sleep a negative remainder
            let spent = started.elapsed();
            thread::sleep(self.cycle_budget.saturating_sub(spent));
        }

        tracing::info!(
            "[FeatureEngine] Stopped after {} snapshots",
            self.counters.snapshot().samples_processed
        );
    }
}

/// Spawn the engine on its own named thread
pub fn spawn_feature_engine(engine: FeatureEngine) -> std::io::Result<WorkerHandle> {
    spawn_worker("feature-engine", move |stop| engine.run(stop))
}
