// Per-link counters and the inter-arrival packet loss estimator

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::LinkConfig;

/// Estimates frames missed between two successful receptions.
///
/// The device has no sequence numbers, so loss is inferred from the gap
/// between arrivals compared against the nominal frame interval. Gaps at or
/// below `gap_threshold` are treated as ordinary jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossEstimator {
    nominal_interval: f64,
    gap_threshold: f64,
}

impl LossEstimator {
    pub fn new(nominal_interval_secs: f64, gap_threshold_secs: f64) -> Self {
        Self {
            nominal_interval: nominal_interval_secs,
            gap_threshold: gap_threshold_secs,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(
            config.nominal_packet_interval_ms as f64 / 1000.0,
            config.loss_gap_threshold_ms as f64 / 1000.0,
        )
    }

    /// Frames presumed lost in a gap of `gap_secs`
    pub fn estimate(&self, gap_secs: f64) -> u64 {
        if self.nominal_interval <= 0.0 || gap_secs <= self.gap_threshold {
            return 0;
        }
        let expected = (gap_secs / self.nominal_interval) as u64;
        if expected > 2 {
            expected - 1
        } else {
            0
        }
    }
}

/// Counters owned by the link; callers only ever see copies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStatistics {
    pub bytes_received: u64,
    pub packets_received: u64,
    /// Estimated from arrival gaps plus one per malformed line
    pub packets_lost: u64,
    pub parse_errors: u64,
    pub transport_errors: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
    /// Receipt time of the last good frame, monotonic seconds
    pub last_packet_time: Option<f64>,
    pub port_name: Option<String>,
}

impl LinkStatistics {
    /// lost / (received + lost)
    pub fn loss_rate(&self) -> f64 {
        let total = self.packets_received + self.packets_lost;
        self.packets_lost as f64 / total.max(1) as f64
    }

    pub fn record_packet(&mut self, timestamp: f64, bytes: usize, estimator: &LossEstimator) {
        if let Some(last) = self.last_packet_time {
            self.packets_lost += estimator.estimate(timestamp - last);
        }
        self.bytes_received += bytes as u64;
        self.packets_received += 1;
        self.last_packet_time = Some(timestamp);
    }

    pub fn record_malformed(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.parse_errors += 1;
        self.packets_lost += 1;
    }
}

/// Shared handle to a link's statistics
#[derive(Debug, Clone, Default)]
pub struct LinkStatsHandle {
    inner: Arc<Mutex<LinkStatistics>>,
}

impl LinkStatsHandle {
    pub fn snapshot(&self) -> LinkStatistics {
        self.lock().clone()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut LinkStatistics) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn reset(&self, port_name: Option<String>) {
        *self.lock() = LinkStatistics {
            port_name,
            ..LinkStatistics::default()
        };
    }

    fn lock(&self) -> MutexGuard<'_, LinkStatistics> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
