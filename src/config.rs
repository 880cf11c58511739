//! Configuration management for the acquisition pipeline
//!
//! This module provides runtime configuration loading from JSON files so the
//! link timings, buffer capacities and engine rate can be tuned without
//! recompilation. Missing or malformed files fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub link: LinkConfig,
    pub engine: EngineConfig,
    pub control: ControlConfig,
}

/// Serial link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Acquire telemetry from the serial link; when false the pipeline is fed via submit()
    pub enabled: bool,
    /// Port path, or "auto" to pick the first candidate device
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout on the port
    pub read_timeout_ms: u64,
    /// Longest line accepted from the device; longer input is dropped as one lost frame
    pub max_frame_bytes: usize,
    /// Device boot time after opening the port
    pub settle_delay_ms: u64,
    pub self_test_window_ms: u64,
    /// Frames required for a clean self-test pass
    pub self_test_min_frames: usize,
    pub self_test_poll_ms: u64,
    /// Transport failures in a row before the reader gives up
    pub max_consecutive_errors: u32,
    pub error_backoff_ms: u64,
    pub idle_poll_ms: u64,
    /// Nominal device frame interval used by the loss estimator (50 Hz)
    pub nominal_packet_interval_ms: u64,
    /// Inter-arrival gap above which missing frames are estimated
    pub loss_gap_threshold_ms: u64,
    pub join_timeout_ms: u64,
    /// USB vendor ids accepted by auto-discovery
    pub vendor_ids: Vec<u16>,
    /// Lowercase substrings matched against port descriptions
    pub description_keywords: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "auto".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
            max_frame_bytes: 512,
            settle_delay_ms: 2500,
            self_test_window_ms: 3000,
            self_test_min_frames: 5,
            self_test_poll_ms: 10,
            max_consecutive_errors: 10,
            error_backoff_ms: 100,
            idle_poll_ms: 1,
            nominal_packet_interval_ms: 20,
            loss_gap_threshold_ms: 100,
            join_timeout_ms: 2000,
            // Arduino, Arduino.org, WCH CH340, Silicon Labs CP210x, FTDI
            vendor_ids: vec![0x2341, 0x2A03, 0x1A86, 0x10C4, 0x0403],
            description_keywords: ["arduino", "ch340", "cp210", "ftdi", "mega"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LinkConfig {
    /// True when the port should be picked by auto-discovery
    pub fn is_auto(&self) -> bool {
        self.port.trim().is_empty() || self.port.eq_ignore_ascii_case("auto")
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Feature extraction engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the raw telemetry buffer
    pub raw_capacity: usize,
    /// Capacity of the feature snapshot buffer
    pub feature_capacity: usize,
    /// Trailing history handed to the feature groups each cycle
    pub analysis_window: usize,
    /// Cycle rate ceiling
    pub max_rate_hz: f64,
    pub idle_sleep_ms: u64,
    pub join_timeout_ms: u64,
    /// Beat timestamps retained by the tempo tracker
    pub beat_history: usize,
    /// BPM estimates in the median smoother
    pub tempo_smoothing: usize,
    /// Pitch classes retained by the key tracker
    pub key_history: usize,
    /// Capacity of the snapshot broadcast channel
    pub snapshot_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            raw_capacity: 1000,
            feature_capacity: 1000,
            analysis_window: 50,
            max_rate_hz: 100.0,
            idle_sleep_ms: 1,
            join_timeout_ms: 2000,
            beat_history: 100,
            tempo_smoothing: 20,
            key_history: 50,
            snapshot_channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Minimum wall-clock duration of one engine cycle
    pub fn cycle_budget(&self) -> Duration {
        if self.max_rate_hz > 0.0 && self.max_rate_hz.is_finite() {
            Duration::from_secs_f64(1.0 / self.max_rate_hz)
        } else {
            Duration::from_millis(10)
        }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// Outbound control frame parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Let the engine write rhythm/silence summaries back over the link
    pub enabled: bool,
    pub rhythm_interval_ms: u64,
    /// How long silence must persist before SILENCE:1 is sent
    pub silence_hold_ms: u64,
    /// Beat-strength boost applied to the spectrum frame
    pub spectrum_sensitivity: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rhythm_interval_ms: 2000,
            silence_hold_ms: 1500,
            spectrum_sensitivity: 1.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or the defaults if the file doesn't exist or
    /// the JSON is invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the bundled assets directory
    pub fn load() -> Self {
        Self::load_from_file("assets/pipeline_config.json")
    }

    /// Human-readable warnings for values outside their recommended range
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let engine = &self.engine;

        for (name, capacity) in [
            ("raw_capacity", engine.raw_capacity),
            ("feature_capacity", engine.feature_capacity),
        ] {
            if !(100..=8192).contains(&capacity) {
                warnings.push(format!(
                    "engine.{} = {} is outside the recommended range 100-8192",
                    name, capacity
                ));
            }
        }

        if engine.analysis_window > engine.raw_capacity {
            warnings.push(format!(
                "engine.analysis_window = {} exceeds raw_capacity = {}",
                engine.analysis_window, engine.raw_capacity
            ));
        }

        if !(engine.max_rate_hz > 0.0 && engine.max_rate_hz.is_finite()) {
            warnings.push(format!(
                "engine.max_rate_hz = {} is not a positive rate; using 100 Hz",
                engine.max_rate_hz
            ));
        }

        if self.link.max_frame_bytes < 64 {
            warnings.push(format!(
                "link.max_frame_bytes = {} is shorter than a full telemetry frame",
                self.link.max_frame_bytes
            ));
        }
        if self.link.nominal_packet_interval_ms == 0 {
            warnings.push("link.nominal_packet_interval_ms = 0 disables loss estimation".into());
        }

        warnings
    }
}
