//! Reverse-path control publisher
//!
//! When enabled, the engine hands every snapshot to a [`ControlPublisher`]
//! which writes silence transitions and periodic rhythm summaries back to the
//! device. Send failures are counted and logged; they never stop the engine.

use std::sync::Arc;

use crate::analysis::{FeatureSnapshot, FrequencyBands};
use crate::codec::{AnalysisCommand, ControlFrame, VisualCommand};
use crate::config::ControlConfig;
use crate::error::{ErrorCode, LinkError};
use crate::link::LinkWriter;
use crate::telemetry::{DiagnosticError, TelemetryHub};

/// Reference tempo for a multiplier of 1.0
const REFERENCE_BPM: f64 = 120.0;
const MIN_TEMPO_MULTIPLIER: f64 = 0.3;
const MAX_TEMPO_MULTIPLIER: f64 = 3.0;

/// Log every Nth consecutive send failure
const SEND_ERROR_LOG_INTERVAL: u64 = 100;

/// Playback-speed factor for the device's animations
///
/// 1.0 when the tempo is unknown.
pub fn tempo_multiplier(bpm: f64) -> f64 {
    if bpm <= 0.0 || !bpm.is_finite() {
        return 1.0;
    }
    (bpm / REFERENCE_BPM).clamp(MIN_TEMPO_MULTIPLIER, MAX_TEMPO_MULTIPLIER)
}

/// Seven display bands boosted by beat strength, scaled to 0-255
pub fn spectrum_levels(
    bands: &FrequencyBands,
    strength: f64,
    sensitivity: f64,
    multiplier: f64,
) -> Vec<u8> {
    let boost = 1.0 + strength * sensitivity * multiplier;
    bands
        .as_array()
        .iter()
        .map(|band| (band * boost * 100.0).clamp(0.0, 255.0) as u8)
        .collect()
}

/// Rhythm, wave and spectrum frames for one snapshot
pub fn summary_frames(snapshot: &FeatureSnapshot, sensitivity: f64) -> [AnalysisCommand; 3] {
    let bpm = snapshot.rhythm.tempo_bpm;
    let strength = snapshot.rhythm.beat_confidence;
    let multiplier = tempo_multiplier(bpm);

    [
        AnalysisCommand::Rhythm {
            bpm,
            strength,
            multiplier,
        },
        AnalysisCommand::Wave {
            amplitude: snapshot.raw.amplitude,
            dominant_frequency: snapshot.raw.dominant_frequency,
            multiplier,
            strength,
        },
        AnalysisCommand::Spectrum(spectrum_levels(
            &snapshot.visual.bands,
            strength,
            sensitivity,
            multiplier,
        )),
    ]
}

/// Turns the per-snapshot silence flag into debounced on/off notifications
#[derive(Debug, Clone)]
pub struct SilenceNotifier {
    hold: f64,
    silent_since: Option<f64>,
    announced: bool,
}

impl SilenceNotifier {
    /// `hold_secs` - how long silence must persist before it is announced
    pub fn new(hold_secs: f64) -> Self {
        Self {
            hold: hold_secs.max(0.0),
            silent_since: None,
            announced: false,
        }
    }

    /// Feed one observation; returns a state to announce, if it changed
    pub fn update(&mut self, silent: bool, now: f64) -> Option<bool> {
        if silent {
            let since = *self.silent_since.get_or_insert(now);
            if !self.announced && now - since >= self.hold {
                self.announced = true;
                return Some(true);
            }
            None
        } else {
            self.silent_since = None;
            if self.announced {
                self.announced = false;
                Some(false)
            } else {
                None
            }
        }
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }
}

pub struct ControlPublisher {
    writer: LinkWriter,
    hub: Arc<TelemetryHub>,
    sensitivity: f64,
    summary_interval: f64,
    silence: SilenceNotifier,
    last_summary: Option<f64>,
    frames_sent: u64,
    send_errors: u64,
    consecutive_errors: u64,
}

impl ControlPublisher {
    pub fn new(config: &ControlConfig, writer: LinkWriter, hub: Arc<TelemetryHub>) -> Self {
        Self {
            writer,
            hub,
            sensitivity: config.spectrum_sensitivity,
            summary_interval: config.rhythm_interval_ms as f64 / 1000.0,
            silence: SilenceNotifier::new(config.silence_hold_ms as f64 / 1000.0),
            last_summary: None,
            frames_sent: 0,
            send_errors: 0,
            consecutive_errors: 0,
        }
    }

    /// Send whatever this snapshot calls for; times come from the snapshot
    pub fn publish(&mut self, snapshot: &FeatureSnapshot) {
        let now = snapshot.timestamp();

        if let Some(silent) = self.silence.update(snapshot.events.silence, now) {
            tracing::debug!("[ControlPublisher] Silence -> {}", silent);
            self.send(&VisualCommand::Silence(silent));
        }

        let due = self
            .last_summary
            .map_or(true, |last| now - last >= self.summary_interval);
        if due {
            self.last_summary = Some(now);
            for frame in summary_frames(snapshot, self.sensitivity) {
                self.send(&frame);
            }
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }

    fn send(&mut self, frame: &dyn ControlFrame) {
        match self.writer.send(frame) {
            Ok(_) => {
                self.frames_sent += 1;
                self.consecutive_errors = 0;
            }
            Err(err) => {
                self.send_errors += 1;
                self.consecutive_errors += 1;
                if self.consecutive_errors % SEND_ERROR_LOG_INTERVAL == 1 {
                    log_send_failure(&err, self.consecutive_errors);
                    self.hub.record_error(
                        DiagnosticError::Transport,
                        format!("control frame not sent: {}", err.message()),
                    );
                }
            }
        }
    }
}

fn log_send_failure(err: &LinkError, consecutive: u64) {
    tracing::warn!(
        "[ControlPublisher] Send failed (code {}, {} in a row): {}",
        err.code(),
        consecutive,
        err.message()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FeatureExtractor;
    use crate::codec::RawTelemetry;
    use crate::link::{LinkTransport, ScriptedTransport};

    fn snapshot(amplitude: f64, timestamp: f64) -> FeatureSnapshot {
        let raw = RawTelemetry {
            amplitude,
            dominant_frequency: 440.0,
            bass_level: 0.5,
            mid_level: 0.25,
            treble_level: 0.1,
            beat_flag: false,
            timestamp,
        };
        FeatureExtractor::default().extract(&raw, &[raw])
    }

    #[test]
    fn test_tempo_multiplier() {
        assert_eq!(tempo_multiplier(0.0), 1.0);
        assert_eq!(tempo_multiplier(120.0), 1.0);
        assert_eq!(tempo_multiplier(180.0), 1.5);
        assert_eq!(tempo_multiplier(20.0), 0.3);
        assert_eq!(tempo_multiplier(600.0), 3.0);
    }

    #[test]
    fn test_spectrum_levels_boost_and_clamp() {
        let bands = FrequencyBands {
            sub_bass: 0.5,
            bass: 1.0,
            low_mid: 3.0,
            ..FrequencyBands::default()
        };
        assert_eq!(
            spectrum_levels(&bands, 0.0, 1.0, 1.0),
            vec![50, 100, 255, 0, 0, 0, 0]
        );
        assert_eq!(spectrum_levels(&bands, 0.5, 1.0, 2.0)[0], 100);
    }

    #[test]
    fn test_silence_notifier_holds_and_never_repeats() {
        let mut notifier = SilenceNotifier::new(1.5);
        assert_eq!(notifier.update(true, 0.0), None);
        assert_eq!(notifier.update(true, 1.0), None);
        assert_eq!(notifier.update(true, 1.5), Some(true));
        assert_eq!(notifier.update(true, 2.0), None);
        assert!(notifier.is_announced());
        assert_eq!(notifier.update(false, 2.1), Some(false));
        assert_eq!(notifier.update(false, 2.2), None);

        // Brief silence is never announced
        assert_eq!(notifier.update(true, 3.0), None);
        assert_eq!(notifier.update(false, 3.5), None);
    }

    #[test]
    fn test_publisher_writes_summaries_on_interval() {
        let (transport, handle) = ScriptedTransport::pair();
        let writer = LinkWriter::default();
        writer.replace(Some(transport.try_clone_writer().unwrap()));

        let config = ControlConfig {
            enabled: true,
            rhythm_interval_ms: 1000,
            silence_hold_ms: 0,
            spectrum_sensitivity: 1.0,
        };
        let mut publisher = ControlPublisher::new(&config, writer, Arc::new(TelemetryHub::default()));

        publisher.publish(&snapshot(0.5, 0.0));
        publisher.publish(&snapshot(0.5, 0.5));
        publisher.publish(&snapshot(0.0, 1.0));

        let written = handle.written();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.iter().filter(|l| l.starts_with("RHYTHM:")).count(), 2);
        assert_eq!(lines.iter().filter(|l| l.starts_with("WAVE:")).count(), 2);
        assert!(lines.contains(&"RHYTHM:0.0,0.000,1.000"));
        assert!(lines.contains(&"SPECTRUM:35,50,15,25,16,10,12"));
        assert!(lines.contains(&"SILENCE:1"));
        assert_eq!(publisher.frames_sent(), 7);
        assert_eq!(publisher.send_errors(), 0);
    }

    #[test]
    fn test_publisher_counts_failures() {
        let writer = LinkWriter::default();
        let config = ControlConfig::default();
        let mut publisher = ControlPublisher::new(&config, writer, Arc::new(TelemetryHub::default()));
        publisher.publish(&snapshot(0.5, 0.0));
        assert_eq!(publisher.frames_sent(), 0);
        assert_eq!(publisher.send_errors(), 3);
    }
}
