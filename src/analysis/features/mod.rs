// FeatureExtractor - Derived features for one telemetry frame
//
// This module turns the newest RawTelemetry plus a trailing window of history
// into a FeatureSnapshot. Each group is computed independently and returns its
// own partial struct.
//
// Module organization:
// - types: Snapshot and per-group feature structs
// - spectral: Centroid, rolloff and flux from the three band levels
// - harmonic: Entropy complexity, tonal stability, proportion tension
// - texture: Roughness, brightness, warmth
// - events: Onset, silence, dynamic change
// - visual: Energy vector and seven-band mix
// - mod.rs: Coordinator (FeatureExtractor)
//
// Groups run in a fixed order: spectral, rhythm, harmonic, envelope, texture,
// events, visual. Rhythm, envelope and key tracking carry state between calls;
// everything else is a pure function of (current, history).

pub(crate) mod events;
pub(crate) mod harmonic;
pub(crate) mod spectral;
pub(crate) mod texture;
mod types;
pub(crate) mod visual;

pub use types::{
    EnvelopeFeatures, EventFeatures, FeatureSnapshot, FrequencyBands, HarmonicFeatures,
    RhythmFeatures, SpectralFeatures, TextureFeatures, VisualFeatures,
};

use crate::analysis::envelope::EnvelopeAnalyzer;
use crate::analysis::key::KeyTracker;
use crate::analysis::tempo::TempoTracker;
use crate::codec::RawTelemetry;
use crate::config::EngineConfig;

/// FeatureExtractor coordinates the feature groups
///
/// Owned by the engine thread; the stateful analyzers are never shared.
pub struct FeatureExtractor {
    tempo: TempoTracker,
    envelope: EnvelopeAnalyzer,
    keys: KeyTracker,
}

impl FeatureExtractor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tempo: TempoTracker::new(config.beat_history, config.tempo_smoothing),
            envelope: EnvelopeAnalyzer::new(),
            keys: KeyTracker::new(config.key_history),
        }
    }

    /// Compute the snapshot for `current`
    ///
    /// # Arguments
    /// * `current` - Newest frame
    /// * `history` - Trailing window, oldest first, ending with `current`
    ///
    /// # Returns
    /// FeatureSnapshot combining every group
    pub fn extract(&mut self, current: &RawTelemetry, history: &[RawTelemetry]) -> FeatureSnapshot {
        let spectral = spectral::analyze(current, history);
        let rhythm = self.tempo.analyze(current.beat_flag, current.timestamp);

        let key = self.keys.observe(current.dominant_frequency);
        let harmonic = HarmonicFeatures {
            key: Some(key),
            key_change_rate: self.keys.change_rate(),
            ..harmonic::analyze(current, history)
        };

        let envelope = self.envelope.analyze(current, history);
        let texture = texture::analyze(current, history);
        let events = events::analyze(current, history);
        let visual = visual::analyze(current);

        FeatureSnapshot {
            raw: *current,
            spectral,
            rhythm,
            harmonic,
            envelope,
            texture,
            events,
            visual,
        }
    }

    pub fn tempo(&self) -> &TempoTracker {
        &self.tempo
    }

    pub fn envelope(&self) -> &EnvelopeAnalyzer {
        &self.envelope
    }

    /// Clear all rolling analyzer state
    pub fn reset(&mut self) {
        self.tempo.reset();
        self.envelope.reset();
        self.keys.reset();
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::codec::RawTelemetry;

    pub fn frame(amplitude: f64, bass: f64, mid: f64, treble: f64, timestamp: f64) -> RawTelemetry {
        RawTelemetry {
            amplitude,
            dominant_frequency: 440.0,
            bass_level: bass,
            mid_level: mid,
            treble_level: treble,
            beat_flag: false,
            timestamp,
        }
    }

    pub fn with_frequency(mut raw: RawTelemetry, frequency: f64) -> RawTelemetry {
        raw.dominant_frequency = frequency;
        raw
    }

    pub fn with_beat(mut raw: RawTelemetry) -> RawTelemetry {
        raw.beat_flag = true;
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{frame, with_beat};
    use super::*;
    use crate::analysis::envelope::EnvelopePhase;
    use crate::analysis::key::PitchClass;

    #[test]
    fn test_snapshot_carries_source_frame() {
        let mut extractor = FeatureExtractor::default();
        let current = frame(0.5, 0.25, 0.125, 0.0625, 3.0);
        let snapshot = extractor.extract(&current, &[current]);

        assert_eq!(snapshot.raw, current);
        assert_eq!(snapshot.timestamp(), 3.0);
        // Too little history for spectral estimates
        assert_eq!(snapshot.spectral, SpectralFeatures::default());
        assert_eq!(snapshot.harmonic.key, Some(PitchClass::A));
        assert_eq!(snapshot.envelope.phase, EnvelopePhase::Release);
        assert_eq!(snapshot.visual.energy_vector, [0.25, 0.125, 0.0625, 0.5]);
    }

    #[test]
    fn test_history_is_not_mutated() {
        let mut extractor = FeatureExtractor::default();
        let history: Vec<RawTelemetry> = (0..20)
            .map(|i| frame(0.1 * (i % 5) as f64, 0.2, 0.1, 0.05, i as f64 * 0.02))
            .collect();
        let before = history.clone();
        extractor.extract(&history[19], &history);
        assert_eq!(history, before);
    }

    #[test]
    fn test_beats_feed_tempo() {
        let mut extractor = FeatureExtractor::default();
        let mut history = Vec::new();
        let mut last = None;
        for i in 0..50 {
            let t = i as f64 * 0.1;
            let mut raw = frame(0.4, 0.2, 0.1, 0.05, t);
            if i % 5 == 0 {
                raw = with_beat(raw);
            }
            history.push(raw);
            let window_start = history.len().saturating_sub(50);
            last = Some(extractor.extract(&raw, &history[window_start..]));
        }

        let snapshot = last.unwrap();
        assert!((snapshot.rhythm.tempo_bpm - 120.0).abs() < 2.0);
        assert!(snapshot.rhythm.rhythm_regularity > 0.9);
        assert_eq!(extractor.tempo().beat_count(), 10);

        extractor.reset();
        assert_eq!(extractor.tempo().beat_count(), 0);
        assert_eq!(extractor.envelope().phase(), EnvelopePhase::Release);
    }
}
