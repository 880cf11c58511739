// Types module - Data structures for derived features
//
// Every feature group returns its own partial struct; the coordinator
// assembles them into one FeatureSnapshot per engine cycle.

use serde::{Deserialize, Serialize};

use crate::analysis::envelope::EnvelopePhase;
use crate::analysis::key::PitchClass;
use crate::codec::RawTelemetry;

/// Spectral balance estimated from the three band levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeatures {
    /// Energy-weighted mean of the band center frequencies, in Hz
    pub centroid: f64,

    /// Band center below which 90% of the band energy lies, in Hz
    pub rolloff: f64,

    /// Sum of absolute band-level changes against the previous sample
    pub flux: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RhythmFeatures {
    /// Median-smoothed tempo, 0.0 when unknown
    pub tempo_bpm: f64,

    /// Regularity scaled down while few beats are known (0.0 to 1.0)
    pub beat_confidence: f64,

    /// 1 - std/mean of recent inter-beat intervals (0.0 to 1.0)
    pub rhythm_regularity: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFeatures {
    /// Shannon entropy of band proportions normalized by log2(3) (0.0 to 1.0)
    pub complexity: f64,

    /// 1 - std(recent dominant frequencies) / 1 kHz (0.0 to 1.0)
    pub tonal_stability: f64,

    /// L2 distance between consecutive band-proportion vectors
    pub tension: f64,

    /// Heuristic pitch class of the dominant frequency
    pub key: Option<PitchClass>,

    /// Share of pitch-class changes in the key history (0.0 to 1.0)
    pub key_change_rate: f64,
}

/// ADSR envelope estimate; times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeFeatures {
    pub phase: EnvelopePhase,
    pub attack_time: f64,
    pub decay_time: f64,
    pub sustain_level: f64,
    pub release_time: f64,
}

impl Default for EnvelopeFeatures {
    fn default() -> Self {
        Self {
            phase: EnvelopePhase::Release,
            attack_time: 0.0,
            decay_time: 0.0,
            sustain_level: 0.0,
            release_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureFeatures {
    /// Coefficient of variation of recent amplitude, capped at 2.0
    pub roughness: f64,

    /// Treble share of band energy (0.0 to 1.0)
    pub brightness: f64,

    /// Bass share of band energy (0.0 to 1.0)
    pub warmth: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeatures {
    pub onset: bool,
    pub silence: bool,

    /// Slope of a linear fit over the last 5 amplitudes, per sample
    pub dynamic_change: f64,
}

/// Fixed linear mix of the three device bands into seven display bands
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBands {
    pub sub_bass: f64,
    pub bass: f64,
    pub low_mid: f64,
    pub mid: f64,
    pub high_mid: f64,
    pub treble: f64,
    pub brilliance: f64,
}

impl FrequencyBands {
    pub const NAMES: [&'static str; 7] = [
        "sub_bass",
        "bass",
        "low_mid",
        "mid",
        "high_mid",
        "treble",
        "brilliance",
    ];

    /// Bands in ascending frequency order
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.high_mid,
            self.treble,
            self.brilliance,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualFeatures {
    /// [bass, mid, treble, amplitude]
    pub energy_vector: [f64; 4],
    pub bands: FrequencyBands,
}

/// Full derived-feature record for one engine cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Telemetry frame the snapshot was computed for
    pub raw: RawTelemetry,
    pub spectral: SpectralFeatures,
    pub rhythm: RhythmFeatures,
    pub harmonic: HarmonicFeatures,
    pub envelope: EnvelopeFeatures,
    pub texture: TextureFeatures,
    pub events: EventFeatures,
    pub visual: VisualFeatures,
}

impl FeatureSnapshot {
    /// Source timestamp, monotonic seconds
    pub fn timestamp(&self) -> f64 {
        self.raw.timestamp
    }
}
