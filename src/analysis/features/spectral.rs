// Spectral module - Band-level spectral estimates
//
// The device reports three band levels instead of a spectrum, so each band is
// treated as a single bin at a fixed center frequency.

use super::types::SpectralFeatures;
use crate::codec::RawTelemetry;

pub const BASS_CENTER_HZ: f64 = 125.0;
pub const MID_CENTER_HZ: f64 = 2000.0;
pub const TREBLE_CENTER_HZ: f64 = 8000.0;

/// Share of band energy that defines the rolloff point
const ROLLOFF_THRESHOLD: f64 = 0.9;

/// Samples of history required before estimates are produced
const MIN_HISTORY: usize = 3;

pub(crate) const EPSILON: f64 = 1e-8;

/// Compute centroid, rolloff and flux
///
/// # Arguments
/// * `current` - Frame being analyzed
/// * `history` - Trailing window ending with `current`
///
/// # Returns
/// All-zero features until `MIN_HISTORY` samples are available
pub fn analyze(current: &RawTelemetry, history: &[RawTelemetry]) -> SpectralFeatures {
    if history.len() < MIN_HISTORY {
        return SpectralFeatures::default();
    }

    let (bass, mid, treble) = (current.bass_level, current.mid_level, current.treble_level);
    let total = bass + mid + treble + EPSILON;

    let centroid =
        (bass * BASS_CENTER_HZ + mid * MID_CENTER_HZ + treble * TREBLE_CENTER_HZ) / total;

    let threshold = total * ROLLOFF_THRESHOLD;
    let rolloff = if bass >= threshold {
        BASS_CENTER_HZ
    } else if bass + mid >= threshold {
        MID_CENTER_HZ
    } else {
        TREBLE_CENTER_HZ
    };

    let previous = &history[history.len() - 2];
    let flux = (bass - previous.bass_level).abs()
        + (mid - previous.mid_level).abs()
        + (treble - previous.treble_level).abs();

    SpectralFeatures {
        centroid,
        rolloff,
        flux,
    }
}
