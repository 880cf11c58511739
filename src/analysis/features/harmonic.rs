// Harmonic module - Band-distribution complexity, tonal stability and tension

use super::spectral::EPSILON;
use super::types::HarmonicFeatures;
use crate::codec::RawTelemetry;

/// Dominant frequencies considered for tonal stability
const STABILITY_WINDOW: usize = 5;

/// Frequency spread that maps to zero stability, in Hz
const STABILITY_SCALE_HZ: f64 = 1000.0;

/// Samples of history required before tension is computed
const TENSION_MIN_HISTORY: usize = 3;

/// Compute complexity, tonal stability and tension
///
/// Key fields are left at their defaults; the coordinator fills them from the
/// key tracker.
pub fn analyze(current: &RawTelemetry, history: &[RawTelemetry]) -> HarmonicFeatures {
    let proportions = band_proportions(current);

    let entropy: f64 = proportions
        .iter()
        .filter(|&&p| p > EPSILON)
        .map(|&p| -p * p.log2())
        .sum();
    let complexity = entropy / 3f64.log2();

    let tonal_stability = if history.len() >= STABILITY_WINDOW {
        let recent: Vec<f64> = history[history.len() - STABILITY_WINDOW..]
            .iter()
            .map(|r| r.dominant_frequency)
            .collect();
        (1.0 - population_std(&recent) / STABILITY_SCALE_HZ).max(0.0)
    } else {
        1.0
    };

    let tension = if history.len() >= TENSION_MIN_HISTORY {
        let previous = band_proportions(&history[history.len() - 2]);
        proportions
            .iter()
            .zip(previous.iter())
            .map(|(c, p)| (c - p).powi(2))
            .sum::<f64>()
            .sqrt()
    } else {
        0.0
    };

    HarmonicFeatures {
        complexity,
        tonal_stability,
        tension,
        ..HarmonicFeatures::default()
    }
}

/// Bass/mid/treble shares of the band energy
fn band_proportions(raw: &RawTelemetry) -> [f64; 3] {
    let total = raw.band_energy() + EPSILON;
    [
        raw.bass_level / total,
        raw.mid_level / total,
        raw.treble_level / total,
    ]
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
