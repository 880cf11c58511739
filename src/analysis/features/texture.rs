// Texture module - Roughness, brightness and warmth

use super::harmonic::{mean, population_std};
use super::spectral::EPSILON;
use super::types::TextureFeatures;
use crate::codec::RawTelemetry;

const ROUGHNESS_WINDOW: usize = 10;
const MAX_ROUGHNESS: f64 = 2.0;

pub fn analyze(current: &RawTelemetry, history: &[RawTelemetry]) -> TextureFeatures {
    let roughness = if history.len() >= ROUGHNESS_WINDOW {
        let amplitudes: Vec<f64> = history[history.len() - ROUGHNESS_WINDOW..]
            .iter()
            .map(|r| r.amplitude)
            .collect();
        (population_std(&amplitudes) / (mean(&amplitudes) + EPSILON)).min(MAX_ROUGHNESS)
    } else {
        0.0
    };

    let total = current.band_energy() + EPSILON;

    TextureFeatures {
        roughness,
        brightness: (current.treble_level / total).clamp(0.0, 1.0),
        warmth: (current.bass_level / total).clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::test_support::frame;

    #[test]
    fn test_brightness_and_warmth_shares() {
        let current = frame(0.5, 0.3, 0.2, 0.5, 0.0);
        let features = analyze(&current, &[current]);
        assert!((features.brightness - 0.5).abs() < 1e-6);
        assert!((features.warmth - 0.3).abs() < 1e-6);
        assert_eq!(features.roughness, 0.0);
    }

    #[test]
    fn test_roughness_is_capped() {
        let mut history: Vec<_> = (0..9).map(|i| frame(0.0, 0.1, 0.1, 0.1, i as f64)).collect();
        history.push(frame(1.0, 0.1, 0.1, 0.1, 9.0));
        // std 0.3, mean 0.1
        let features = analyze(&history[9], &history);
        assert_eq!(features.roughness, MAX_ROUGHNESS);

        let steady: Vec<_> = (0..10).map(|i| frame(0.4, 0.1, 0.1, 0.1, i as f64)).collect();
        assert!(analyze(&steady[9], &steady).roughness.abs() < 1e-9);
    }
}
