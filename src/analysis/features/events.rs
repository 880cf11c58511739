// Events module - Onset, silence and dynamic change detection

use super::harmonic::mean;
use super::types::EventFeatures;
use crate::codec::RawTelemetry;

/// Rise over the mean of the two previous samples that marks an onset
const ONSET_RATIO: f64 = 1.5;

/// Onsets quieter than this are ignored
const ONSET_FLOOR: f64 = 0.1;

pub const SILENCE_FLOOR: f64 = 0.01;

const TREND_WINDOW: usize = 5;

pub fn analyze(current: &RawTelemetry, history: &[RawTelemetry]) -> EventFeatures {
    let onset = if history.len() >= 3 {
        let n = history.len();
        let previous = mean(&[history[n - 3].amplitude, history[n - 2].amplitude]);
        current.amplitude > previous * ONSET_RATIO && current.amplitude > ONSET_FLOOR
    } else {
        false
    };

    let dynamic_change = if history.len() >= TREND_WINDOW {
        let recent: Vec<f64> = history[history.len() - TREND_WINDOW..]
            .iter()
            .map(|r| r.amplitude)
            .collect();
        linear_slope(&recent)
    } else {
        0.0
    };

    EventFeatures {
        onset,
        silence: current.amplitude < SILENCE_FLOOR,
        dynamic_change,
    }
}

/// Least-squares slope of `values` against their index
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::test_support::frame;

    fn amplitudes(values: &[f64]) -> Vec<RawTelemetry> {
        values
            .iter()
            .enumerate()
            .map(|(i, &a)| frame(a, 0.1, 0.1, 0.1, i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn test_onset_requires_rise_and_floor() {
        let history = amplitudes(&[0.1, 0.1, 0.2]);
        assert!(analyze(&history[2], &history).onset);

        let quiet = amplitudes(&[0.01, 0.01, 0.05]);
        assert!(!analyze(&quiet[2], &quiet).onset);

        let flat = amplitudes(&[0.3, 0.3, 0.4]);
        assert!(!analyze(&flat[2], &flat).onset);
    }

    #[test]
    fn test_silence_floor() {
        let history = amplitudes(&[0.005]);
        assert!(analyze(&history[0], &history).silence);
        let history = amplitudes(&[0.01]);
        assert!(!analyze(&history[0], &history).silence);
    }

    #[test]
    fn test_dynamic_change_is_linear_slope() {
        let rising = amplitudes(&[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert!((analyze(&rising[4], &rising).dynamic_change - 0.1).abs() < 1e-12);

        let falling = amplitudes(&[0.9, 0.9, 0.5, 0.4, 0.5, 0.3, 0.2, 0.1]);
        assert!(analyze(&falling[7], &falling).dynamic_change < 0.0);

        let short = amplitudes(&[0.1, 0.9]);
        assert_eq!(analyze(&short[1], &short).dynamic_change, 0.0);
    }
}
