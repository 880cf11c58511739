// EnvelopeAnalyzer - Heuristic ADSR state machine over recent amplitude
//
// Transitions are driven by the last ENVELOPE_WINDOW amplitudes:
// - any phase -> Attack when the current amplitude exceeds the prior local
//   maximum by ATTACK_RATIO
// - Attack -> Decay when the amplitude falls below DECAY_RATIO of the peak
// - any other phase -> Release when the amplitude drops under RELEASE_FLOOR
//
// Sustain is implicit: the phase stays in Decay and the sustain level tracks
// the current amplitude.

use serde::{Deserialize, Serialize};

use super::features::EnvelopeFeatures;
use crate::codec::RawTelemetry;

/// Samples (current included) the transitions look at
pub const ENVELOPE_WINDOW: usize = 10;

const ATTACK_RATIO: f64 = 1.2;
const DECAY_RATIO: f64 = 0.9;
const RELEASE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopePhase {
    Attack,
    Decay,
    Release,
}

#[derive(Debug, Clone)]
pub struct EnvelopeAnalyzer {
    phase: EnvelopePhase,
    peak_amplitude: f64,
    attack_start: f64,
    attack_time: f64,
    decay_start: f64,
    release_start: Option<f64>,
}

impl EnvelopeAnalyzer {
    pub fn new() -> Self {
        Self {
            phase: EnvelopePhase::Release,
            peak_amplitude: 0.0,
            attack_start: 0.0,
            attack_time: 0.0,
            decay_start: 0.0,
            release_start: None,
        }
    }

    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    pub fn peak_amplitude(&self) -> f64 {
        self.peak_amplitude
    }

    /// Timestamp of the most recent attack
    pub fn attack_start(&self) -> f64 {
        self.attack_start
    }

    /// Advance the state machine with the newest frame
    ///
    /// # Arguments
    /// * `current` - Frame being analyzed
    /// * `history` - Trailing window ending with `current`
    ///
    /// # Returns
    /// Envelope estimate; the phase only moves once `ENVELOPE_WINDOW` samples
    /// of history are available
    pub fn analyze(&mut self, current: &RawTelemetry, history: &[RawTelemetry]) -> EnvelopeFeatures {
        if history.len() >= ENVELOPE_WINDOW {
            self.step(current, &history[history.len() - ENVELOPE_WINDOW..]);
        }

        let now = current.timestamp;
        EnvelopeFeatures {
            phase: self.phase,
            attack_time: match self.phase {
                EnvelopePhase::Attack => self.attack_time,
                _ => 0.0,
            },
            decay_time: match self.phase {
                EnvelopePhase::Decay => (now - self.decay_start).max(0.0),
                _ => 0.0,
            },
            sustain_level: current.amplitude,
            release_time: match (self.phase, self.release_start) {
                (EnvelopePhase::Release, Some(start)) => (now - start).max(0.0),
                _ => 0.0,
            },
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn step(&mut self, current: &RawTelemetry, window: &[RawTelemetry]) {
        let amplitude = current.amplitude;
        let prior_max = window[..window.len() - 1]
            .iter()
            .map(|r| r.amplitude)
            .fold(0.0_f64, f64::max);

        if amplitude > prior_max * ATTACK_RATIO {
            self.phase = EnvelopePhase::Attack;
            self.attack_start = current.timestamp;
            self.peak_amplitude = amplitude;

            // Rise time: how far back the window stayed under 90% of the new peak
            let below = window
                .iter()
                .filter(|r| r.amplitude < amplitude * DECAY_RATIO)
                .count();
            if below < window.len() {
                let last = window.len() - 1;
                self.attack_time = window[last].timestamp - window[last - below].timestamp;
            }
        } else if self.phase == EnvelopePhase::Attack
            && amplitude < self.peak_amplitude * DECAY_RATIO
        {
            self.phase = EnvelopePhase::Decay;
            self.decay_start = current.timestamp;
        } else if amplitude < RELEASE_FLOOR && self.phase != EnvelopePhase::Release {
            self.phase = EnvelopePhase::Release;
            self.release_start = Some(current.timestamp);
        }
    }
}

impl Default for EnvelopeAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
