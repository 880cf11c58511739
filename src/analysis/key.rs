// KeyTracker - Coarse pitch-class estimate of the dominant frequency
//
// This is a banded lookup, not pitch detection: the device only reports one
// dominant frequency, so the class is chosen from fixed frequency bands and
// the change rate over a rolling history stands in for harmonic movement.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Keys required before a change rate is reported
const MIN_KEYS_FOR_CHANGE_RATE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl PitchClass {
    /// Upper band edges in Hz, ascending; anything above the last edge is B
    const BANDS: [(f64, PitchClass); 6] = [
        (100.0, PitchClass::C),
        (150.0, PitchClass::D),
        (200.0, PitchClass::E),
        (300.0, PitchClass::F),
        (400.0, PitchClass::G),
        (500.0, PitchClass::A),
    ];

    pub fn from_frequency(frequency: f64) -> Self {
        Self::BANDS
            .iter()
            .find(|(edge, _)| frequency < *edge)
            .map(|(_, class)| *class)
            .unwrap_or(PitchClass::B)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::D => "D",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::G => "G",
            PitchClass::A => "A",
            PitchClass::B => "B",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyTracker {
    history: VecDeque<PitchClass>,
    capacity: usize,
}

impl KeyTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Classify `frequency` and append it to the history
    pub fn observe(&mut self, frequency: f64) -> PitchClass {
        let class = PitchClass::from_frequency(frequency);
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(class);
        class
    }

    /// Changes between consecutive keys divided by the history length, at most 1.0
    pub fn change_rate(&self) -> f64 {
        if self.history.len() < MIN_KEYS_FOR_CHANGE_RATE {
            return 0.0;
        }
        let changes = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count();
        (changes as f64 / self.history.len() as f64).min(1.0)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}

impl Default for KeyTracker {
    fn default() -> Self {
        Self::new(50)
    }
}
