// TempoTracker - BPM estimation from device beat flags
//
// Beat timestamps are kept in a bounded rolling history. Each update averages
// the plausible inter-beat intervals (20-200 BPM), converts the result to BPM
// and reports the median of the most recent estimates so a single bad cycle
// cannot move the tempo.

use std::collections::VecDeque;

use super::features::harmonic::{mean, population_std};
use super::features::RhythmFeatures;

/// Shortest plausible beat interval in seconds (200 BPM)
pub const MIN_BEAT_INTERVAL: f64 = 0.3;

/// Longest plausible beat interval in seconds (20 BPM)
pub const MAX_BEAT_INTERVAL: f64 = 3.0;

/// Beats required before regularity is estimated
const MIN_BEATS_FOR_REGULARITY: usize = 4;

/// Interval count at which confidence stops being scaled down
const FULL_CONFIDENCE_INTERVALS: f64 = 8.0;

/// Floor for the mean interval when normalizing the spread
const MIN_MEAN_INTERVAL: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct TempoTracker {
    beats: VecDeque<f64>,
    beat_capacity: usize,
    estimates: VecDeque<f64>,
    smoothing: usize,
}

impl TempoTracker {
    /// Create a tracker
    ///
    /// # Arguments
    /// * `beat_capacity` - Beat timestamps retained
    /// * `smoothing` - BPM estimates in the median window
    pub fn new(beat_capacity: usize, smoothing: usize) -> Self {
        let beat_capacity = beat_capacity.max(2);
        let smoothing = smoothing.max(1);
        Self {
            beats: VecDeque::with_capacity(beat_capacity),
            beat_capacity,
            estimates: VecDeque::with_capacity(smoothing),
            smoothing,
        }
    }

    /// Record a beat; timestamps not newer than the last beat are ignored
    pub fn record_beat(&mut self, timestamp: f64) -> bool {
        if self.beats.back().is_some_and(|&last| timestamp <= last) {
            return false;
        }
        if self.beats.len() == self.beat_capacity {
            self.beats.pop_front();
        }
        self.beats.push_back(timestamp);
        true
    }

    pub fn beat_count(&self) -> usize {
        self.beats.len()
    }

    /// Compute a fresh estimate and return the smoothed BPM
    ///
    /// # Returns
    /// 0.0 with fewer than two beats or when no interval is plausible; no
    /// estimate is recorded in that case
    pub fn update(&mut self) -> f64 {
        if self.beats.len() < 2 {
            return 0.0;
        }

        let valid: Vec<f64> = self
            .intervals()
            .into_iter()
            .filter(|&i| i > MIN_BEAT_INTERVAL && i < MAX_BEAT_INTERVAL)
            .collect();
        if valid.is_empty() {
            return 0.0;
        }

        let bpm = 60.0 / mean(&valid);
        if self.estimates.len() == self.smoothing {
            self.estimates.pop_front();
        }
        self.estimates.push_back(bpm);

        median(self.estimates.iter().copied().collect())
    }

    /// Regularity and confidence from the spread of all retained intervals
    pub fn rhythm(&self) -> (f64, f64) {
        if self.beats.len() < MIN_BEATS_FOR_REGULARITY {
            return (0.0, 0.0);
        }

        let intervals = self.intervals();
        let regularity =
            (1.0 - population_std(&intervals) / mean(&intervals).max(MIN_MEAN_INTERVAL)).max(0.0);
        let confidence = (regularity
            * (intervals.len() as f64 / FULL_CONFIDENCE_INTERVALS).min(1.0))
        .min(1.0);

        (regularity, confidence)
    }

    /// Record the current frame's beat (if any) and produce the rhythm group
    pub fn analyze(&mut self, beat_flag: bool, timestamp: f64) -> RhythmFeatures {
        if beat_flag {
            self.record_beat(timestamp);
        }
        let tempo_bpm = self.update();
        let (rhythm_regularity, beat_confidence) = self.rhythm();

        RhythmFeatures {
            tempo_bpm,
            beat_confidence,
            rhythm_regularity,
        }
    }

    pub fn reset(&mut self) {
        self.beats.clear();
        self.estimates.clear();
    }

    fn intervals(&self) -> Vec<f64> {
        self.beats
            .iter()
            .zip(self.beats.iter().skip(1))
            .map(|(a, b)| b - a)
            .collect()
    }
}

impl Default for TempoTracker {
    fn default() -> Self {
        Self::new(100, 20)
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
