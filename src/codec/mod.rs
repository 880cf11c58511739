//! Telemetry frame codec
//!
//! Inbound frames are single ASCII lines of comma-separated `KEY:VALUE` pairs:
//!
//! ```text
//! AMP:512,FREQ:440,BASS:256,MID:128,TREBLE:64,BEAT:1
//! ```
//!
//! Keys may appear in any order, unknown keys are ignored and missing keys
//! take their defaults. Level fields are raw 10-bit ADC readings normalized by
//! [`ADC_FULL_SCALE`]. The timestamp is assigned on receipt, it is never
//! transmitted by the device.
//!
//! Outbound control frames live in [`control`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::FrameParseError;

pub mod control;

pub use control::{format_frame, AnalysisCommand, ControlFrame, VisualCommand};

/// Normalization constant for the device's 10-bit ADC readings
pub const ADC_FULL_SCALE: f64 = 1024.0;

/// Dominant frequency assumed when a frame omits `FREQ`
pub const DEFAULT_FREQUENCY_HZ: f64 = 440.0;

static CLOCK_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic seconds since the first call in this process
pub fn monotonic_seconds() -> f64 {
    CLOCK_EPOCH.elapsed().as_secs_f64()
}

/// One telemetry frame received from the sensing device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetry {
    /// Overall amplitude, normalized (0.0 and up)
    pub amplitude: f64,
    /// Dominant frequency in Hz
    pub dominant_frequency: f64,
    pub bass_level: f64,
    pub mid_level: f64,
    pub treble_level: f64,
    pub beat_flag: bool,
    /// Receipt time in monotonic seconds
    pub timestamp: f64,
}

impl RawTelemetry {
    /// Sum of the three band levels
    pub fn band_energy(&self) -> f64 {
        self.bass_level + self.mid_level + self.treble_level
    }

    /// Serialize back into the inbound wire format (levels re-scaled to ADC units)
    pub fn to_wire(&self) -> String {
        format!(
            "AMP:{},FREQ:{},BASS:{},MID:{},TREBLE:{},BEAT:{}",
            (self.amplitude * ADC_FULL_SCALE).round() as i64,
            self.dominant_frequency,
            (self.bass_level * ADC_FULL_SCALE).round() as i64,
            (self.mid_level * ADC_FULL_SCALE).round() as i64,
            (self.treble_level * ADC_FULL_SCALE).round() as i64,
            u8::from(self.beat_flag)
        )
    }
}

/// Parse a frame, stamping it with the current monotonic time
pub fn parse(line: &str) -> Result<RawTelemetry, FrameParseError> {
    parse_at(line, monotonic_seconds())
}

/// Parse a frame with an explicit receipt timestamp
pub fn parse_at(line: &str, timestamp: f64) -> Result<RawTelemetry, FrameParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(FrameParseError::Empty);
    }

    let mut raw = RawTelemetry {
        amplitude: 0.0,
        dominant_frequency: DEFAULT_FREQUENCY_HZ,
        bass_level: 0.0,
        mid_level: 0.0,
        treble_level: 0.0,
        beat_flag: false,
        timestamp,
    };

    let mut fields = 0usize;
    for part in line.split(',') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        fields += 1;

        let key = key.trim();
        let value = value.trim();
        match key {
            "AMP" => raw.amplitude = parse_level(key, value)?,
            "FREQ" => raw.dominant_frequency = parse_number(key, value)?,
            "BASS" => raw.bass_level = parse_level(key, value)?,
            "MID" => raw.mid_level = parse_level(key, value)?,
            "TREBLE" => raw.treble_level = parse_level(key, value)?,
            "BEAT" => {
                let flag: i64 = value.parse().map_err(|_| invalid(key, value))?;
                raw.beat_flag = flag != 0;
            }
            _ => {}
        }
    }

    if fields == 0 {
        return Err(FrameParseError::NoFields);
    }

    Ok(raw)
}

fn parse_number(key: &str, value: &str) -> Result<f64, FrameParseError> {
    match value.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(number),
        _ => Err(invalid(key, value)),
    }
}

fn parse_level(key: &str, value: &str) -> Result<f64, FrameParseError> {
    Ok(parse_number(key, value)?.max(0.0) / ADC_FULL_SCALE)
}

fn invalid(key: &str, value: &str) -> FrameParseError {
    FrameParseError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
