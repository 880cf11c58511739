//! Outbound control frames
//!
//! Two vocabularies share one framing contract: a single newline-terminated
//! ASCII line of the form `NAME` or `NAME:arg,arg,...`, no escaping and no
//! checksum. [`VisualCommand`] drives the device's display, [`AnalysisCommand`]
//! carries rhythm and spectrum summaries.

/// A command that can be written to the link as one frame
pub trait ControlFrame {
    /// Frame body without the line terminator
    fn body(&self) -> String;
}

/// Serialize a control frame into its newline-terminated wire form
pub fn format_frame(frame: &dyn ControlFrame) -> String {
    let mut line = frame.body();
    line.push('\n');
    line
}

/// Display commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisualCommand {
    /// One point of a winding curve with its color
    Winding { x: i32, y: i32, r: u8, g: u8, b: u8 },
    ClearWindings,
    Silence(bool),
}

impl VisualCommand {
    /// One `Winding` per point, color scaled by `fade` (clamped to 0..=1)
    pub fn winding_path(points: &[(f64, f64)], color: (u8, u8, u8), fade: f64) -> Vec<Self> {
        let fade = fade.clamp(0.0, 1.0);
        let scale = |c: u8| (c as f64 * fade) as u8;
        let (r, g, b) = (scale(color.0), scale(color.1), scale(color.2));

        points
            .iter()
            .map(|&(x, y)| VisualCommand::Winding {
                x: x as i32,
                y: y as i32,
                r,
                g,
                b,
            })
            .collect()
    }
}

impl ControlFrame for VisualCommand {
    fn body(&self) -> String {
        match self {
            VisualCommand::Winding { x, y, r, g, b } => {
                format!("WINDING:{},{},{},{},{}", x, y, r, g, b)
            }
            VisualCommand::ClearWindings => "CLEAR_WINDINGS".to_string(),
            VisualCommand::Silence(silent) => format!("SILENCE:{}", u8::from(*silent)),
        }
    }
}

/// Rhythm, wave and spectrum summaries
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisCommand {
    Rhythm {
        bpm: f64,
        strength: f64,
        multiplier: f64,
    },
    Wave {
        amplitude: f64,
        dominant_frequency: f64,
        multiplier: f64,
        strength: f64,
    },
    /// Per-band levels, 0-255
    Spectrum(Vec<u8>),
}

impl ControlFrame for AnalysisCommand {
    fn body(&self) -> String {
        match self {
            AnalysisCommand::Rhythm {
                bpm,
                strength,
                multiplier,
            } => format!("RHYTHM:{:.1},{:.3},{:.3}", bpm, strength, multiplier),
            AnalysisCommand::Wave {
                amplitude,
                dominant_frequency,
                multiplier,
                strength,
            } => format!(
                "WAVE:{:.3},{:.1},{:.3},{:.3}",
                amplitude, dominant_frequency, multiplier, strength
            ),
            AnalysisCommand::Spectrum(values) => {
                let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("SPECTRUM:{}", joined.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_frames() {
        let winding = VisualCommand::Winding {
            x: 12,
            y: -4,
            r: 255,
            g: 128,
            b: 0,
        };
        assert_eq!(format_frame(&winding), "WINDING:12,-4,255,128,0\n");
        assert_eq!(
            format_frame(&VisualCommand::ClearWindings),
            "CLEAR_WINDINGS\n"
        );
        assert_eq!(format_frame(&VisualCommand::Silence(true)), "SILENCE:1\n");
        assert_eq!(format_frame(&VisualCommand::Silence(false)), "SILENCE:0\n");
    }

    #[test]
    fn test_analysis_frames() {
        let rhythm = AnalysisCommand::Rhythm {
            bpm: 120.04,
            strength: 0.5,
            multiplier: 1.0,
        };
        assert_eq!(format_frame(&rhythm), "RHYTHM:120.0,0.500,1.000\n");

        let wave = AnalysisCommand::Wave {
            amplitude: 0.25,
            dominant_frequency: 440.0,
            multiplier: 1.5,
            strength: 0.75,
        };
        assert_eq!(format_frame(&wave), "WAVE:0.250,440.0,1.500,0.750\n");

        let spectrum = AnalysisCommand::Spectrum(vec![0, 17, 255]);
        assert_eq!(format_frame(&spectrum), "SPECTRUM:0,17,255\n");
    }

    #[test]
    fn test_winding_path_applies_fade() {
        let path = VisualCommand::winding_path(&[(1.9, 2.2), (3.0, 4.0)], (200, 100, 50), 0.5);
        assert_eq!(path.len(), 2);
        assert_eq!(
            path[0],
            VisualCommand::Winding {
                x: 1,
                y: 2,
                r: 100,
                g: 50,
                b: 25
            }
        );
    }
}
