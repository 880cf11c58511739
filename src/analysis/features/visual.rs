// Visual module - Energy vector and seven-band mix for renderers

use super::types::{FrequencyBands, VisualFeatures};
use crate::codec::RawTelemetry;

pub fn analyze(current: &RawTelemetry) -> VisualFeatures {
    let (bass, mid, treble) = (current.bass_level, current.mid_level, current.treble_level);

    VisualFeatures {
        energy_vector: [bass, mid, treble, current.amplitude],
        bands: FrequencyBands {
            sub_bass: bass * 0.7,
            bass,
            low_mid: mid * 0.6,
            mid,
            high_mid: mid * 0.4 + treble * 0.6,
            treble,
            brilliance: treble * 1.2,
        },
    }
}
