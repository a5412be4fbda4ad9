//! Z-score normalization, either over the whole series or per fixed-length
//! segment.

use super::stats::{mean, std_dev};
use crate::Series;

/// Relative spread below which a segment counts as constant.
const FLAT_TOLERANCE: f64 = 1e-12;

/// Normalize `signal` to zero mean and unit standard deviation.
///
/// With `segment_length == 0` the whole series is one segment. Otherwise the
/// series is cut into consecutive non-overlapping segments of that length
/// (the last one may be shorter) and each is normalized on its own.
/// A segment without variance comes out as all zeros.
pub fn normalize(signal: &Series, segment_length: usize) -> Series {
    let values = signal.to_vec();
    let step = if segment_length == 0 {
        values.len().max(1)
    } else {
        segment_length
    };

    let mut out = Vec::with_capacity(values.len());
    for segment in values.chunks(step) {
        let m = mean(segment);
        let std = std_dev(segment);
        if std > FLAT_TOLERANCE * (1.0 + m.abs()) && std.is_finite() {
            out.extend(segment.iter().map(|v| (v - m) / std));
        } else {
            out.extend(std::iter::repeat(0.0).take(segment.len()));
        }
    }
    Series::from(out)
}
