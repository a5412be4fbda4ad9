//! Extremum detection under spacing and height constraints.
//!
//! Peaks are local maxima (flat tops count once, at their midpoint) whose
//! height reaches the series' own `height_percentile`. Peaks closer than
//! `min_spacing` frames are thinned, keeping the tallest first. Troughs are
//! the peaks of the negated series under the same rule.

use serde::{Deserialize, Serialize};

use crate::dsp::stats::percentile;
use crate::Series;

/// Extremum detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremaConfig {
    /// Minimum distance between two kept peaks, in frames
    pub min_spacing: usize,
    /// Percentile of the series a peak must reach (0-100)
    pub height_percentile: f64,
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            min_spacing: 10,
            height_percentile: 50.0,
        }
    }
}

/// Indices of detected extrema, ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtremaResult {
    pub maxima: Vec<usize>,
    /// Maxima and minima merged
    pub all_extrema: Vec<usize>,
}

impl ExtremaResult {
    pub fn is_empty(&self) -> bool {
        self.all_extrema.is_empty()
    }
}

/// Find maxima and minima of `signal`.
///
/// NaN and infinite samples are read as `0.0`.
pub fn find_extrema(signal: &Series, config: &ExtremaConfig) -> ExtremaResult {
    let clean: Vec<f64> = signal
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
    let negated: Vec<f64> = clean.iter().map(|v| -v).collect();

    let maxima = find_peaks(&clean, config);
    let minima = find_peaks(&negated, config);

    let mut all_extrema = Vec::with_capacity(maxima.len() + minima.len());
    all_extrema.extend_from_slice(&maxima);
    all_extrema.extend_from_slice(&minima);
    all_extrema.sort_unstable();
    all_extrema.dedup();

    ExtremaResult {
        maxima,
        all_extrema,
    }
}

fn find_peaks(x: &[f64], config: &ExtremaConfig) -> Vec<usize> {
    let min_height = percentile(x, config.height_percentile);
    let candidates: Vec<usize> = local_maxima(x)
        .into_iter()
        .filter(|&i| x[i] >= min_height)
        .collect();
    select_by_distance(&candidates, x, config.min_spacing.max(1))
}

/// Strict local maxima; a plateau counts once at its (left-rounded) middle.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }

    let mut i = 1;
    let i_max = n - 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < i_max && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let left = i;
                let right = ahead - 1;
                peaks.push((left + right) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Drop peaks closer than `distance` to a taller kept peak. Equal heights
/// are resolved by position, the later peak winning.
fn select_by_distance(peaks: &[usize], x: &[f64], distance: usize) -> Vec<usize> {
    if distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }

    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&l, &r| x[peaks[l]].total_cmp(&x[peaks[r]]));

    let mut keep = vec![true; peaks.len()];
    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < peaks.len() && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}
