//! Feature Extraction
//!
//! Turns a block of grayscale pullback frames and the matching contour
//! measurements into the five raw series used for gating:
//!
//! - **correlation**: Pearson correlation of each frame with its successor
//! - **blurring**: mean magnitude of the top 10% of the 2-D spectrum
//!   (lower means more motion blur)
//! - **shortest_distance / vector_angle / vector_length**: contour
//!   measurements rotated one frame forward, since contour geometry follows
//!   the previous frame's state. Frame 0 has no predecessor and is zeroed
//!   once the series are normalized, see [`FeatureSet::normalized`]

use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::dsp::normalize;
use crate::{Series, SignalError};

/// Fraction of the spectrum, from the top, averaged into the blurring score.
const BLUR_TOP_FRACTION: f64 = 0.1;

/// Central region kept from every frame (half-open pixel ranges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            row_start: 50,
            row_end: 450,
            col_start: 50,
            col_end: 450,
        }
    }
}

impl CropRegion {
    /// Region clamped to a `rows x cols` frame. Falls back to the whole frame
    /// if nothing of the region overlaps it.
    pub fn clamp_to(&self, rows: usize, cols: usize) -> CropRegion {
        let r0 = self.row_start.min(rows);
        let r1 = self.row_end.min(rows);
        let c0 = self.col_start.min(cols);
        let c1 = self.col_end.min(cols);
        if r0 >= r1 || c0 >= c1 {
            return CropRegion {
                row_start: 0,
                row_end: rows,
                col_start: 0,
                col_end: cols,
            };
        }
        CropRegion {
            row_start: r0,
            row_end: r1,
            col_start: c0,
            col_end: c1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_start >= self.row_end || self.col_start >= self.col_end
    }
}

/// Per-frame contour measurements for the analyzed range, unshifted.
#[derive(Debug, Clone, Default)]
pub struct ContourSeries {
    pub shortest_distance: Series,
    pub vector_angle: Series,
    pub vector_length: Series,
}

impl ContourSeries {
    pub fn len(&self) -> usize {
        self.shortest_distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The five raw gating series, one value per frame.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub correlation: Series,
    pub blurring: Series,
    pub shortest_distance: Series,
    pub vector_angle: Series,
    pub vector_length: Series,
}

impl FeatureSet {
    /// Z-score every series with [`normalize`], then zero frame 0 of the
    /// contour series. Frame 0 holds the wrapped-around last value while the
    /// statistics are taken, so the zero lands on the series mean.
    pub fn normalized(&self, segment_length: usize) -> FeatureSet {
        let contour = |s: &Series| {
            let mut out = normalize(s, segment_length);
            if !out.is_empty() {
                out[0] = 0.0;
            }
            out
        };
        FeatureSet {
            correlation: normalize(&self.correlation, segment_length),
            blurring: normalize(&self.blurring, segment_length),
            shortest_distance: contour(&self.shortest_distance),
            vector_angle: contour(&self.vector_angle),
            vector_length: contour(&self.vector_length),
        }
    }

    pub fn len(&self) -> usize {
        self.correlation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stateless feature extractor; holds only the crop region.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    crop: CropRegion,
}

impl FeatureExtractor {
    pub fn new(crop: CropRegion) -> Self {
        Self { crop }
    }

    /// Extract raw series from `frames` (frame, row, col) and `contours`.
    pub fn extract(
        &self,
        frames: ArrayView3<'_, u8>,
        contours: &ContourSeries,
    ) -> Result<FeatureSet, SignalError> {
        let n = frames.len_of(Axis(0));
        if n == 0 {
            return Err(SignalError::EmptyInput);
        }
        for other in [&contours.vector_angle, &contours.vector_length, &contours.shortest_distance] {
            if other.len() != n {
                return Err(SignalError::LengthMismatch {
                    expected: n,
                    got: other.len(),
                });
            }
        }

        let (_, rows, cols) = frames.dim();
        let crop = self.crop.clamp_to(rows, cols);
        let cropped: Vec<Array2<f64>> = frames
            .axis_iter(Axis(0))
            .map(|frame| {
                frame
                    .slice(s![crop.row_start..crop.row_end, crop.col_start..crop.col_end])
                    .mapv(f64::from)
            })
            .collect();

        Ok(FeatureSet {
            correlation: consecutive_correlation(&cropped),
            blurring: blurring_scores(&cropped),
            shortest_distance: shift_forward(&contours.shortest_distance),
            vector_angle: shift_forward(&contours.vector_angle),
            vector_length: shift_forward(&contours.vector_length),
        })
    }
}

/// Correlation of every frame with the next one; the last frame gets `0.0`.
///
/// With fewer than two frames the result is all zeros. A pair where either
/// frame is uniform also scores `0.0`.
pub fn consecutive_correlation(frames: &[Array2<f64>]) -> Series {
    let mut out = Series::zeros(frames.len());
    for (i, pair) in frames.windows(2).enumerate() {
        out[i] = pearson(pair[0].view(), pair[1].view());
    }
    out
}

fn pearson(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> f64 {
    if a.dim() != b.dim() || a.is_empty() {
        return 0.0;
    }
    let mean_a = a.mean().unwrap_or(0.0);
    let mean_b = b.mean().unwrap_or(0.0);

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 {
        cov / denom
    } else {
        0.0
    }
}

/// Blurring score per frame: mean of the highest 10% of 2-D FFT magnitudes.
pub fn blurring_scores(frames: &[Array2<f64>]) -> Series {
    let mut planner = FftPlanner::<f64>::new();
    frames
        .iter()
        .map(|frame| {
            let mut magnitudes = fft2_magnitudes(frame, &mut planner);
            top_fraction_mean(&mut magnitudes, BLUR_TOP_FRACTION)
        })
        .collect()
}

fn fft2_magnitudes(frame: &Array2<f64>, planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let (rows, cols) = frame.dim();
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let mut spectrum: Array2<Complex64> = frame.mapv(|v| Complex64::new(v, 0.0));

    let row_fft = planner.plan_fft_forward(cols);
    for mut row in spectrum.rows_mut() {
        let mut buffer: Vec<Complex64> = row.to_vec();
        row_fft.process(&mut buffer);
        row.assign(&ArrayView1::from(buffer.as_slice()));
    }

    let col_fft = planner.plan_fft_forward(rows);
    for mut col in spectrum.columns_mut() {
        let mut buffer: Vec<Complex64> = col.to_vec();
        col_fft.process(&mut buffer);
        col.assign(&ArrayView1::from(buffer.as_slice()));
    }

    spectrum.iter().map(|c| c.norm()).collect()
}

fn top_fraction_mean(values: &mut [f64], fraction: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let threshold = (((1.0 - fraction) * n as f64) as usize).min(n - 1);
    values.select_nth_unstable_by(threshold, |l, r| l.total_cmp(r));
    let top = &values[threshold..];
    top.iter().sum::<f64>() / top.len() as f64
}

/// Rotate every value one frame later; frame 0 receives the last value.
pub fn shift_forward(values: &Series) -> Series {
    let n = values.len();
    let mut out = values.clone();
    if n > 1 {
        out.slice_mut(s![1..]).assign(&values.slice(s![..n - 1]));
        out[0] = values[n - 1];
    }
    out
}
