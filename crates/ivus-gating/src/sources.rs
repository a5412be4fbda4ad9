use ndarray::{s, Array3, ArrayView3, Axis};
use std::ops::Range;

/// Measurements of one frame's lumen contour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourMetrics {
    pub shortest_distance: f64,
    pub vector_angle: f64,
    pub vector_length: f64,
    /// Longest over shortest diameter
    pub elliptic_ratio: f64,
}

/// Grayscale frames of a pullback, indexed (frame, row, col).
pub trait ImageStore {
    fn frame_count(&self) -> usize;

    /// Frames in `range`, or `None` if they are not available.
    fn frames(&self, range: Range<usize>) -> Option<ArrayView3<'_, u8>>;
}

/// Contour measurements per frame; `None` where no contour is drawn.
pub trait ContourStore {
    fn metrics(&self, frame: usize) -> Option<ContourMetrics>;
}

impl ImageStore for Array3<u8> {
    fn frame_count(&self) -> usize {
        self.len_of(Axis(0))
    }

    fn frames(&self, range: Range<usize>) -> Option<ArrayView3<'_, u8>> {
        if range.start > range.end || range.end > self.frame_count() {
            return None;
        }
        Some(self.slice(s![range, .., ..]))
    }
}

impl ContourStore for [Option<ContourMetrics>] {
    fn metrics(&self, frame: usize) -> Option<ContourMetrics> {
        self.get(frame).copied().flatten()
    }
}

impl ContourStore for Vec<Option<ContourMetrics>> {
    fn metrics(&self, frame: usize) -> Option<ContourMetrics> {
        self.as_slice().metrics(frame)
    }
}

/// Frames in `range` without contour measurements.
pub fn missing_contours<C: ContourStore + ?Sized>(contours: &C, range: Range<usize>) -> Vec<usize> {
    range.filter(|&f| contours.metrics(f).is_none()).collect()
}
