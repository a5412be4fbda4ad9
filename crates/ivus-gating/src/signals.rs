use ivus_signals::{
    ContourSeries, ExtremaSampling, FeatureExtractor, FusedSeries, Series, SignalError, SignalFuser,
};
use ndarray::ArrayView3;
use std::ops::Range;

use crate::config::GatingConfig;
use crate::error::GatingError;

/// The four fused gating series of one frame range.
///
/// Filtered series drive classification; the unfiltered ones are for
/// display only.
#[derive(Debug, Clone)]
pub struct GatingSignals {
    pub image: FusedSeries,
    pub image_filtered: FusedSeries,
    pub contour: FusedSeries,
    pub contour_filtered: FusedSeries,
}

impl GatingSignals {
    /// Compute all four series from raw frames and contour measurements.
    pub fn compute(
        frames: ArrayView3<'_, u8>,
        contours: &ContourSeries,
        config: &GatingConfig,
        frame_rate: f64,
    ) -> Result<Self, GatingError> {
        let features = FeatureExtractor::new(config.crop).extract(frames, contours)?;
        let normalized = features.normalized(config.normalize_step);
        let correlation = &normalized.correlation;
        let blurring = &normalized.blurring;
        let shortest = &normalized.shortest_distance;
        let angle = &normalized.vector_angle;
        let length = &normalized.vector_length;

        let band = config.band_pass(frame_rate)?;
        let correlation_f = band.filtfilt(correlation)?;
        let blurring_f = band.filtfilt(blurring)?;
        let shortest_f = band.filtfilt(shortest)?;
        let angle_f = band.filtfilt(angle)?;
        let length_f = band.filtfilt(length)?;

        let fuser = SignalFuser::with_cap(config.extrema(), config.zero_variability_cap);
        let image_sampling = if config.maxima_only {
            ExtremaSampling::MaximaOnly
        } else {
            ExtremaSampling::AllExtrema
        };

        log::debug!("Fusing image-based signals over {} frames", features.len());
        let image_filtered = fuser.fuse(
            &[("correlation", &correlation_f), ("blurring", &blurring_f)],
            image_sampling,
        )?;
        let image = fuse_for_display(
            &fuser,
            &[("correlation", correlation), ("blurring", blurring)],
            image_sampling,
            &image_filtered,
        )?;

        log::debug!("Fusing contour-based signals over {} frames", features.len());
        let contour_filtered = fuser.fuse(
            &[
                ("shortest_distance", &shortest_f),
                ("vector_angle", &angle_f),
                ("vector_length", &length_f),
            ],
            ExtremaSampling::AllExtrema,
        )?;
        let contour = fuse_for_display(
            &fuser,
            &[
                ("shortest_distance", shortest),
                ("vector_angle", angle),
                ("vector_length", length),
            ],
            ExtremaSampling::AllExtrema,
            &contour_filtered,
        )?;

        Ok(Self {
            image,
            image_filtered,
            contour,
            contour_filtered,
        })
    }

    pub fn len(&self) -> usize {
        self.image.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vertical offsets (image, contour) that move each unfiltered series
    /// below the plotted range, so its maximum sits on the lowest value of
    /// both.
    pub fn display_offsets(&self) -> (f64, f64) {
        let min_of = |s: &Series| s.iter().copied().fold(f64::INFINITY, f64::min);
        let max_of = |s: &Series| s.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if self.is_empty() {
            return (0.0, 0.0);
        }
        let floor = min_of(&self.image.series).min(min_of(&self.contour.series));
        (
            floor - max_of(&self.image.series),
            floor - max_of(&self.contour.series),
        )
    }

    /// Unfiltered series with `display_offsets` applied.
    pub fn shifted_unfiltered(&self) -> (Series, Series) {
        let (image_shift, contour_shift) = self.display_offsets();
        (
            &self.image.series + image_shift,
            &self.contour.series + contour_shift,
        )
    }
}

/// Unfiltered series only feed the plot. When none of them shows enough
/// extrema to weight, reuse the weights of the filtered fusion instead of
/// failing the run.
fn fuse_for_display(
    fuser: &SignalFuser,
    sources: &[(&str, &Series)],
    sampling: ExtremaSampling,
    filtered: &FusedSeries,
) -> Result<FusedSeries, SignalError> {
    match fuser.fuse(sources, sampling) {
        Err(SignalError::NoUsableSeries) => {
            log::warn!("No usable unfiltered series, reusing filtered weights for display");
            fuser.combine(sources, &filtered.weights)
        }
        other => other,
    }
}

/// Last computed signals, valid while config and frame range stay the same.
#[derive(Debug, Clone)]
pub struct SignalCache {
    config: GatingConfig,
    range: Range<usize>,
    signals: GatingSignals,
}

impl SignalCache {
    pub fn new(config: GatingConfig, range: Range<usize>, signals: GatingSignals) -> Self {
        Self {
            config,
            range,
            signals,
        }
    }

    pub fn matches(&self, config: &GatingConfig, range: &Range<usize>) -> bool {
        &self.range == range && &self.config == config
    }

    pub fn signals(&self) -> &GatingSignals {
        &self.signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array1, Array3};
    use std::f64::consts::PI;

    /// Synthetic pullback: frame brightness and contour geometry both beat
    /// at 1.2 Hz on 30 fps.
    fn synthetic(n: usize) -> (Array3<u8>, ContourSeries) {
        let beat = |i: usize| (2.0 * PI * 1.2 * i as f64 / 30.0).sin();
        let frames = Array3::from_shape_fn((n, 24, 24), |(f, r, c)| {
            let base = ((r * 7 + c * 13) % 50) as f64;
            (base + 60.0 + 40.0 * beat(f) * (r as f64 / 24.0)).clamp(0.0, 255.0) as u8
        });
        let contours = ContourSeries {
            shortest_distance: Array1::from_shape_fn(n, |i| 2.0 + 0.3 * beat(i)),
            vector_angle: Array1::from_shape_fn(n, |i| 0.5 * beat(i + 2)),
            vector_length: Array1::from_shape_fn(n, |i| 0.2 + 0.05 * beat(i + 1)),
        };
        (frames, contours)
    }

    #[test]
    fn test_compute_shapes_and_weights() {
        let (frames, contours) = synthetic(150);
        let signals =
            GatingSignals::compute(frames.view(), &contours, &GatingConfig::default(), 30.0)
                .unwrap();
        assert_eq!(signals.len(), 150);
        assert_eq!(signals.image.weights.len(), 2);
        assert_eq!(signals.contour_filtered.weights.len(), 3);
        for fused in [&signals.image, &signals.image_filtered, &signals.contour, &signals.contour_filtered] {
            assert_relative_eq!(fused.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_band_surfaces() {
        let (frames, contours) = synthetic(150);
        let config = GatingConfig {
            highcut: 20.0,
            ..Default::default()
        };
        assert!(matches!(
            GatingSignals::compute(frames.view(), &contours, &config, 30.0),
            Err(GatingError::Signal(ivus_signals::SignalError::InvalidBand { .. }))
        ));
    }

    #[test]
    fn test_display_offsets() {
        let (frames, contours) = synthetic(150);
        let signals =
            GatingSignals::compute(frames.view(), &contours, &GatingConfig::default(), 30.0)
                .unwrap();
        let (image, contour) = signals.shifted_unfiltered();
        let floor = signals
            .image
            .series
            .iter()
            .chain(signals.contour.series.iter())
            .copied()
            .fold(f64::INFINITY, f64::min);
        let image_max = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let contour_max = contour.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_relative_eq!(image_max, floor, epsilon = 1e-9);
        assert_relative_eq!(contour_max, floor, epsilon = 1e-9);
    }

    #[test]
    fn test_cache_key() {
        let (frames, contours) = synthetic(150);
        let config = GatingConfig::default();
        let signals = GatingSignals::compute(frames.view(), &contours, &config, 30.0).unwrap();
        let cache = SignalCache::new(config.clone(), 0..150, signals);
        assert!(cache.matches(&config, &(0..150)));
        assert!(!cache.matches(&config, &(0..149)));
        assert!(!cache.matches(&config, &(10..160)));
        let changed = GatingConfig {
            min_spacing: 12,
            ..config
        };
        assert!(!cache.matches(&changed, &(0..150)));
    }

    #[test]
    fn test_flat_display_series_reuse_filtered_weights() {
        let fuser = SignalFuser::new(GatingConfig::default().extrema());
        let ramp: Series = (0..60).map(|i| i as f64 / 60.0).collect();
        let steeper: Series = (0..60).map(|i| i as f64 / 30.0).collect();
        let sources = [("correlation", &ramp), ("blurring", &steeper)];
        assert_eq!(
            fuser.fuse(&sources, ExtremaSampling::MaximaOnly).unwrap_err(),
            SignalError::NoUsableSeries
        );

        let filtered = FusedSeries {
            series: Series::zeros(60),
            weights: vec![0.8, 0.2],
            sources: Vec::new(),
        };
        let display =
            fuse_for_display(&fuser, &sources, ExtremaSampling::MaximaOnly, &filtered).unwrap();
        assert_eq!(display.weights, vec![0.8, 0.2]);
        assert_relative_eq!(display.series[30], 0.8 * 0.5 + 0.2 * 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_display_fallback_keeps_other_errors() {
        let fuser = SignalFuser::new(GatingConfig::default().extrema());
        let short: Series = Series::zeros(10);
        let long: Series = Series::zeros(20);
        let filtered = FusedSeries {
            series: Series::zeros(10),
            weights: vec![0.5, 0.5],
            sources: Vec::new(),
        };
        assert!(matches!(
            fuse_for_display(
                &fuser,
                &[("a", &short), ("b", &long)],
                ExtremaSampling::AllExtrema,
                &filtered
            ),
            Err(SignalError::LengthMismatch { .. })
        ));
    }
}
