//! Regularity-weighted signal fusion.
//!
//! Several normalized series of one modality are merged into a single series.
//! Each source is weighted by how regular its detected rhythm is: every
//! other extremum is taken (about one per cardiac cycle) and the standard
//! deviation of the spacing between them is the source's variability.
//! Heart rate is assumed steady over the analyzed window, so a smaller
//! variability earns a larger weight.
//!
//! # Algorithm
//!
//! 1. Detect extrema per source, keep indices 0, 2, 4, ...
//! 2. variability = std(diff(kept indices)); sources with fewer than two
//!    kept indices are left out
//! 3. raw weight = 1 / variability; zero variability is capped
//! 4. weights are normalized to sum to 1 and the weighted sum is returned

use crate::dsp::stats::{diff, std_dev};
use crate::extrema::{find_extrema, ExtremaConfig};
use crate::{Series, SignalError};

/// Default multiplier applied to the largest finite raw weight when a source
/// shows no variability at all.
pub const DEFAULT_ZERO_VARIABILITY_CAP: f64 = 10.0;

/// Which extrema a source's rhythm is sampled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremaSampling {
    MaximaOnly,
    AllExtrema,
}

/// Per-source outcome of the regularity check.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStats {
    pub name: String,
    /// Number of extrema left after taking every other one
    pub sampled_extrema: usize,
    /// `None` when the source was left out of the fusion
    pub variability: Option<f64>,
}

/// Fused series plus the weights and variabilities behind it.
#[derive(Debug, Clone)]
pub struct FusedSeries {
    pub series: Series,
    /// One weight per input, in input order; sums to 1
    pub weights: Vec<f64>,
    pub sources: Vec<SourceStats>,
}

impl FusedSeries {
    pub fn variability(&self) -> Vec<Option<f64>> {
        self.sources.iter().map(|s| s.variability).collect()
    }
}

/// Signal fuser
#[derive(Debug, Clone)]
pub struct SignalFuser {
    extrema: ExtremaConfig,
    zero_variability_cap: f64,
}

impl SignalFuser {
    pub fn new(extrema: ExtremaConfig) -> Self {
        Self::with_cap(extrema, DEFAULT_ZERO_VARIABILITY_CAP)
    }

    pub fn with_cap(extrema: ExtremaConfig, zero_variability_cap: f64) -> Self {
        Self {
            extrema,
            zero_variability_cap: zero_variability_cap.max(1.0),
        }
    }

    /// Fuse named series of equal length.
    pub fn fuse(
        &self,
        sources: &[(&str, &Series)],
        sampling: ExtremaSampling,
    ) -> Result<FusedSeries, SignalError> {
        let Some((_, first)) = sources.first() else {
            return Err(SignalError::EmptyInput);
        };
        let len = first.len();
        if let Some((_, bad)) = sources.iter().find(|(_, s)| s.len() != len) {
            return Err(SignalError::LengthMismatch {
                expected: len,
                got: bad.len(),
            });
        }

        let stats: Vec<SourceStats> = sources
            .iter()
            .map(|(name, series)| self.sample_source(name, series, sampling))
            .collect();

        let variability: Vec<Option<f64>> = stats.iter().map(|s| s.variability).collect();
        let weights = weights_from_variability(&variability, self.zero_variability_cap)
            .ok_or(SignalError::NoUsableSeries)?;

        let mut fused = Series::zeros(len);
        for ((_, series), w) in sources.iter().zip(&weights) {
            if *w > 0.0 {
                fused.scaled_add(*w, *series);
            }
        }

        let summary: Vec<String> = stats
            .iter()
            .zip(&weights)
            .map(|(s, w)| format!("{}: {:.2}", s.name, w))
            .collect();
        log::info!("Signal weights: {}", summary.join(", "));

        Ok(FusedSeries {
            series: fused,
            weights,
            sources: stats,
        })
    }

    /// Weighted sum of `sources` with weights chosen elsewhere, e.g. those of
    /// a related fusion. No regularity check runs, so every source reports
    /// `variability: None`.
    pub fn combine(
        &self,
        sources: &[(&str, &Series)],
        weights: &[f64],
    ) -> Result<FusedSeries, SignalError> {
        let Some((_, first)) = sources.first() else {
            return Err(SignalError::EmptyInput);
        };
        if weights.len() != sources.len() {
            return Err(SignalError::LengthMismatch {
                expected: sources.len(),
                got: weights.len(),
            });
        }
        let len = first.len();
        let mut fused = Series::zeros(len);
        for ((_, series), w) in sources.iter().zip(weights) {
            if series.len() != len {
                return Err(SignalError::LengthMismatch {
                    expected: len,
                    got: series.len(),
                });
            }
            fused.scaled_add(*w, *series);
        }

        Ok(FusedSeries {
            series: fused,
            weights: weights.to_vec(),
            sources: sources
                .iter()
                .map(|(name, _)| SourceStats {
                    name: name.to_string(),
                    sampled_extrema: 0,
                    variability: None,
                })
                .collect(),
        })
    }

    fn sample_source(
        &self,
        name: &str,
        series: &Series,
        sampling: ExtremaSampling,
    ) -> SourceStats {
        let extrema = find_extrema(series, &self.extrema);
        let indices = match sampling {
            ExtremaSampling::MaximaOnly => &extrema.maxima,
            ExtremaSampling::AllExtrema => &extrema.all_extrema,
        };
        let sampled: Vec<usize> = indices.iter().step_by(2).copied().collect();
        log::debug!(
            "{}: {} extrema, {} sampled",
            name,
            indices.len(),
            sampled.len()
        );

        let variability = if sampled.len() < 2 {
            log::warn!(
                "{} yields {} sampled extrema, excluded from fusion",
                name,
                sampled.len()
            );
            None
        } else {
            Some(std_dev(&diff(&sampled)))
        };

        SourceStats {
            name: name.to_string(),
            sampled_extrema: sampled.len(),
            variability,
        }
    }
}

/// Normalized inverse-variability weights.
///
/// `None` entries get weight 0. An entry of exactly zero variability gets
/// `cap` times the largest finite inverse among the others, or an equal
/// share when every usable entry is zero. Returns `None` when no entry is
/// usable.
pub fn weights_from_variability(variability: &[Option<f64>], cap: f64) -> Option<Vec<f64>> {
    let max_finite = variability
        .iter()
        .flatten()
        .filter(|v| **v > 0.0)
        .map(|v| 1.0 / v)
        .fold(None, |acc: Option<f64>, w| Some(acc.map_or(w, |a| a.max(w))));

    let capped = max_finite.map_or(1.0, |m| m * cap);
    let raw: Vec<f64> = variability
        .iter()
        .map(|v| match v {
            None => 0.0,
            Some(v) if *v > 0.0 => 1.0 / v,
            Some(_) => {
                log::warn!("zero variability, weight capped at {:.3}", capped);
                capped
            }
        })
        .collect();

    let total: f64 = raw.iter().sum();
    if variability.iter().all(Option::is_none) || total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(raw.into_iter().map(|w| w / total).collect())
}
