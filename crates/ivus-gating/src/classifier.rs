use ivus_signals::{find_extrema, ExtremaConfig, Series, SignalError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::GatingConfig;
use crate::error::GatingError;
use crate::phase::PhaseAssignment;

/// Which extrema of a fused series mark phase boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremumMethod {
    Maxima,
    AllExtrema,
}

pub type ImageMethod = ExtremumMethod;
pub type ContourMethod = ExtremumMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatingMethods {
    pub image: ImageMethod,
    pub contour: ContourMethod,
}

impl GatingMethods {
    /// Image method follows `maxima_only`; contours use all extrema.
    pub fn from_config(config: &GatingConfig) -> Self {
        Self {
            image: if config.maxima_only {
                ExtremumMethod::Maxima
            } else {
                ExtremumMethod::AllExtrema
            },
            contour: ExtremumMethod::AllExtrema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierState {
    Unclassified,
    Classified,
}

impl ClassifierState {
    pub fn of(assignment: &PhaseAssignment) -> Self {
        if assignment.is_empty() {
            ClassifierState::Unclassified
        } else {
            ClassifierState::Classified
        }
    }
}

/// Result of automatic classification, indices relative to the range start.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub common_indices: Vec<usize>,
    pub diastole: Vec<usize>,
    pub systole: Vec<usize>,
    /// Elliptic-ratio sums of the two groups
    pub diastole_score: f64,
    pub systole_score: f64,
}

impl Classification {
    /// Write both groups into `assignment`, replacing whatever `range` held.
    pub fn commit(
        &self,
        assignment: &mut PhaseAssignment,
        range: Range<usize>,
    ) -> Result<(), GatingError> {
        let offset = range.start;
        let diastole: Vec<usize> = self.diastole.iter().map(|i| i + offset).collect();
        let systole: Vec<usize> = self.systole.iter().map(|i| i + offset).collect();
        assignment.commit_range(range, &diastole, &systole)
    }
}

/// Labels frames where image- and contour-based extrema coincide.
#[derive(Debug, Clone)]
pub struct PhaseClassifier {
    extrema: ExtremaConfig,
}

impl PhaseClassifier {
    pub fn new(extrema: ExtremaConfig) -> Self {
        Self { extrema }
    }

    pub fn classify(
        &self,
        image: &Series,
        contour: &Series,
        elliptic_ratio: &Series,
        methods: GatingMethods,
    ) -> Result<Classification, GatingError> {
        for other in [contour, elliptic_ratio] {
            if other.len() != image.len() {
                return Err(SignalError::LengthMismatch {
                    expected: image.len(),
                    got: other.len(),
                }
                .into());
            }
        }

        let image_idx = self.boundaries(image, methods.image);
        let contour_idx = self.boundaries(contour, methods.contour);
        log::debug!(
            "Extrema found: {} image-based, {} contour-based",
            image_idx.len(),
            contour_idx.len()
        );

        let common = common_indices(&image_idx, &contour_idx);
        assign_groups(&common, elliptic_ratio)
    }

    fn boundaries(&self, series: &Series, method: ExtremumMethod) -> Vec<usize> {
        let result = find_extrema(series, &self.extrema);
        match method {
            ExtremumMethod::Maxima => result.maxima,
            ExtremumMethod::AllExtrema => result.all_extrema,
        }
    }
}

/// Sorted intersection of two ascending index lists.
pub fn common_indices(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Split alternating boundaries into two groups and call the one with the
/// larger elliptic-ratio sum systole.
pub fn assign_groups(common: &[usize], elliptic_ratio: &Series) -> Result<Classification, GatingError> {
    if common.len() < 2 {
        log::warn!(
            "Gating aborted: {} common extrema between image and contour signals",
            common.len()
        );
        return Err(GatingError::TooFewCommonExtrema {
            found: common.len(),
        });
    }
    if let Some(&last) = common.last() {
        if last >= elliptic_ratio.len() {
            return Err(SignalError::LengthMismatch {
                expected: last + 1,
                got: elliptic_ratio.len(),
            }
            .into());
        }
    }

    let group_a: Vec<usize> = common.iter().step_by(2).copied().collect();
    let group_b: Vec<usize> = common.iter().skip(1).step_by(2).copied().collect();
    let score = |group: &[usize]| -> f64 {
        group
            .iter()
            .map(|&i| elliptic_ratio[i])
            .filter(|v| v.is_finite())
            .sum()
    };
    let (score_a, score_b) = (score(&group_a), score(&group_b));

    let (systole, diastole, systole_score, diastole_score) = if score_a > score_b {
        (group_a, group_b, score_a, score_b)
    } else {
        (group_b, group_a, score_b, score_a)
    };
    log::info!(
        "Classified {} diastolic and {} systolic frames (elliptic ratio {:.2} vs {:.2})",
        diastole.len(),
        systole.len(),
        diastole_score,
        systole_score
    );

    Ok(Classification {
        common_indices: common.to_vec(),
        diastole,
        systole,
        diastole_score,
        systole_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseLabel;
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use std::f64::consts::PI;

    #[test]
    fn test_common_indices() {
        assert_eq!(common_indices(&[1, 3, 5, 9], &[2, 3, 4, 9, 12]), vec![3, 9]);
        assert!(common_indices(&[], &[1]).is_empty());
    }

    #[test]
    fn test_higher_elliptic_sum_is_systole() {
        let mut ratio = Array1::from_elem(20, 1.0);
        for (i, v) in [(2usize, 4.0), (8, 4.0), (14, 4.0), (5, 3.0), (11, 3.0), (17, 3.0)] {
            ratio[i] = v;
        }
        let c = assign_groups(&[2, 5, 8, 11, 14, 17], &ratio).unwrap();
        assert_eq!(c.systole, vec![2, 8, 14]);
        assert_eq!(c.diastole, vec![5, 11, 17]);
        assert_relative_eq!(c.systole_score, 12.0);
        assert_relative_eq!(c.diastole_score, 9.0);
    }

    #[test]
    fn test_tie_goes_to_second_group() {
        let ratio = Array1::from_elem(10, 1.0);
        let c = assign_groups(&[1, 4, 7, 9], &ratio).unwrap();
        assert_eq!(c.systole, vec![4, 9]);
        assert_eq!(c.diastole, vec![1, 7]);
    }

    #[test]
    fn test_too_few_common_extrema() {
        let ratio = Array1::from_elem(10, 1.0);
        assert!(matches!(
            assign_groups(&[3], &ratio),
            Err(GatingError::TooFewCommonExtrema { found: 1 })
        ));
        assert!(matches!(
            assign_groups(&[], &ratio),
            Err(GatingError::TooFewCommonExtrema { found: 0 })
        ));
    }

    #[test]
    fn test_classify_agreeing_signals() {
        let n = 120;
        let wave = Array1::from_shape_fn(n, |i| (2.0 * PI * i as f64 / 20.0).sin());
        let ratio = Array1::from_shape_fn(n, |i| 1.2 + 0.1 * (2.0 * PI * i as f64 / 20.0).sin());
        let classifier = PhaseClassifier::new(ExtremaConfig {
            min_spacing: 5,
            height_percentile: 50.0,
        });
        let methods = GatingMethods {
            image: ExtremumMethod::AllExtrema,
            contour: ExtremumMethod::AllExtrema,
        };
        let c = classifier.classify(&wave, &wave, &ratio, methods).unwrap();
        // maxima of the ratio coincide with the wave maxima
        assert_eq!(c.systole, vec![5, 25, 45, 65, 85, 105]);
        assert_eq!(c.diastole, vec![15, 35, 55, 75, 95, 115]);
    }

    #[test]
    fn test_classify_length_mismatch() {
        let classifier = PhaseClassifier::new(ExtremaConfig::default());
        let a = Array1::zeros(10);
        let b = Array1::zeros(9);
        let methods = GatingMethods::from_config(&GatingConfig::default());
        assert!(matches!(
            classifier.classify(&a, &b, &a, methods),
            Err(GatingError::Signal(SignalError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_commit_offsets_into_range() {
        let c = Classification {
            common_indices: vec![1, 3, 5],
            diastole: vec![3],
            systole: vec![1, 5],
            diastole_score: 0.0,
            systole_score: 0.0,
        };
        let mut a = PhaseAssignment::new(30);
        c.commit(&mut a, 10..20).unwrap();
        assert_eq!(a.diastolic_frames(), &[13]);
        assert_eq!(a.systolic_frames(), &[11, 15]);
        assert_eq!(a.label(13), Some(PhaseLabel::Diastole));
        assert_eq!(ClassifierState::of(&a), ClassifierState::Classified);
    }
}
