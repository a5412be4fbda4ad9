//! Descriptive statistics over plain slices.

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Percentile with linear interpolation between closest ranks.
///
/// `p` is clamped to `[0, 100]`. Returns `0.0` for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|l, r| l.total_cmp(r));

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Consecutive differences `v[i + 1] - v[i]`.
pub fn diff(values: &[usize]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| w[1] as f64 - w[0] as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std_dev() {
        let std = std_dev(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(std, std::f64::consts::SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&values, 0.0), 1.0);
        assert_relative_eq!(percentile(&values, 100.0), 4.0);
        assert_relative_eq!(percentile(&values, 50.0), 2.5);
        assert_relative_eq!(percentile(&values, 25.0), 1.75);
    }

    #[test]
    fn test_diff() {
        assert_eq!(diff(&[2, 5, 11]), vec![3.0, 6.0]);
        assert!(diff(&[7]).is_empty());
    }
}
