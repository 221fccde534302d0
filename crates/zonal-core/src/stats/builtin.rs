//! Built-in statistics over the valid (unmasked) cell values of one zone.
//!
//! Every function returns `None` for an empty slice.

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

pub fn sum(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    sum(values).map(|s| s / values.len() as f64)
}

/// Population standard deviation: √(Σ(x − μ)² / n).
pub fn std(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v - mu;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// `max − min`.
pub fn range(values: &[f64]) -> Option<f64> {
    Some(max(values)? - min(values)?)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Number of distinct values.
pub fn unique(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    Some(sorted.len() as f64)
}

/// `q`-th percentile (`q` in `[0, 100]`), linear interpolation between the
/// two closest ranks. `None` for empty input or `q` outside `[0, 100]`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let t = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_input_is_null_everywhere() {
        let empty: [f64; 0] = [];
        for f in [min, max, sum, mean, std, range, median, unique] {
            assert_eq!(f(&empty), None);
        }
        assert_eq!(percentile(&empty, 90.0), None);
    }

    #[test]
    fn std_is_population_std() {
        let v: Vec<f64> = (1..=16).map(f64::from).collect();
        assert_relative_eq!(std(&v).unwrap(), 4.6097722286464435, epsilon = 1e-12);
        assert_eq!(std(&[7.0]), Some(0.0));
    }

    #[test]
    fn order_statistics() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(min(&v), Some(1.0));
        assert_eq!(max(&v), Some(4.0));
        assert_eq!(range(&v), Some(3.0));
        assert_eq!(median(&v), Some(2.5));
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_relative_eq!(percentile(&v, 25.0).unwrap(), 1.75);
    }

    #[test]
    fn percentile_outside_range_is_none() {
        let v = [1.0, 2.0];
        assert_eq!(percentile(&v, 150.0), None);
        assert_eq!(percentile(&v, -50.0), None);
        assert_eq!(percentile(&v, f64::NAN), None);
        assert_eq!(percentile(&v, 100.0), Some(2.0));
    }

    #[test]
    fn sums_and_uniques() {
        let v = [2.0, 2.0, 5.0, 1.0];
        assert_eq!(sum(&v), Some(10.0));
        assert_eq!(mean(&v), Some(2.5));
        assert_eq!(unique(&v), Some(3.0));
    }
}
