//! Order statistics.

/// Returns the `q`-quantile of `values` with linear interpolation between
/// the two nearest order statistics (the numpy default).
///
/// Returns `None` when `values` is empty or `q` is outside `[0, 1]`.
/// NaN entries sort last.
///
/// # Example
///
/// ```
/// use natcg_core::stats::quantile;
///
/// assert_eq!(quantile(&[1.5, 0.5, 0.5, 1.5], 0.5), Some(1.0));
/// assert_eq!(quantile(&[3.0], 0.9), Some(3.0));
/// assert_eq!(quantile(&[], 0.5), None);
/// ```
pub fn quantile(values: &[f32], q: f64) -> Option<f32> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;

    let a = sorted[lo] as f64;
    let b = sorted[hi] as f64;
    Some((a + (b - a) * frac) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extremes_are_min_and_max() {
        let v = [4.0, -1.0, 2.0, 9.0];
        assert_eq!(quantile(&v, 0.0), Some(-1.0));
        assert_eq!(quantile(&v, 1.0), Some(9.0));
    }

    #[test]
    fn interpolates_between_neighbours() {
        let v = [0.0, 10.0];
        assert!((quantile(&v, 0.25).unwrap() - 2.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_q_is_none() {
        assert_eq!(quantile(&[1.0], 1.5), None);
        assert_eq!(quantile(&[1.0], -0.1), None);
    }

    #[test]
    fn all_zero_resolves_to_zero() {
        assert_eq!(quantile(&[0.0; 8], 0.95), Some(0.0));
    }
}
