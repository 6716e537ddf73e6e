//! Order statistics over plain slices.
//!
//! All helpers ignore non-finite values and return `None` for empty input.

use std::cmp::Ordering;

fn sorted_finite(values: &[f32]) -> Vec<f32> {
    let mut v: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Linearly interpolated quantile, `q` in `[0, 1]`.
pub fn percentile(values: &[f32], q: f32) -> Option<f32> {
    let v = sorted_finite(values);
    percentile_sorted(&v, q)
}

/// Quantile of an already ascending slice.
pub fn percentile_sorted(sorted: &[f32], q: f32) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.5 };
    let pos = q * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let t = pos - lo as f32;
    Some(sorted[lo] + t * (sorted[hi] - sorted[lo]))
}

pub fn median(values: &[f32]) -> Option<f32> {
    percentile(values, 0.5)
}

pub fn lower_quartile(values: &[f32]) -> Option<f32> {
    percentile(values, 0.25)
}

/// Positive differences between consecutive values after sorting.
///
/// Differences not larger than `min_gap` are dropped, so items sharing a
/// position do not drag gap statistics towards zero.
pub fn consecutive_gaps(values: &[f32], min_gap: f32) -> Vec<f32> {
    let v = sorted_finite(values);
    v.windows(2)
        .map(|w| w[1] - w[0])
        .filter(|&g| g > min_gap)
        .collect()
}

/// Index of the bin holding quantile `q` of a counting histogram.
pub fn histogram_quantile_bin(hist: &[u32], q: f32) -> Option<usize> {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return None;
    }
    let q = if q.is_finite() { q.clamp(0.0, 1.0) } else { 0.5 };
    let target = (q as f64 * total as f64).ceil().max(1.0) as u64;
    let mut acc = 0u64;
    for (i, &c) in hist.iter().enumerate() {
        acc += c as u64;
        if acc >= target {
            return Some(i);
        }
    }
    Some(hist.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn median_of_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_relative_eq!(median(&[4.0, 1.0, 2.0, 3.0]).unwrap(), 2.5);
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn percentile_ignores_nan() {
        let v = [f32::NAN, 0.0, 10.0];
        assert_relative_eq!(percentile(&v, 0.25).unwrap(), 2.5);
        assert_relative_eq!(lower_quartile(&[0.0, 4.0, 8.0, 12.0, 16.0]).unwrap(), 4.0);
    }

    #[test]
    fn gaps_skip_coincident_values() {
        let gaps = consecutive_gaps(&[10.0, 0.0, 10.2, 30.0], 0.5);
        assert_eq!(gaps.len(), 2);
        assert_relative_eq!(gaps[0], 10.0);
        assert_relative_eq!(gaps[1], 19.8, epsilon = 1e-4);
    }

    #[test]
    fn histogram_quantile() {
        let mut hist = [0u32; 8];
        hist[0] = 90;
        hist[5] = 10;
        assert_eq!(histogram_quantile_bin(&hist, 0.5), Some(0));
        assert_eq!(histogram_quantile_bin(&hist, 0.95), Some(5));
        assert_eq!(histogram_quantile_bin(&[0; 4], 0.5), None);
    }
}
