//! Order statistics over task durations
//!
//! Percentiles use the floor-index convention on the sorted sample:
//! `p50 = v[floor(0.50 * (n - 1))]`, `p95 = v[floor(0.95 * (n - 1))]`.
//! Indices are computed in integer arithmetic so the floor is exact.

use serde::Serialize;

/// Tasks slower than this multiple of p50 are stragglers
pub const STRAGGLER_MULTIPLIER: i64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub count: usize,
    pub max: i64,
    pub p50: i64,
    pub p95: i64,
    /// max / p50, 0 when the sample is empty or p50 is 0
    pub skew_ratio: f64,
    pub straggler_fraction: f64,
}

impl OrderStats {
    /// Compute statistics over an unsorted sample (the input is not modified).
    pub fn from_values(values: &[i64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let max = sorted[n - 1];
        let p50 = sorted[percentile_index(n, 50)];
        let p95 = sorted[percentile_index(n, 95)];

        let skew_ratio = if p50 > 0 { max as f64 / p50 as f64 } else { 0.0 };

        let straggler_cutoff = p50.saturating_mul(STRAGGLER_MULTIPLIER);
        let stragglers = sorted.iter().filter(|&&v| v > straggler_cutoff).count();

        Self {
            count: n,
            max,
            p50,
            p95,
            skew_ratio,
            straggler_fraction: stragglers as f64 / n as f64,
        }
    }
}

/// floor(pct / 100 * (n - 1)) for a non-empty sample of length `n`
pub fn percentile_index(n: usize, pct: usize) -> usize {
    debug_assert!(n > 0 && pct <= 100);
    pct * (n - 1) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_index_percentiles() {
        let stats = OrderStats::from_values(&[50, 10, 40, 20, 30]);
        assert_eq!(percentile_index(5, 50), 2);
        assert_eq!(percentile_index(5, 95), 3);
        assert_eq!(stats.p50, 30);
        assert_eq!(stats.p95, 40);
        assert_eq!(stats.max, 50);
        assert_eq!(stats.count, 5);
    }

    #[test]
    fn test_even_length_uses_lower_median() {
        let stats = OrderStats::from_values(&[1, 2, 3, 4]);
        // floor(0.5 * 3) = 1, floor(0.95 * 3) = 2
        assert_eq!(stats.p50, 2);
        assert_eq!(stats.p95, 3);
    }

    #[test]
    fn test_p95_index_for_twenty_one_values() {
        let values: Vec<i64> = (0..21).collect();
        let stats = OrderStats::from_values(&values);
        assert_eq!(stats.p95, 19);
        assert_eq!(stats.p50, 10);
    }

    #[test]
    fn test_empty_sample() {
        let stats = OrderStats::from_values(&[]);
        assert_eq!(stats, OrderStats::default());
        assert_eq!(stats.skew_ratio, 0.0);
    }

    #[test]
    fn test_zero_median_has_zero_skew() {
        let stats = OrderStats::from_values(&[0, 0, 0, 100]);
        assert_eq!(stats.p50, 0);
        assert_eq!(stats.skew_ratio, 0.0);
        assert!(stats.skew_ratio.is_finite());
    }

    #[test]
    fn test_skew_and_stragglers() {
        // p50 = 100, cutoff 300: only 400 and 1000 are stragglers
        let stats = OrderStats::from_values(&[100, 100, 100, 90, 110, 300, 400, 1000, 95, 105]);
        assert_eq!(stats.p50, 100);
        assert!((stats.skew_ratio - 10.0).abs() < 1e-12);
        assert!((stats.straggler_fraction - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_single_value() {
        let stats = OrderStats::from_values(&[42]);
        assert_eq!((stats.max, stats.p50, stats.p95), (42, 42, 42));
        assert_eq!(stats.skew_ratio, 1.0);
        assert_eq!(stats.straggler_fraction, 0.0);
    }
}
