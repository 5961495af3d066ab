//! Fixed-capacity uniform sampling over an unbounded stream
//!
//! Classic Algorithm R: the first `k` values are kept as-is; the i-th value after
//! that replaces a uniformly chosen slot with probability `k / i`. After `n` adds the
//! held `min(n, k)` values are a uniform sample of everything inserted.
//!
//! The random source is seeded explicitly so identical input always yields the
//! same sample.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default reservoir capacity per stage
pub const DEFAULT_CAPACITY: usize = 15_000;

#[derive(Debug, Clone)]
pub struct Reservoir<T> {
    capacity: usize,
    seen: u64,
    values: Vec<T>,
    rng: StdRng,
}

impl<T: Clone> Reservoir<T> {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            seen: 0,
            values: Vec::with_capacity(capacity.min(1024)),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn add(&mut self, value: T) {
        self.seen += 1;

        if self.values.len() < self.capacity {
            self.values.push(value);
            return;
        }
        if self.capacity == 0 {
            return;
        }

        let slot = self.rng.gen_range(0..self.seen);
        if slot < self.capacity as u64 {
            self.values[slot as usize] = value;
        }
    }

    /// Copy of the currently held values; the reservoir keeps sampling afterwards.
    pub fn snapshot(&self) -> Vec<T> {
        self.values.clone()
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total number of values ever added
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Derive an independent seed for one stream from a base seed (splitmix64 finalizer).
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = base ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_everything_up_to_capacity() {
        let mut r = Reservoir::new(10, 7);
        for v in 0..10 {
            r.add(v);
        }
        assert_eq!(r.snapshot(), (0..10).collect::<Vec<_>>());
        assert_eq!(r.seen(), 10);
    }

    #[test]
    fn test_bounded_after_overflow() {
        let mut r = Reservoir::new(16, 1);
        for v in 0..10_000 {
            r.add(v);
        }
        assert_eq!(r.len(), 16);
        assert_eq!(r.seen(), 10_000);

        let mut held = r.snapshot();
        held.sort_unstable();
        held.dedup();
        assert_eq!(held.len(), 16, "sampled values must be distinct inputs");
    }

    #[test]
    fn test_snapshot_does_not_consume() {
        let mut r = Reservoir::new(4, 3);
        r.add(1.0);
        r.add(2.0);
        let first = r.snapshot();
        r.add(3.0);
        assert_eq!(first, vec![1.0, 2.0]);
        assert_eq!(r.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let fill = |seed| {
            let mut r = Reservoir::new(8, seed);
            for v in 0..500 {
                r.add(v);
            }
            r.snapshot()
        };
        assert_eq!(fill(99), fill(99));
        assert_ne!(fill(99), fill(100));
    }

    #[test]
    fn test_zero_capacity_only_counts() {
        let mut r = Reservoir::new(0, 1);
        r.add(5);
        r.add(6);
        assert!(r.is_empty());
        assert_eq!(r.seen(), 2);
    }

    #[test]
    fn test_retention_is_uniform() {
        // k = 10 out of n = 50: every value should survive ~20% of trials
        const K: usize = 10;
        const N: usize = 50;
        const TRIALS: u64 = 4000;

        let mut retained = [0u32; N];
        for seed in 0..TRIALS {
            let mut r = Reservoir::new(K, derive_seed(2024, seed));
            for v in 0..N {
                r.add(v);
            }
            for &v in r.values() {
                retained[v] += 1;
            }
        }

        let expected = TRIALS as f64 * K as f64 / N as f64;
        // five standard deviations of Binomial(4000, 0.2)
        let tolerance = 5.0 * (TRIALS as f64 * 0.2 * 0.8).sqrt();
        for (value, &count) in retained.iter().enumerate() {
            let diff = (count as f64 - expected).abs();
            assert!(
                diff < tolerance,
                "value {} retained {} times, expected ~{:.0}",
                value,
                count,
                expected
            );
        }
    }

    #[test]
    fn test_derive_seed_spreads_streams() {
        assert_ne!(derive_seed(1, 0), derive_seed(1, 1));
        assert_ne!(derive_seed(1, 5), derive_seed(2, 5));
        assert_eq!(derive_seed(42, 7), derive_seed(42, 7));
    }
}
