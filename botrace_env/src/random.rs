//! Injectable randomness.
//!
//! Every random draw the race core makes (speed variance, luck, modifier
//! timing, evaluation cadence, lane shuffle) goes through [`RandomSource`],
//! so a test can pin the whole race to a known sequence of draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// A source of uniform draws in `[0, 1)`.
pub trait RandomSource: Send {
    /// Returns the next uniform draw.
    fn next_f64(&mut self) -> f64;

    /// Uniform draw in `[min, max)`.
    fn range(&mut self, min: f64, max: f64) -> f64 {
        min + self.next_f64() * (max - min)
    }

    /// Returns true with probability `p`.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform duration in `[min, max)`, millisecond resolution is not enforced.
    fn duration_between(&mut self, min: Duration, max: Duration) -> Duration {
        let secs = self.range(min.as_secs_f64(), max.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Fisher-Yates shuffle driven by this source.
    fn shuffle<T>(&mut self, items: &mut [T])
    where
        Self: Sized,
    {
        for i in (1..items.len()).rev() {
            let j = ((self.next_f64() * (i + 1) as f64) as usize).min(i);
            items.swap(i, j);
        }
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn next_f64(&mut self) -> f64 {
        (**self).next_f64()
    }
}

/// Production randomness seeded from OS entropy.
pub struct EntropyRandom {
    rng: StdRng,
}

impl EntropyRandom {
    /// Creates a new entropy-seeded source.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for EntropyRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropyRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
///
/// Values are clamped to `[0, 1]`. A draw of exactly `1.0` is allowed so
/// tests can pin a range to its upper extreme.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    /// Creates a source cycling through `values`. An empty list behaves as `[0.0]`.
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let mut values: Vec<f64> = values
            .into()
            .into_iter()
            .map(|v| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 })
            .collect();
        if values.is_empty() {
            values.push(0.0);
        }
        Self { values, cursor: 0 }
    }

    /// A source that always returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }

    /// Number of draws taken so far.
    pub fn draws(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&mut self) -> f64 {
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_cycles() {
        let mut rng = SequenceRandom::new(vec![0.1, 0.2]);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.next_f64(), 0.2);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.draws(), 3);
    }

    #[test]
    fn test_sequence_clamps() {
        let mut rng = SequenceRandom::new(vec![-1.0, 7.0, f64::NAN]);
        assert_eq!(rng.next_f64(), 0.0);
        assert_eq!(rng.next_f64(), 1.0);
        assert_eq!(rng.next_f64(), 0.0);
    }

    #[test]
    fn test_range_and_chance() {
        let mut rng = SequenceRandom::constant(0.5);
        assert_eq!(rng.range(4.0, 10.0), 7.0);
        assert!(!rng.chance(0.4));
        assert!(rng.chance(0.6));
        assert_eq!(
            rng.duration_between(Duration::from_secs(3), Duration::from_secs(5)),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = EntropyRandom::new();
        let mut items: Vec<u32> = (0..8).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort();
        assert_eq!(sorted, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_upper_extreme_stays_in_bounds() {
        let mut rng = SequenceRandom::constant(1.0);
        let mut items = vec!['a', 'b', 'c'];
        rng.shuffle(&mut items);
        assert_eq!(items, vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_entropy_in_unit_interval() {
        let mut rng = EntropyRandom::new();
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_boxed_source() {
        let mut rng: Box<dyn RandomSource> = Box::new(SequenceRandom::constant(0.25));
        assert_eq!(rng.range(0.0, 4.0), 1.0);
    }
}
