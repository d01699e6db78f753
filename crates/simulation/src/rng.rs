//! Seeded random sampling.

use flowsim_types::TimeRange;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic uniform sampler.
///
/// Every random decision in a run goes through one instance, so the seed
/// alone fixes the sequence of sampled values.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform sample from `[min, max]`. A degenerate range returns `min`
    /// without consuming randomness.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    /// Uniform sample from a time range, in seconds.
    pub fn sample(&mut self, range: TimeRange) -> f64 {
        self.uniform(range.min(), range.max())
    }

    /// Bernoulli trial. Probabilities at or beyond the bounds are decided
    /// without consuming randomness.
    pub fn chance(&mut self, probability: f64) -> bool {
        if probability >= 1.0 {
            true
        } else if probability <= 0.0 || probability.is_nan() {
            false
        } else {
            self.rng.gen_bool(probability)
        }
    }

    /// Restart the sequence from the seed given at construction.
    pub fn reset(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}
