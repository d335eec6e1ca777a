//! Seedable random number generation for initialization, reseeding and sampling.
//!
//! Every stochastic operation in the crate takes a `&mut ModelRng`, so a run is
//! fully reproducible once the generator is seeded.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// ChaCha20-backed generator used throughout the crate.
#[derive(Debug, Clone)]
pub struct ModelRng {
    rng: ChaCha20Rng,
    /// Second Box–Muller variate kept for the next call
    spare_normal: Option<f64>,
}

impl ModelRng {
    /// Create a generator seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
            spare_normal: None,
        }
    }

    /// Create a deterministic generator.
    ///
    /// The `u64` is expanded to a full 256-bit ChaCha seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            spare_normal: None,
        }
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(s) => Self::with_seed(s),
            None => Self::new(),
        }
    }

    /// Uniform f64 in [0, 1).
    pub fn f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform f64 in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.f64()
    }

    /// Uniform usize in the given range.
    pub fn usize(&mut self, range: std::ops::Range<usize>) -> usize {
        self.rng.gen_range(range)
    }

    /// Standard normal draw via the Box–Muller transform.
    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        // u1 in (0, 1] keeps ln finite
        let u1 = 1.0 - self.f64();
        let u2 = self.f64();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = crate::math_utils::constants::TWO_PI * u2;
        self.spare_normal = Some(radius * angle.sin());
        radius * angle.cos()
    }

    /// Vector of `n` independent standard normal draws.
    pub fn standard_normal_vec(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.standard_normal()).collect()
    }

    /// Index drawn proportionally to non-negative `weights`.
    ///
    /// Falls back to a uniform draw when the weights sum to zero.
    pub fn weighted_index(&mut self, weights: &[f64]) -> usize {
        if weights.is_empty() {
            return 0;
        }
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        if !(total > 0.0) || !total.is_finite() {
            return self.usize(0..weights.len());
        }
        let mut target = self.f64() * total;
        for (i, w) in weights.iter().enumerate() {
            target -= w.max(0.0);
            if target < 0.0 {
                return i;
            }
        }
        weights.len() - 1
    }
}

impl Default for ModelRng {
    fn default() -> Self {
        Self::new()
    }
}
