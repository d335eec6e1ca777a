//! Single multivariate normal component.
//!
//! The Cholesky factor, its inverted diagonal and the normalization constant
//! are derived from the covariance on first use and cached. Every covariance
//! mutator drops the cache, so stale factors are never observed.

use crate::math_utils::constants::{
    BIAS_LADDER, DENSITY_FLOOR, LN_TWO_PI, MIN_NORMALIZATION,
};
use crate::random::ModelRng;
use crate::symmetric_matrix::SymmetricMatrix;
use log::{debug, warn};
use once_cell::sync::OnceCell;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Derived factorization state of a covariance matrix.
#[derive(Debug, Clone)]
pub struct CholeskyState {
    /// Upper factor `U` with `UᵀU = Σ + bias·I`
    pub factor: SymmetricMatrix,
    /// `1 / U_ii`
    pub inverse_diagonal: Vec<f64>,
    /// `sqrt((2π)^d det Σ)`, floored
    pub normalization: f64,
    /// `ln` of `normalization`
    pub log_normalization: f64,
    /// Diagonal bias that made the factorization succeed
    pub bias: f64,
}

/// Multivariate normal component with an attached (unnormalized) prior.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gaussian {
    prior: f64,
    mean: Vec<f64>,
    covariance: SymmetricMatrix,
    #[cfg_attr(feature = "serde", serde(skip))]
    cache: OnceCell<CholeskyState>,
}

impl Gaussian {
    /// Zero mean, identity covariance, unit prior.
    pub fn new(dim: usize) -> Self {
        Self {
            prior: 1.0,
            mean: vec![0.0; dim],
            covariance: SymmetricMatrix::identity(dim),
            cache: OnceCell::new(),
        }
    }

    /// Component from explicit parameters.
    pub fn from_parts(prior: f64, mean: Vec<f64>, covariance: SymmetricMatrix) -> Self {
        Self {
            prior,
            mean,
            covariance,
            cache: OnceCell::new(),
        }
    }

    /// Dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Prior weight.
    #[inline]
    pub fn prior(&self) -> f64 {
        self.prior
    }

    /// Mean vector.
    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Covariance matrix (without factorization bias).
    #[inline]
    pub fn covariance(&self) -> &SymmetricMatrix {
        &self.covariance
    }

    /// Sets the prior weight.
    pub fn set_prior(&mut self, prior: f64) {
        self.prior = prior;
    }

    /// Sets the mean; the factorization does not depend on it.
    pub fn set_mean(&mut self, mean: Vec<f64>) {
        self.mean = mean;
    }

    /// Replaces the covariance and drops the cached factorization.
    pub fn set_covariance(&mut self, covariance: SymmetricMatrix) {
        self.covariance = covariance;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.cache = OnceCell::new();
    }

    /// Cached factorization, computed on first access.
    pub fn cholesky_state(&self) -> &CholeskyState {
        self.cache.get_or_init(|| factorize(&self.covariance))
    }

    /// Upper Cholesky factor of the (biased) covariance.
    pub fn factor(&self) -> &SymmetricMatrix {
        &self.cholesky_state().factor
    }

    /// Normalization factor `sqrt((2π)^d det Σ)`.
    pub fn normalization(&self) -> f64 {
        self.cholesky_state().normalization
    }

    /// Diagonal bias applied by the last factorization.
    pub fn applied_bias(&self) -> f64 {
        self.cholesky_state().bias
    }

    /// `(x-μ)ᵀ Σ⁻¹ (x-μ)` via the forward substitution with inverted pivots.
    pub fn mahalanobis_squared(&self, x: &[f64]) -> f64 {
        let state = self.cholesky_state();
        let n = self.dim();
        let mut y = vec![0.0; n];
        let mut total = 0.0;
        for i in 0..n {
            let mut s = x[i] - self.mean[i];
            for k in 0..i {
                s -= state.factor.get(k, i) * y[k];
            }
            y[i] = s * state.inverse_diagonal[i];
            total += y[i] * y[i];
        }
        total
    }

    /// Log density at `x`.
    pub fn log_density(&self, x: &[f64]) -> f64 {
        -0.5 * self.mahalanobis_squared(x) - self.cholesky_state().log_normalization
    }

    /// Density at `x`, never below `f64::MIN_POSITIVE`.
    pub fn density(&self, x: &[f64]) -> f64 {
        let p = self.log_density(x).exp();
        if p.is_finite() {
            p.max(DENSITY_FLOOR)
        } else if p.is_nan() {
            DENSITY_FLOOR
        } else {
            f64::MAX
        }
    }

    /// `Σ⁻¹·b` through the cached factor.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        SymmetricMatrix::cholesky_solve(self.factor(), b)
    }

    /// Draws `μ + Uᵀz` with `z ~ N(0, I)`.
    pub fn sample(&self, rng: &mut ModelRng) -> Vec<f64> {
        let u = self.factor();
        let z = rng.standard_normal_vec(self.dim());
        (0..self.dim())
            .map(|i| self.mean[i] + (0..=i).map(|k| u.get(k, i) * z[k]).sum::<f64>())
            .collect()
    }

    /// Marginal over `dims`, keeping the prior.
    pub fn project(&self, dims: &[usize]) -> Gaussian {
        Gaussian::from_parts(
            self.prior,
            dims.iter().map(|&d| self.mean[d]).collect(),
            self.covariance.submatrix(dims),
        )
    }

    /// Moves mean and covariance toward `x` with rate `learning_rate ∈ [0, 1]`.
    pub fn update(&mut self, x: &[f64], learning_rate: f64) {
        let rate = learning_rate.clamp(0.0, 1.0);
        let n = self.dim();
        let delta: Vec<f64> = (0..n).map(|i| x[i] - self.mean[i]).collect();
        for i in 0..n {
            self.mean[i] += rate * delta[i];
            for j in i..n {
                let v = (1.0 - rate) * self.covariance.get(i, j) + rate * delta[i] * delta[j];
                self.covariance.set(i, j, v);
            }
        }
        self.invalidate();
    }
}

/// Factorizes `covariance`, escalating a diagonal bias along [`BIAS_LADDER`].
fn factorize(covariance: &SymmetricMatrix) -> CholeskyState {
    let dim = covariance.dim();
    let diagonal = covariance.diagonal();
    let mean_diagonal = if dim > 0 {
        diagonal.iter().map(|v| v.abs()).sum::<f64>() / dim as f64
    } else {
        0.0
    };
    let scale = if mean_diagonal.is_finite() {
        mean_diagonal.max(1.0)
    } else {
        1.0
    };

    let mut underflowing: Option<(SymmetricMatrix, f64)> = None;
    for (level, &multiplier) in BIAS_LADDER.iter().enumerate() {
        let bias = multiplier * scale;
        let mut biased = covariance.clone();
        biased.add_to_diagonal(bias);
        if let Some(factor) = biased.cholesky() {
            let log_normalization =
                0.5 * (dim as f64 * LN_TWO_PI + SymmetricMatrix::log_determinant_from_factor(&factor));
            let normalization = log_normalization.exp();
            if normalization >= f64::MIN_POSITIVE && normalization.is_finite() {
                if level > 1 {
                    warn!(
                        "covariance factorization needed diagonal bias {:.3e} (level {})",
                        bias, level
                    );
                }
                return build_state(factor, bias, normalization, log_normalization);
            }
            debug!(
                "normalization underflow at bias {:.3e}, escalating",
                bias
            );
            underflowing = Some((factor, bias));
        }
    }

    if let Some((factor, bias)) = underflowing {
        warn!("normalization factor floored after bias {:.3e}", bias);
        return build_state(factor, bias, MIN_NORMALIZATION, MIN_NORMALIZATION.ln());
    }

    // Every biased factorization failed (non-finite entries); fall back to the diagonal.
    let bias = BIAS_LADDER[BIAS_LADDER.len() - 1] * scale;
    warn!("covariance not factorizable, using diagonal factor with bias {:.3e}", bias);
    let mut factor = SymmetricMatrix::zeros(dim);
    for (i, v) in diagonal.iter().enumerate() {
        let d = if v.is_finite() { v.abs() + bias } else { bias };
        factor.set(i, i, d.sqrt());
    }
    let log_normalization =
        0.5 * (dim as f64 * LN_TWO_PI + SymmetricMatrix::log_determinant_from_factor(&factor));
    let normalization = log_normalization.exp().max(MIN_NORMALIZATION);
    build_state(factor, bias, normalization, normalization.ln())
}

fn build_state(
    factor: SymmetricMatrix,
    bias: f64,
    normalization: f64,
    log_normalization: f64,
) -> CholeskyState {
    let inverse_diagonal = factor.diagonal().iter().map(|d| 1.0 / d).collect();
    CholeskyState {
        factor,
        inverse_diagonal,
        normalization,
        log_normalization,
        bias,
    }
}
