//! Gaussian mixture regression: conditional output distribution given inputs.
//!
//! For a partition of the mixture's dimensions into inputs `i` and outputs
//! `o`, each component contributes the conditional Gaussian
//! `N(μ_o + R_k (x - μ_i), Σ_oo - R_k Σ_io)` with `R_k = Σ_oi Σ_ii⁻¹`,
//! weighted by its input-marginal density at `x`.

use crate::errors::{validate_all_finite, validate_dimension, SedsError, SedsResult};
use crate::gaussian::Gaussian;
use crate::math_utils::log_sum_exp;
use crate::mixture_model::Gmm;
use crate::random::ModelRng;
use crate::symmetric_matrix::SymmetricMatrix;

/// Cached regression state of one component.
#[derive(Debug, Clone)]
struct RegressionComponent {
    prior: f64,
    input_marginal: Gaussian,
    output_mean: Vec<f64>,
    /// `R_k`, one row per output dimension
    coefficients: Vec<Vec<f64>>,
    conditional_covariance: SymmetricMatrix,
}

impl RegressionComponent {
    fn conditional_mean(&self, x: &[f64]) -> Vec<f64> {
        let mu_in = self.input_marginal.mean();
        self.coefficients
            .iter()
            .zip(&self.output_mean)
            .map(|(row, mu)| {
                mu + row
                    .iter()
                    .zip(x.iter().zip(mu_in))
                    .map(|(r, (xi, mi))| r * (xi - mi))
                    .sum::<f64>()
            })
            .collect()
    }
}

/// Conditional mean and covariance of the outputs.
#[derive(Debug, Clone)]
pub struct RegressionOutput {
    /// `Σ_k h_k μ_k^cond`
    pub mean: Vec<f64>,
    /// `Σ_k h_k² Σ_k^cond`
    pub covariance: SymmetricMatrix,
}

/// Gaussian mixture regression over a fixed input/output split.
#[derive(Debug, Clone)]
pub struct Gmr {
    input_dims: Vec<usize>,
    output_dims: Vec<usize>,
    components: Vec<RegressionComponent>,
    revision: u64,
}

impl Gmr {
    /// Validates the split and builds the per-component cache from `gmm`.
    pub fn new(gmm: &Gmm, input_dims: Vec<usize>, output_dims: Vec<usize>) -> SedsResult<Self> {
        if input_dims.is_empty() || output_dims.is_empty() {
            return Err(SedsError::InvalidParameter {
                parameter: "input/output dims".to_string(),
                value: input_dims.len().min(output_dims.len()) as f64,
                constraint: "both non-empty".to_string(),
            });
        }
        let mut seen = vec![false; gmm.dim()];
        for &d in input_dims.iter().chain(&output_dims) {
            if d >= gmm.dim() || seen[d] {
                return Err(SedsError::InvalidParameter {
                    parameter: "regression dimension".to_string(),
                    value: d as f64,
                    constraint: format!("distinct indices below {}", gmm.dim()),
                });
            }
            seen[d] = true;
        }
        let mut gmr = Self {
            input_dims,
            output_dims,
            components: Vec::new(),
            revision: 0,
        };
        gmr.init(gmm)?;
        Ok(gmr)
    }

    /// Input dimension indices.
    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    /// Output dimension indices.
    pub fn output_dims(&self) -> &[usize] {
        &self.output_dims
    }

    /// Rebuilds marginals and regression matrices from `gmm`.
    pub fn init(&mut self, gmm: &Gmm) -> SedsResult<()> {
        let needed = self.input_dims.len() + self.output_dims.len();
        if gmm.dim() < needed {
            return Err(SedsError::DimensionMismatch {
                expected: needed,
                actual: gmm.dim(),
                context: "regression mixture".to_string(),
            });
        }
        self.components = gmm
            .components()
            .iter()
            .map(|g| self.build_component(g))
            .collect();
        self.revision = gmm.revision();
        Ok(())
    }

    fn build_component(&self, g: &Gaussian) -> RegressionComponent {
        let input_marginal = g.project(&self.input_dims);
        let cov = g.covariance();
        let coefficients: Vec<Vec<f64>> = self
            .output_dims
            .iter()
            .map(|&o| {
                let cross: Vec<f64> = self.input_dims.iter().map(|&i| cov.get(i, o)).collect();
                input_marginal.solve(&cross)
            })
            .collect();

        let n_out = self.output_dims.len();
        let mut conditional_covariance = SymmetricMatrix::zeros(n_out);
        for a in 0..n_out {
            for b in a..n_out {
                let correction: f64 = self
                    .input_dims
                    .iter()
                    .enumerate()
                    .map(|(c, &i)| coefficients[a][c] * cov.get(i, self.output_dims[b]))
                    .sum();
                let v = cov.get(self.output_dims[a], self.output_dims[b]) - correction;
                conditional_covariance.set(a, b, v);
            }
        }

        RegressionComponent {
            prior: g.prior(),
            output_mean: self.output_dims.iter().map(|&o| g.mean()[o]).collect(),
            input_marginal,
            coefficients,
            conditional_covariance,
        }
    }

    /// Whether `gmm` was mutated since the last `init`.
    pub fn is_stale_for(&self, gmm: &Gmm) -> bool {
        self.revision != gmm.revision() || self.components.len() != gmm.n_states()
    }

    /// Cached `R_k` (rows indexed by output dimension).
    pub fn coefficients(&self, k: usize) -> &[Vec<f64>] {
        &self.components[k].coefficients
    }

    /// Normalized input-marginal weights `h_k(x)`; `None` if no component carries weight.
    pub fn component_weights(&self, x: &[f64]) -> SedsResult<Option<Vec<f64>>> {
        validate_dimension(self.input_dims.len(), x.len(), "regression input")?;
        validate_all_finite(x, "regression input")?;
        Ok(self.weights_unchecked(x))
    }

    fn weights_unchecked(&self, x: &[f64]) -> Option<Vec<f64>> {
        let log_weights: Vec<f64> = self
            .components
            .iter()
            .map(|c| c.prior.ln() + c.input_marginal.log_density(x))
            .collect();
        let normalizer = log_sum_exp(&log_weights);
        if !normalizer.is_finite() {
            return None;
        }
        Some(log_weights.iter().map(|l| (l - normalizer).exp()).collect())
    }

    /// Conditional output mean and covariance at `x`.
    ///
    /// Returns a zero mean and zero covariance when no component carries weight.
    pub fn regress(&self, x: &[f64]) -> SedsResult<RegressionOutput> {
        let n_out = self.output_dims.len();
        let weights = match self.component_weights(x)? {
            Some(w) => w,
            None => {
                return Ok(RegressionOutput {
                    mean: vec![0.0; n_out],
                    covariance: SymmetricMatrix::zeros(n_out),
                })
            }
        };

        let mut mean = vec![0.0; n_out];
        let mut covariance = SymmetricMatrix::zeros(n_out);
        for (c, &h) in self.components.iter().zip(&weights) {
            if h == 0.0 {
                continue;
            }
            for (m, v) in mean.iter_mut().zip(c.conditional_mean(x)) {
                *m += h * v;
            }
            for a in 0..n_out {
                for b in a..n_out {
                    let v = covariance.get(a, b) + h * h * c.conditional_covariance.get(a, b);
                    covariance.set(a, b, v);
                }
            }
        }
        Ok(RegressionOutput { mean, covariance })
    }

    /// Picks a component by input-marginal weight and samples its conditional Gaussian.
    pub fn sample_conditional(&self, x: &[f64], rng: &mut ModelRng) -> SedsResult<Vec<f64>> {
        let weights = match self.component_weights(x)? {
            Some(w) => w,
            None => return Ok(vec![0.0; self.output_dims.len()]),
        };
        let k = rng.weighted_index(&weights);
        let c = &self.components[k];
        let conditional =
            Gaussian::from_parts(1.0, c.conditional_mean(x), c.conditional_covariance.clone());
        Ok(conditional.sample(rng))
    }
}
