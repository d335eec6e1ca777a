//! Objectives minimized by the stability optimizer, with analytic gradients.
//!
//! Both forms are evaluated on joint samples `[x; ẋ]` where `x` is the
//! position relative to the attractor.
//!
//! - **Likelihood**: `J = -(1/N) Σ_n log Σ_k π̃_k N([x;ẋ]; [m_k; A_k m_k], Σ_k)`
//!   with `Σ_k = L_k L_kᵀ + bias·I` and `A_k = Σ_yx Σ_xx⁻¹`.
//! - **Mean square error**: `J = (1/N) Σ_n |f(x_n) - ẋ_n|²` with the regressed
//!   velocity `f(x) = Σ_k h_k(x) A_k x` and `h_k` the normalized input-marginal
//!   responsibilities.
//!
//! Gradients are taken with respect to every packed entry of a
//! [`ParameterLayout`]; entries of the Lyapunov block get a zero gradient.

use crate::config::SedsObjective;
use crate::math_utils::constants::{LN_TWO_PI, WEIGHT_FLOOR};
use crate::math_utils::{log_sum_exp, sigmoid, spd_factorization};
use crate::seds_parameters::{lower_entries, lower_index, CovarianceFactor, ParameterLayout, SedsParameters};
use nalgebra::{DMatrix, DVector};

/// Objective bound to a sample set.
#[derive(Debug, Clone, Copy)]
pub struct ObjectiveFunction<'a> {
    objective: SedsObjective,
    samples: &'a [Vec<f64>],
}

/// Per-component quantities shared by every sample.
struct ComponentTerms {
    log_prior: f64,
    mean: DVector<f64>,
    inverse: DMatrix<f64>,
    log_normalization: f64,
}

impl ComponentTerms {
    fn new(log_prior: f64, mean: DVector<f64>, covariance: &DMatrix<f64>) -> Self {
        let factorization = spd_factorization(covariance);
        let dim = covariance.nrows() as f64;
        Self {
            log_prior,
            mean,
            log_normalization: -0.5 * (dim * LN_TWO_PI + factorization.log_determinant),
            inverse: factorization.inverse,
        }
    }

    fn log_weight(&self, point: &DVector<f64>) -> (f64, DVector<f64>) {
        let e = point - &self.mean;
        let quad = e.dot(&(&self.inverse * &e));
        (self.log_prior + self.log_normalization - 0.5 * quad, e)
    }
}

fn log_priors(params: &SedsParameters) -> Vec<f64> {
    params
        .normalized_priors()
        .iter()
        .map(|p| p.max(WEIGHT_FLOOR).ln())
        .collect()
}

fn write_lower(gradient: &mut [f64], offset: usize, m: &DMatrix<f64>) {
    for (a, b) in lower_entries(m.nrows()) {
        gradient[offset + lower_index(a, b)] = m[(a, b)];
    }
}

impl<'a> ObjectiveFunction<'a> {
    /// Objective over joint samples of length `2d`.
    pub fn new(objective: SedsObjective, samples: &'a [Vec<f64>]) -> Self {
        Self { objective, samples }
    }

    /// Objective form.
    pub fn objective(&self) -> SedsObjective {
        self.objective
    }

    /// Sample count.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Value at `params`; fills `gradient` (length `layout.len()`) when provided.
    pub fn evaluate(
        &self,
        params: &SedsParameters,
        layout: &ParameterLayout,
        gradient: Option<&mut [f64]>,
    ) -> f64 {
        if self.samples.is_empty() {
            if let Some(g) = gradient {
                g.fill(0.0);
            }
            return 0.0;
        }
        match self.objective {
            SedsObjective::Likelihood => self.negative_log_likelihood(params, layout, gradient),
            SedsObjective::MeanSquareError => self.mean_square_error(params, layout, gradient),
        }
    }

    fn negative_log_likelihood(
        &self,
        params: &SedsParameters,
        layout: &ParameterLayout,
        gradient: Option<&mut [f64]>,
    ) -> f64 {
        let d = params.dim();
        let k_count = params.n_components();
        let n = self.samples.len() as f64;
        let log_priors = log_priors(params);
        let terms: Vec<ComponentTerms> = (0..k_count)
            .map(|k| {
                ComponentTerms::new(
                    log_priors[k],
                    params.joint_mean(k),
                    &params.joint_covariance(k),
                )
            })
            .collect();

        let want_gradient = gradient.is_some();
        let mut weight = vec![0.0; k_count];
        let mut scaled_error = vec![DVector::zeros(2 * d); k_count];
        let mut scatter = vec![DMatrix::zeros(2 * d, 2 * d); k_count];

        let mut total = 0.0;
        let mut log_weights = vec![0.0; k_count];
        let mut errors = Vec::with_capacity(k_count);
        for sample in self.samples {
            let z = DVector::from_column_slice(sample);
            errors.clear();
            for (k, t) in terms.iter().enumerate() {
                let (lw, e) = t.log_weight(&z);
                log_weights[k] = lw;
                errors.push(e);
            }
            let lse = log_sum_exp(&log_weights);
            total += lse;
            if !want_gradient || !lse.is_finite() {
                continue;
            }
            for k in 0..k_count {
                let gamma = (log_weights[k] - lse).exp();
                weight[k] += gamma;
                scaled_error[k] += &terms[k].inverse * &errors[k] * gamma;
                scatter[k] += &errors[k] * errors[k].transpose() * gamma;
            }
        }

        if let Some(grad) = gradient {
            grad.fill(0.0);
            let priors = params.normalized_priors();
            for k in 0..k_count {
                if let Some(i) = layout.prior_index(k) {
                    let s = sigmoid(params.prior_logits[k]);
                    grad[i] = -(1.0 - s) * (weight[k] - n * priors[k]) / n;
                }

                let gs_x = scaled_error[k].rows(0, d).into_owned();
                let gs_y = scaled_error[k].rows(d, d).into_owned();
                let a = params.linear_map(k);

                if layout.mean_index(k, 0).is_some() {
                    let dm = (&gs_x + a.transpose() * &gs_y) * (-1.0 / n);
                    for i in 0..d {
                        if let Some(idx) = layout.mean_index(k, i) {
                            grad[idx] = dm[i];
                        }
                    }
                }

                if let (Some(offset), CovarianceFactor::Joint { lower }) =
                    (layout.covariance_offset(k), &params.factors[k])
                {
                    let inv = &terms[k].inverse;
                    let mut m = (inv * &scatter[k] * inv - inv * weight[k]) * 0.5;
                    let mean = DVector::from_column_slice(&params.means[k]);
                    let h = &gs_y * mean.transpose();
                    let sigma = params.joint_covariance(k);
                    let sxx_inv = spd_factorization(&sigma.view((0, 0), (d, d)).into_owned()).inverse;
                    let through_yx = &h * &sxx_inv;
                    let through_xx = a.transpose() * &through_yx;
                    for i in 0..d {
                        for j in 0..d {
                            m[(d + i, j)] += through_yx[(i, j)];
                            m[(i, j)] -= through_xx[(i, j)];
                        }
                    }
                    let d_lower = (&m + m.transpose()) * lower * (-1.0 / n);
                    write_lower(grad, offset, &d_lower);
                }
            }
        }

        -total / n
    }

    fn mean_square_error(
        &self,
        params: &SedsParameters,
        layout: &ParameterLayout,
        gradient: Option<&mut [f64]>,
    ) -> f64 {
        let d = params.dim();
        let k_count = params.n_components();
        let n = self.samples.len() as f64;
        let log_priors = log_priors(params);
        let terms: Vec<ComponentTerms> = (0..k_count)
            .map(|k| {
                ComponentTerms::new(
                    log_priors[k],
                    DVector::from_column_slice(&params.means[k]),
                    &params.input_covariance(k),
                )
            })
            .collect();
        let maps = params.linear_maps();

        let want_gradient = gradient.is_some();
        let mut d_map = vec![DMatrix::zeros(d, d); k_count];
        let mut d_log_weight = vec![0.0; k_count];
        let mut d_mean = vec![DVector::zeros(d); k_count];
        let mut d_scatter = vec![DMatrix::zeros(d, d); k_count];

        let mut total = 0.0;
        let mut log_weights = vec![0.0; k_count];
        let mut errors = Vec::with_capacity(k_count);
        let mut velocities = Vec::with_capacity(k_count);
        let mut h = vec![0.0; k_count];
        for sample in self.samples {
            let x = DVector::from_column_slice(&sample[..d]);
            let observed = DVector::from_column_slice(&sample[d..]);
            errors.clear();
            velocities.clear();
            for (k, t) in terms.iter().enumerate() {
                let (lw, e) = t.log_weight(&x);
                log_weights[k] = lw;
                errors.push(e);
                velocities.push(&maps[k] * &x);
            }
            let lse = log_sum_exp(&log_weights);
            let mut f = DVector::zeros(d);
            if lse.is_finite() {
                for k in 0..k_count {
                    h[k] = (log_weights[k] - lse).exp();
                    f += &velocities[k] * h[k];
                }
            } else {
                h.fill(0.0);
            }
            let r = &f - &observed;
            total += r.norm_squared();
            if !want_gradient {
                continue;
            }
            for k in 0..k_count {
                if h[k] == 0.0 {
                    continue;
                }
                let c = r.dot(&(&velocities[k] - &f));
                let hc = h[k] * c;
                d_map[k] += &r * x.transpose() * h[k];
                d_log_weight[k] += hc;
                let scaled = &terms[k].inverse * &errors[k];
                d_mean[k] += &scaled * hc;
                d_scatter[k] += &errors[k] * errors[k].transpose() * hc;
            }
        }

        if let Some(grad) = gradient {
            grad.fill(0.0);
            let scale = 2.0 / n;
            let priors = params.normalized_priors();
            let total_log_weight: f64 = d_log_weight.iter().sum();
            for k in 0..k_count {
                if let Some(i) = layout.prior_index(k) {
                    let s = sigmoid(params.prior_logits[k]);
                    grad[i] = scale * (1.0 - s) * (d_log_weight[k] - priors[k] * total_log_weight);
                }
                for i in 0..d {
                    if let Some(idx) = layout.mean_index(k, i) {
                        grad[idx] = scale * d_mean[k][i];
                    }
                }
                if let (Some(offset), CovarianceFactor::Regression { input_lower, .. }) =
                    (layout.covariance_offset(k), &params.factors[k])
                {
                    for i in 0..d {
                        for j in 0..d {
                            grad[offset + i * d + j] = scale * d_map[k][(i, j)];
                        }
                    }
                    let inv = &terms[k].inverse;
                    let g = inv * &d_scatter[k] * inv - inv * d_log_weight[k];
                    let d_lower = g * input_lower * scale;
                    write_lower(grad, offset + d * d, &d_lower);
                }
            }
        }

        total / n
    }
}
