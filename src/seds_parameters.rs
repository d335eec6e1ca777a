//! Flat parameter vector of the stability optimizer.
//!
//! A [`ParameterLayout`] is built once per configuration and fixes the offset
//! of every block in the packed vector:
//!
//! | Block | Entries | Present when |
//! |---|---|---|
//! | prior logits `p_k` | `K` | `optimize_priors` |
//! | position means `m_k` | `K·d` | `optimize_means` |
//! | joint lower factor `L_k` | `K·d(2d+1)` | `optimize_covariances`, likelihood |
//! | linear map `A_k` + input lower factor | `K·(d² + d(d+1)/2)` | `optimize_covariances`, MSE |
//! | Lyapunov `P` (lower triangle without `P₀₀`) | `d(d+1)/2 - 1` | `LyapunovMode::Optimized` |
//!
//! `P₀₀` is pinned to 1. `P A + AᵀP` is linear in `P`, so without a fixed
//! scale the constraints could be relaxed by shrinking `P` toward zero.
//!
//! Blocks that are not optimized are read from a baseline
//! [`SedsParameters`], so `unpack(pack(θ)) == θ` holds bit for bit.

use crate::config::{LyapunovMode, SedsConfig, SedsObjective};
use crate::errors::{SedsError, SedsResult};
use crate::gaussian::Gaussian;
use crate::math_utils::{logit, sigmoid, spd_factorization};
use crate::mixture_model::Gmm;
use crate::symmetric_matrix::{packed_len, SymmetricMatrix};
use nalgebra::{DMatrix, DVector};

/// Index of `(i, j)`, `i >= j`, in a row-major lower triangle.
#[inline]
pub fn lower_index(i: usize, j: usize) -> usize {
    i * (i + 1) / 2 + j
}

/// `(i, j)` pairs of a lower triangle in storage order.
pub fn lower_entries(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(|i| (0..=i).map(move |j| (i, j)))
}

/// Free Lyapunov entries `(i, j, packed index)`; `(0, 0)` is pinned.
fn lyapunov_entries(d: usize) -> impl Iterator<Item = (usize, usize, usize)> {
    lower_entries(d)
        .skip(1)
        .map(|(i, j)| (i, j, lower_index(i, j) - 1))
}

/// Offset table of the packed parameter vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterLayout {
    n_components: usize,
    dim: usize,
    objective: SedsObjective,
    priors: Option<usize>,
    means: Option<usize>,
    covariances: Option<usize>,
    lyapunov: Option<usize>,
    len: usize,
}

impl ParameterLayout {
    /// Layout for `n_components` components over a `dim`-dimensional position space.
    pub fn new(n_components: usize, dim: usize, config: &SedsConfig) -> Self {
        let mut layout = Self {
            n_components,
            dim,
            objective: config.objective,
            priors: None,
            means: None,
            covariances: None,
            lyapunov: None,
            len: 0,
        };
        let mut offset = 0;
        if config.optimize_priors {
            layout.priors = Some(offset);
            offset += n_components;
        }
        if config.optimize_means {
            layout.means = Some(offset);
            offset += n_components * dim;
        }
        if config.optimize_covariances {
            layout.covariances = Some(offset);
            offset += n_components * layout.covariance_block_len();
        }
        if config.lyapunov == LyapunovMode::Optimized {
            layout.lyapunov = Some(offset);
            offset += packed_len(dim).saturating_sub(1);
        }
        layout.len = offset;
        layout
    }

    /// Component count `K`.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Position dimension `d`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Objective the covariance block is shaped for.
    pub fn objective(&self) -> SedsObjective {
        self.objective
    }

    /// Packed length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is optimized.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Entries per component in the covariance block.
    pub fn covariance_block_len(&self) -> usize {
        let d = self.dim;
        match self.objective {
            SedsObjective::Likelihood => packed_len(2 * d),
            SedsObjective::MeanSquareError => d * d + packed_len(d),
        }
    }

    /// Index of prior logit `k`.
    pub fn prior_index(&self, k: usize) -> Option<usize> {
        self.priors.map(|o| o + k)
    }

    /// Index of mean entry `(k, i)`.
    pub fn mean_index(&self, k: usize, i: usize) -> Option<usize> {
        self.means.map(|o| o + k * self.dim + i)
    }

    /// First index of component `k`'s covariance block.
    pub fn covariance_offset(&self, k: usize) -> Option<usize> {
        self.covariances
            .map(|o| o + k * self.covariance_block_len())
    }

    /// First index of the Lyapunov block.
    pub fn lyapunov_offset(&self) -> Option<usize> {
        self.lyapunov
    }
}

/// Covariance representation of one component.
#[derive(Debug, Clone, PartialEq)]
pub enum CovarianceFactor {
    /// Lower factor of the joint covariance, `Σ = LLᵀ + bias·I`
    Joint {
        /// `2d × 2d` lower-triangular factor
        lower: DMatrix<f64>,
    },
    /// Linear map plus input covariance factor
    Regression {
        /// `A_k`, `d × d`
        map: DMatrix<f64>,
        /// Lower factor of `Σ_xx - bias·I`
        input_lower: DMatrix<f64>,
        /// Conditional velocity covariance, kept from the initial mixture
        output_noise: DMatrix<f64>,
    },
}

/// Unpacked optimizer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SedsParameters {
    dim: usize,
    /// `p_k`, with `σ(p_k)` the unnormalized prior
    pub prior_logits: Vec<f64>,
    /// Position means `m_k`
    pub means: Vec<Vec<f64>>,
    /// Covariance representation per component
    pub factors: Vec<CovarianceFactor>,
    /// Symmetric Lyapunov matrix `P`
    pub lyapunov: DMatrix<f64>,
    /// Diagonal bias added on reconstruction
    pub bias: f64,
}

impl SedsParameters {
    /// Extracts parameters from a joint (position, velocity) mixture.
    pub fn from_mixture(gmm: &Gmm, objective: SedsObjective, bias: f64) -> SedsResult<Self> {
        if gmm.dim() == 0 || gmm.dim() % 2 != 0 {
            return Err(SedsError::DimensionMismatch {
                expected: 2 * (gmm.dim() / 2).max(1),
                actual: gmm.dim(),
                context: "joint position/velocity mixture".to_string(),
            });
        }
        let d = gmm.dim() / 2;
        let total: f64 = gmm.priors().iter().map(|p| p.max(0.0)).sum();
        let k_count = gmm.n_states() as f64;

        let mut prior_logits = Vec::with_capacity(gmm.n_states());
        let mut means = Vec::with_capacity(gmm.n_states());
        let mut factors = Vec::with_capacity(gmm.n_states());
        for g in gmm.components() {
            let pi = if total > 0.0 {
                g.prior().max(0.0) / total
            } else {
                1.0 / k_count
            };
            prior_logits.push(logit(pi));
            means.push(g.mean()[..d].to_vec());
            let sigma = g.covariance().to_dmatrix();
            factors.push(match objective {
                SedsObjective::Likelihood => CovarianceFactor::Joint {
                    lower: spd_factorization(&sigma).lower,
                },
                SedsObjective::MeanSquareError => {
                    let sxx = sigma.view((0, 0), (d, d)).into_owned();
                    let syx = sigma.view((d, 0), (d, d)).into_owned();
                    let syy = sigma.view((d, d), (d, d)).into_owned();
                    let fx = spd_factorization(&sxx);
                    let map = &syx * &fx.inverse;
                    let noise = syy - &map * syx.transpose();
                    CovarianceFactor::Regression {
                        map,
                        input_lower: fx.lower,
                        output_noise: (&noise + noise.transpose()) * 0.5,
                    }
                }
            });
        }

        Ok(Self {
            dim: d,
            prior_logits,
            means,
            factors,
            lyapunov: DMatrix::identity(d, d),
            bias,
        })
    }

    /// Position dimension `d`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Component count.
    pub fn n_components(&self) -> usize {
        self.prior_logits.len()
    }

    /// `σ(p_k)`.
    pub fn raw_priors(&self) -> Vec<f64> {
        self.prior_logits.iter().map(|&p| sigmoid(p)).collect()
    }

    /// `σ(p_k) / Σ_j σ(p_j)`.
    pub fn normalized_priors(&self) -> Vec<f64> {
        let raw = self.raw_priors();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|p| p / total).collect()
        } else {
            vec![1.0 / raw.len() as f64; raw.len()]
        }
    }

    /// Writes the optimized blocks into a vector of `layout.len()`.
    pub fn pack(&self, layout: &ParameterLayout) -> Vec<f64> {
        let mut x = vec![0.0; layout.len()];
        let d = self.dim;
        for k in 0..self.n_components() {
            if let Some(i) = layout.prior_index(k) {
                x[i] = self.prior_logits[k];
            }
            for (i, &m) in self.means[k].iter().enumerate() {
                if let Some(idx) = layout.mean_index(k, i) {
                    x[idx] = m;
                }
            }
            if let Some(offset) = layout.covariance_offset(k) {
                match &self.factors[k] {
                    CovarianceFactor::Joint { lower } => {
                        for (a, b) in lower_entries(2 * d) {
                            x[offset + lower_index(a, b)] = lower[(a, b)];
                        }
                    }
                    CovarianceFactor::Regression {
                        map, input_lower, ..
                    } => {
                        for i in 0..d {
                            for j in 0..d {
                                x[offset + i * d + j] = map[(i, j)];
                            }
                        }
                        for (a, b) in lower_entries(d) {
                            x[offset + d * d + lower_index(a, b)] = input_lower[(a, b)];
                        }
                    }
                }
            }
        }
        if let Some(offset) = layout.lyapunov_offset() {
            for (a, b, i) in lyapunov_entries(d) {
                x[offset + i] = self.lyapunov[(a, b)];
            }
        }
        x
    }

    /// Copies `self` with the optimized blocks read from `x`.
    pub fn unpack(&self, layout: &ParameterLayout, x: &[f64]) -> SedsParameters {
        let mut out = self.clone();
        let d = self.dim;
        for k in 0..self.n_components() {
            if let Some(i) = layout.prior_index(k) {
                out.prior_logits[k] = x[i];
            }
            for i in 0..d {
                if let Some(idx) = layout.mean_index(k, i) {
                    out.means[k][i] = x[idx];
                }
            }
            if let Some(offset) = layout.covariance_offset(k) {
                match &mut out.factors[k] {
                    CovarianceFactor::Joint { lower } => {
                        for (a, b) in lower_entries(2 * d) {
                            lower[(a, b)] = x[offset + lower_index(a, b)];
                        }
                    }
                    CovarianceFactor::Regression {
                        map, input_lower, ..
                    } => {
                        for i in 0..d {
                            for j in 0..d {
                                map[(i, j)] = x[offset + i * d + j];
                            }
                        }
                        for (a, b) in lower_entries(d) {
                            input_lower[(a, b)] = x[offset + d * d + lower_index(a, b)];
                        }
                    }
                }
            }
        }
        if let Some(offset) = layout.lyapunov_offset() {
            for (a, b, i) in lyapunov_entries(d) {
                let v = x[offset + i];
                out.lyapunov[(a, b)] = v;
                out.lyapunov[(b, a)] = v;
            }
        }
        out
    }

    /// Input covariance `Σ_xx` of component `k` (bias included).
    pub fn input_covariance(&self, k: usize) -> DMatrix<f64> {
        let d = self.dim;
        match &self.factors[k] {
            CovarianceFactor::Joint { .. } => self.joint_covariance(k).view((0, 0), (d, d)).into_owned(),
            CovarianceFactor::Regression { input_lower, .. } => {
                input_lower * input_lower.transpose() + DMatrix::identity(d, d) * self.bias
            }
        }
    }

    /// Joint covariance of component `k` (bias included).
    pub fn joint_covariance(&self, k: usize) -> DMatrix<f64> {
        let d = self.dim;
        match &self.factors[k] {
            CovarianceFactor::Joint { lower } => {
                lower * lower.transpose() + DMatrix::identity(2 * d, 2 * d) * self.bias
            }
            CovarianceFactor::Regression {
                map, output_noise, ..
            } => {
                let sxx = self.input_covariance(k);
                let syx = map * &sxx;
                let syy = &syx * map.transpose() + output_noise;
                let mut sigma = DMatrix::zeros(2 * d, 2 * d);
                sigma.view_mut((0, 0), (d, d)).copy_from(&sxx);
                sigma.view_mut((d, 0), (d, d)).copy_from(&syx);
                sigma.view_mut((0, d), (d, d)).copy_from(&syx.transpose());
                sigma.view_mut((d, d), (d, d)).copy_from(&syy);
                sigma
            }
        }
    }

    /// Linear dynamics `A_k = Σ_yx Σ_xx⁻¹` of component `k`.
    pub fn linear_map(&self, k: usize) -> DMatrix<f64> {
        match &self.factors[k] {
            CovarianceFactor::Joint { .. } => self.joint_linear_map(k).0,
            CovarianceFactor::Regression { map, .. } => map.clone(),
        }
    }

    /// `A_k` for every component.
    pub fn linear_maps(&self) -> Vec<DMatrix<f64>> {
        (0..self.n_components()).map(|k| self.linear_map(k)).collect()
    }

    /// `(A, Σ_xx⁻¹)` from the joint covariance.
    fn joint_linear_map(&self, k: usize) -> (DMatrix<f64>, DMatrix<f64>) {
        let d = self.dim;
        let sigma = self.joint_covariance(k);
        let sxx = sigma.view((0, 0), (d, d)).into_owned();
        let syx = sigma.view((d, 0), (d, d)).into_owned();
        let sxx_inv = spd_factorization(&sxx).inverse;
        (syx * &sxx_inv, sxx_inv)
    }

    /// Derivatives `∂A_k/∂θ_j` for every packed parameter `θ_j` that moves `A_k`.
    pub fn linear_map_sensitivities(
        &self,
        layout: &ParameterLayout,
        k: usize,
    ) -> Vec<(usize, DMatrix<f64>)> {
        let Some(offset) = layout.covariance_offset(k) else {
            return Vec::new();
        };
        let d = self.dim;
        match &self.factors[k] {
            CovarianceFactor::Joint { lower } => {
                let (a, sxx_inv) = self.joint_linear_map(k);
                lower_entries(2 * d)
                    .map(|(r, c)| {
                        // dΣ = E_rc Lᵀ + L E_cr
                        let d_sigma = DMatrix::from_fn(2 * d, 2 * d, |i, j| {
                            let mut v = 0.0;
                            if i == r {
                                v += lower[(j, c)];
                            }
                            if j == r {
                                v += lower[(i, c)];
                            }
                            v
                        });
                        let d_syx = d_sigma.view((d, 0), (d, d)).into_owned();
                        let d_sxx = d_sigma.view((0, 0), (d, d)).into_owned();
                        let d_a = (d_syx - &a * d_sxx) * &sxx_inv;
                        (offset + lower_index(r, c), d_a)
                    })
                    .collect()
            }
            CovarianceFactor::Regression { .. } => (0..d)
                .flat_map(|i| (0..d).map(move |j| (i, j)))
                .map(|(i, j)| {
                    let mut d_a = DMatrix::zeros(d, d);
                    d_a[(i, j)] = 1.0;
                    (offset + i * d + j, d_a)
                })
                .collect(),
        }
    }

    /// Derivatives `∂P/∂θ_j` for the packed Lyapunov entries (`P₀₀` excluded).
    pub fn lyapunov_sensitivities(&self, layout: &ParameterLayout) -> Vec<(usize, DMatrix<f64>)> {
        let Some(offset) = layout.lyapunov_offset() else {
            return Vec::new();
        };
        let d = self.dim;
        lyapunov_entries(d)
            .map(|(a, b, i)| {
                let mut d_p = DMatrix::zeros(d, d);
                d_p[(a, b)] = 1.0;
                d_p[(b, a)] = 1.0;
                (offset + i, d_p)
            })
            .collect()
    }

    /// Joint mean `[m_k; A_k m_k]`.
    pub fn joint_mean(&self, k: usize) -> DVector<f64> {
        let d = self.dim;
        let m = DVector::from_column_slice(&self.means[k]);
        let velocity = self.linear_map(k) * &m;
        DVector::from_fn(2 * d, |i, _| if i < d { m[i] } else { velocity[i - d] })
    }

    /// Mixture with normalized priors, joint means and joint covariances.
    pub fn to_mixture(&self) -> SedsResult<Gmm> {
        let priors = self.normalized_priors();
        let components = (0..self.n_components())
            .map(|k| {
                Gaussian::from_parts(
                    priors[k],
                    self.joint_mean(k).iter().copied().collect(),
                    SymmetricMatrix::from_dmatrix(&self.joint_covariance(k)),
                )
            })
            .collect();
        Gmm::from_components(components)
    }
}

/// Layout plus the baseline supplying non-optimized blocks.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    /// Offset table
    pub layout: ParameterLayout,
    /// Values of blocks that are held fixed
    pub baseline: SedsParameters,
}

impl ParameterSpace {
    /// Space over `baseline` with the layout implied by `config`.
    pub fn new(baseline: SedsParameters, config: &SedsConfig) -> Self {
        let layout = ParameterLayout::new(baseline.n_components(), baseline.dim(), config);
        Self { layout, baseline }
    }

    /// Packed baseline.
    pub fn initial_point(&self) -> Vec<f64> {
        self.baseline.pack(&self.layout)
    }

    /// Parameters at `x`.
    pub fn unpack(&self, x: &[f64]) -> SedsParameters {
        self.baseline.unpack(&self.layout, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constrained_solver::finite_difference_gradient;
    use assert_approx_eq::assert_approx_eq;

    pub(crate) fn sample_mixture() -> Gmm {
        let c0 = Gaussian::from_parts(
            0.3,
            vec![1.0, 0.5, -0.8, -0.4],
            SymmetricMatrix::from_full(&[
                vec![1.0, 0.2, -0.7, -0.1],
                vec![0.2, 0.8, -0.1, -0.5],
                vec![-0.7, -0.1, 0.9, 0.1],
                vec![-0.1, -0.5, 0.1, 0.6],
            ]),
        );
        let c1 = Gaussian::from_parts(
            0.7,
            vec![-1.0, 1.0, 0.9, -1.0],
            SymmetricMatrix::from_full(&[
                vec![0.7, -0.1, -0.5, 0.0],
                vec![-0.1, 1.2, 0.1, -0.9],
                vec![-0.5, 0.1, 0.8, 0.0],
                vec![0.0, -0.9, 0.0, 1.1],
            ]),
        );
        Gmm::from_components(vec![c0, c1]).unwrap()
    }

    fn configs() -> Vec<SedsConfig> {
        let mut partial = SedsConfig::mean_square_error();
        partial.optimize_means = false;
        vec![
            SedsConfig::likelihood(),
            SedsConfig::mean_square_error(),
            SedsConfig::with_lyapunov(),
            partial,
        ]
    }

    #[test]
    fn test_layout_lengths() {
        let likelihood = ParameterLayout::new(2, 2, &SedsConfig::likelihood());
        assert_eq!(likelihood.len(), 2 + 4 + 2 * 10);
        let mse = ParameterLayout::new(2, 2, &SedsConfig::mean_square_error());
        assert_eq!(mse.len(), 2 + 4 + 2 * (4 + 3));
        let lyap = ParameterLayout::new(3, 2, &SedsConfig::with_lyapunov());
        assert_eq!(lyap.len(), 3 + 6 + 3 * 10 + 2);
        assert_eq!(lyap.lyapunov_offset(), Some(39));

        let mut none = SedsConfig::likelihood();
        none.optimize_priors = false;
        none.optimize_means = false;
        none.optimize_covariances = false;
        assert!(ParameterLayout::new(2, 2, &none).is_empty());
    }

    #[test]
    fn test_pack_unpack_exact_inverse() {
        let gmm = sample_mixture();
        for config in configs() {
            let params = SedsParameters::from_mixture(&gmm, config.objective, 1e-10).unwrap();
            let space = ParameterSpace::new(params.clone(), &config);
            let x = space.initial_point();
            assert_eq!(space.unpack(&x), params);

            let shifted: Vec<f64> = x.iter().enumerate().map(|(i, v)| v + 0.01 * i as f64).collect();
            let repacked = space.unpack(&shifted).pack(&space.layout);
            assert_eq!(repacked, shifted);
        }
    }

    #[test]
    fn test_from_mixture_reconstructs_covariance() {
        let gmm = sample_mixture();
        let params = SedsParameters::from_mixture(&gmm, SedsObjective::Likelihood, 0.0).unwrap();
        let sigma = params.joint_covariance(1);
        let original = gmm.component(1).covariance();
        for i in 0..4 {
            for j in 0..4 {
                assert_approx_eq!(sigma[(i, j)], original.get(i, j), 1e-12);
            }
        }
        let priors = params.normalized_priors();
        assert_approx_eq!(priors[0], 0.3, 1e-12);
    }

    #[test]
    fn test_regression_form_preserves_linear_map() {
        let gmm = sample_mixture();
        let joint = SedsParameters::from_mixture(&gmm, SedsObjective::Likelihood, 0.0).unwrap();
        let regression =
            SedsParameters::from_mixture(&gmm, SedsObjective::MeanSquareError, 0.0).unwrap();
        for k in 0..2 {
            let a = joint.linear_map(k);
            let b = regression.linear_map(k);
            assert!((a - b).abs().max() < 1e-10);
        }
        // exported covariance reproduces the map
        let exported = regression.to_mixture().unwrap();
        let again = SedsParameters::from_mixture(&exported, SedsObjective::Likelihood, 0.0).unwrap();
        assert!((again.linear_map(0) - regression.linear_map(0)).abs().max() < 1e-9);
    }

    #[test]
    fn test_to_mixture_velocity_mean_follows_map() {
        let gmm = sample_mixture();
        let params = SedsParameters::from_mixture(&gmm, SedsObjective::Likelihood, 1e-10).unwrap();
        let out = params.to_mixture().unwrap();
        let a = params.linear_map(0);
        let m = DVector::from_column_slice(&params.means[0]);
        let v = a * m;
        assert_approx_eq!(out.component(0).mean()[2], v[0], 1e-12);
        assert_approx_eq!(out.component(0).mean()[3], v[1], 1e-12);
        assert_approx_eq!(out.priors().iter().sum::<f64>(), 1.0, 1e-12);
    }

    #[test]
    fn test_linear_map_sensitivities_match_finite_differences() {
        let gmm = sample_mixture();
        for config in [SedsConfig::likelihood(), SedsConfig::mean_square_error()] {
            let params = SedsParameters::from_mixture(&gmm, config.objective, 1e-10).unwrap();
            let space = ParameterSpace::new(params, &config);
            let x = space.initial_point();
            for k in 0..2 {
                for (j, d_a) in space.baseline.linear_map_sensitivities(&space.layout, k) {
                    for r in 0..2 {
                        for c in 0..2 {
                            let f = |z: &[f64]| space.unpack(z).linear_map(k)[(r, c)];
                            let numeric = finite_difference_gradient(f, &x, 1e-6)[j];
                            assert!(
                                (numeric - d_a[(r, c)]).abs() < 1e-6,
                                "k={} param={} entry=({},{}): {} vs {}",
                                k,
                                j,
                                r,
                                c,
                                numeric,
                                d_a[(r, c)]
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_lyapunov_unpack_symmetric() {
        let gmm = sample_mixture();
        let config = SedsConfig::with_lyapunov();
        let params = SedsParameters::from_mixture(&gmm, config.objective, 1e-10).unwrap();
        let space = ParameterSpace::new(params, &config);
        let mut x = space.initial_point();
        let offset = space.layout.lyapunov_offset().unwrap();
        x[offset] = 0.25;
        x[offset + 1] = 2.0;
        let p = space.unpack(&x).lyapunov;
        assert_eq!(p[(0, 1)], 0.25);
        assert_eq!(p[(1, 0)], 0.25);
        assert_eq!(p[(1, 1)], 2.0);
        // scale stays pinned
        assert_eq!(p[(0, 0)], 1.0);
        assert_eq!(space.baseline.lyapunov_sensitivities(&space.layout).len(), 2);
    }

    #[test]
    fn test_odd_dimension_rejected() {
        let gmm = Gmm::new(2, 3);
        assert!(matches!(
            SedsParameters::from_mixture(&gmm, SedsObjective::Likelihood, 0.0),
            Err(SedsError::DimensionMismatch { .. })
        ));
    }
}
