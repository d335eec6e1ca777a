//! Lyapunov stability constraints on the per-component linear dynamics.
//!
//! The mixture field `f(x) = Σ_k h_k(x) A_k x` is globally asymptotically
//! stable at the origin if `B_k = P A_k + A_kᵀ P` is negative definite for
//! every `k`. Constraint rows are laid out component-major (`d` rows per
//! component) followed by `d` rows enforcing `P ≻ 0` when `P` is optimized.
//! An optimized `P` keeps `P₀₀ = 1`, so its first positivity row is constant.
//! Every row is an inequality `c <= 0`.

use crate::config::{SedsConfig, StabilityCriterion};
use crate::constrained_solver::finite_difference_jacobian;
use crate::math_utils::{cofactor_matrix, determinant, sorted_symmetric_eigenvalues};
use crate::seds_parameters::{ParameterLayout, ParameterSpace, SedsParameters};
use nalgebra::DMatrix;

/// `P A + Aᵀ P`.
pub fn stability_matrix(lyapunov: &DMatrix<f64>, map: &DMatrix<f64>) -> DMatrix<f64> {
    let pa = lyapunov * map;
    &pa + pa.transpose()
}

/// Owner of a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOwner {
    /// Negative definiteness of component `k`'s `B_k`
    Component(usize),
    /// Positive definiteness of `P`
    Lyapunov,
}

/// Maps row `row` to its owner and its index within the owner (minor size - 1 or eigenvalue rank).
pub fn constraint_owner(layout: &ParameterLayout, row: usize) -> (ConstraintOwner, usize) {
    let d = layout.dim().max(1);
    let component = row / d;
    if component < layout.n_components() {
        (ConstraintOwner::Component(component), row % d)
    } else {
        (ConstraintOwner::Lyapunov, row - layout.n_components() * d)
    }
}

/// A family of stability constraints over the packed parameters.
pub trait StabilityConstraints {
    /// Rows produced for `layout`.
    fn count(&self, layout: &ParameterLayout) -> usize {
        let lyapunov_rows = if layout.lyapunov_offset().is_some() {
            layout.dim()
        } else {
            0
        };
        layout.n_components() * layout.dim() + lyapunov_rows
    }

    /// Fills `values` at `x`; fills the row-major Jacobian when provided.
    fn evaluate(
        &self,
        space: &ParameterSpace,
        x: &[f64],
        values: &mut [f64],
        jacobian: Option<&mut [f64]>,
    );
}

/// Alternating-sign leading principal minors with cofactor gradients.
///
/// For minor size `s`, row value is `(-1)^(s+1) det(B_s) + margin`, so the
/// `1×1` minor must be negative, the `2×2` positive, and so on.
#[derive(Debug, Clone)]
pub struct AnalyticPrincipalMinor {
    margin: f64,
}

impl AnalyticPrincipalMinor {
    /// Rows must stay below `-margin`.
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }
}

fn minor_sign(size: usize) -> f64 {
    if size % 2 == 1 {
        1.0
    } else {
        -1.0
    }
}

/// `Σ_ab cof_ab · d_ab` over the leading `s × s` block.
fn cofactor_contraction(cofactor: &DMatrix<f64>, derivative: &DMatrix<f64>) -> f64 {
    let s = cofactor.nrows();
    let mut acc = 0.0;
    for a in 0..s {
        for b in 0..s {
            acc += cofactor[(a, b)] * derivative[(a, b)];
        }
    }
    acc
}

impl StabilityConstraints for AnalyticPrincipalMinor {
    fn evaluate(
        &self,
        space: &ParameterSpace,
        x: &[f64],
        values: &mut [f64],
        mut jacobian: Option<&mut [f64]>,
    ) {
        let layout = &space.layout;
        let params = space.unpack(x);
        let d = params.dim();
        let n = layout.len();
        let p = &params.lyapunov;
        if let Some(jac) = jacobian.as_deref_mut() {
            jac.fill(0.0);
        }
        let lyapunov_sensitivities = params.lyapunov_sensitivities(layout);

        for k in 0..params.n_components() {
            let a = params.linear_map(k);
            let b = stability_matrix(p, &a);
            let map_derivatives: Vec<(usize, DMatrix<f64>)> = if jacobian.is_some() {
                params
                    .linear_map_sensitivities(layout, k)
                    .into_iter()
                    .map(|(j, da)| (j, stability_matrix(p, &da)))
                    .chain(
                        lyapunov_sensitivities
                            .iter()
                            .map(|(j, dp)| (*j, stability_matrix(dp, &a))),
                    )
                    .collect()
            } else {
                Vec::new()
            };

            for s in 1..=d {
                let row = k * d + s - 1;
                let minor = b.view((0, 0), (s, s)).into_owned();
                let sign = minor_sign(s);
                values[row] = sign * determinant(&minor) + self.margin;
                if let Some(jac) = jacobian.as_deref_mut() {
                    let cofactor = cofactor_matrix(&minor);
                    for (j, db) in &map_derivatives {
                        jac[row * n + j] = sign * cofactor_contraction(&cofactor, db);
                    }
                }
            }
        }

        if layout.lyapunov_offset().is_some() {
            let base = params.n_components() * d;
            for s in 1..=d {
                let row = base + s - 1;
                let minor = p.view((0, 0), (s, s)).into_owned();
                values[row] = self.margin - determinant(&minor);
                if let Some(jac) = jacobian.as_deref_mut() {
                    let cofactor = cofactor_matrix(&minor);
                    for (j, dp) in &lyapunov_sensitivities {
                        jac[row * n + j] = -cofactor_contraction(&cofactor, dp);
                    }
                }
            }
        }
    }
}

/// Sorted eigenvalues with central finite-difference gradients.
#[derive(Debug, Clone)]
pub struct FiniteDifferenceEigenvalue {
    margin: f64,
    step: f64,
}

impl FiniteDifferenceEigenvalue {
    /// Rows must stay below `-margin`; `step` is the relative differencing step.
    pub fn new(margin: f64, step: f64) -> Self {
        Self { margin, step }
    }

    fn values_at(&self, params: &SedsParameters, layout: &ParameterLayout, values: &mut [f64]) {
        let d = params.dim();
        for k in 0..params.n_components() {
            let b = stability_matrix(&params.lyapunov, &params.linear_map(k));
            for (i, lambda) in sorted_symmetric_eigenvalues(&b).into_iter().enumerate() {
                values[k * d + i] = lambda + self.margin;
            }
        }
        if layout.lyapunov_offset().is_some() {
            let base = params.n_components() * d;
            for (i, lambda) in sorted_symmetric_eigenvalues(&params.lyapunov)
                .into_iter()
                .enumerate()
            {
                values[base + i] = self.margin - lambda;
            }
        }
    }
}

impl StabilityConstraints for FiniteDifferenceEigenvalue {
    fn evaluate(
        &self,
        space: &ParameterSpace,
        x: &[f64],
        values: &mut [f64],
        jacobian: Option<&mut [f64]>,
    ) {
        let layout = &space.layout;
        self.values_at(&space.unpack(x), layout, values);
        if let Some(jac) = jacobian {
            let m = values.len();
            let numeric = finite_difference_jacobian(
                |z, out| self.values_at(&space.unpack(z), layout, out),
                m,
                x,
                self.step,
            );
            jac.copy_from_slice(&numeric);
        }
    }
}

/// Constraint family selected by [`StabilityCriterion`].
#[derive(Debug, Clone)]
pub enum ConstraintProvider {
    /// Analytic principal minors
    PrincipalMinor(AnalyticPrincipalMinor),
    /// Numerically differentiated eigenvalues
    Eigenvalue(FiniteDifferenceEigenvalue),
}

impl ConstraintProvider {
    /// Provider for `config.criterion`.
    pub fn from_config(config: &SedsConfig) -> Self {
        match config.criterion {
            StabilityCriterion::PrincipalMinors => {
                Self::PrincipalMinor(AnalyticPrincipalMinor::new(config.constraint_margin))
            }
            StabilityCriterion::Eigenvalues => Self::Eigenvalue(FiniteDifferenceEigenvalue::new(
                config.constraint_margin,
                config.finite_difference_step,
            )),
        }
    }
}

impl StabilityConstraints for ConstraintProvider {
    fn evaluate(
        &self,
        space: &ParameterSpace,
        x: &[f64],
        values: &mut [f64],
        jacobian: Option<&mut [f64]>,
    ) {
        match self {
            Self::PrincipalMinor(c) => c.evaluate(space, x, values, jacobian),
            Self::Eigenvalue(c) => c.evaluate(space, x, values, jacobian),
        }
    }
}

/// Largest eigenvalue of `P A_k + A_kᵀ P` for each map; all negative means stable.
pub fn stability_margins(lyapunov: &DMatrix<f64>, maps: &[DMatrix<f64>]) -> Vec<f64> {
    maps.iter()
        .map(|a| {
            sorted_symmetric_eigenvalues(&stability_matrix(lyapunov, a))
                .last()
                .copied()
                .unwrap_or(f64::NEG_INFINITY)
        })
        .collect()
}
