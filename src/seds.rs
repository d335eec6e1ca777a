//! Stable estimator of dynamical systems.
//!
//! [`StableDynamicsOptimizer`] refines a joint (position, velocity) mixture
//! so that the regressed velocity field `f(x) = Σ_k h_k(x) A_k x` is globally
//! asymptotically stable at the origin. Parameters are packed with a
//! [`ParameterSpace`], the objective comes from [`ObjectiveFunction`], the
//! Lyapunov constraints from a [`ConstraintProvider`], and the problem is
//! handed to the [`ConstrainedSolver`].
//!
//! Non-convergence and residual constraint violations are reported in the
//! returned [`SedsReport`] and logged; the best parameters found are always
//! unpacked and kept.

use crate::config::SedsConfig;
use crate::constrained_solver::{ConstrainedProblem, ConstrainedSolver, SolverOptions, SolverReport, SolverStatus};
use crate::errors::{validate_samples, SedsError, SedsResult};
use crate::mixture_model::Gmm;
use crate::mixture_regression::Gmr;
use crate::seds_constraints::{
    constraint_owner, stability_margins, ConstraintOwner, ConstraintProvider, StabilityConstraints,
};
use crate::seds_objective::ObjectiveFunction;
use crate::seds_parameters::{ParameterSpace, SedsParameters};
use log::{info, warn};
use nalgebra::DMatrix;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle of one optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OptimizerState {
    /// Nothing optimized yet
    Uninitialized,
    /// Parameter vector built from the input mixture
    Packed,
    /// Solver running
    Optimizing,
    /// Solver converged and every constraint holds
    Converged,
    /// Solver stopped early or constraints remain violated; best parameters kept
    Failed,
}

/// A constraint row still violated after optimization.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintViolation {
    /// Component index, `None` for the `P ≻ 0` rows
    pub component: Option<usize>,
    /// Minor size minus one, or eigenvalue rank
    pub index: usize,
    /// Constraint value (positive)
    pub value: f64,
}

/// Outcome of [`StableDynamicsOptimizer::optimize`].
#[derive(Debug, Clone)]
pub struct SedsReport {
    /// Raw solver outcome
    pub solver: SolverReport,
    /// Objective at the packed input mixture
    pub initial_objective: f64,
    /// Objective at the returned parameters
    pub final_objective: f64,
    /// Rows exceeding the constraint tolerance
    pub violations: Vec<ConstraintViolation>,
    /// Lyapunov matrix used by the constraints
    pub lyapunov: DMatrix<f64>,
}

impl SedsReport {
    /// Solver converged and no violations remain.
    pub fn is_stable(&self) -> bool {
        self.solver.status == SolverStatus::Converged && self.violations.is_empty()
    }
}

/// Objective plus constraints over one parameter space.
struct SedsProblem<'a> {
    space: ParameterSpace,
    objective: ObjectiveFunction<'a>,
    constraints: ConstraintProvider,
}

impl ConstrainedProblem for SedsProblem<'_> {
    fn dimension(&self) -> usize {
        self.space.layout.len()
    }

    fn constraint_count(&self) -> usize {
        self.constraints.count(&self.space.layout)
    }

    fn objective(&self, x: &[f64], gradient: Option<&mut [f64]>) -> f64 {
        self.objective
            .evaluate(&self.space.unpack(x), &self.space.layout, gradient)
    }

    fn constraints(&self, x: &[f64], values: &mut [f64], jacobian: Option<&mut [f64]>) {
        self.constraints.evaluate(&self.space, x, values, jacobian);
    }
}

/// Stability-constrained refinement of a joint position/velocity mixture.
#[derive(Debug, Clone)]
pub struct StableDynamicsOptimizer {
    config: SedsConfig,
    state: OptimizerState,
    mixture: Option<Gmm>,
    lyapunov: Option<DMatrix<f64>>,
}

impl StableDynamicsOptimizer {
    /// New optimizer in the `Uninitialized` state.
    pub fn new(config: SedsConfig) -> Self {
        Self {
            config,
            state: OptimizerState::Uninitialized,
            mixture: None,
            lyapunov: None,
        }
    }

    /// Configuration.
    pub fn config(&self) -> &SedsConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OptimizerState {
        self.state
    }

    /// Refined mixture of the last `optimize` call.
    pub fn mixture(&self) -> Option<&Gmm> {
        self.mixture.as_ref()
    }

    /// Lyapunov matrix of the last `optimize` call (identity before).
    pub fn lyapunov(&self, dim: usize) -> DMatrix<f64> {
        self.lyapunov
            .clone()
            .filter(|p| p.nrows() == dim)
            .unwrap_or_else(|| DMatrix::identity(dim, dim))
    }

    /// Refines `gmm` over joint samples `[x - endpoint, ẋ]`.
    ///
    /// `gmm` must have dimension `2d`. Returns the report; the refined mixture
    /// is available from [`mixture`](Self::mixture).
    pub fn optimize(&mut self, gmm: &Gmm, samples: &[Vec<f64>]) -> SedsResult<SedsReport> {
        self.config.validate()?;
        if samples.is_empty() {
            return Err(SedsError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        validate_samples(samples, gmm.dim(), "stability optimizer samples")?;

        let baseline = SedsParameters::from_mixture(gmm, self.config.objective, self.config.covariance_bias)?;
        let problem = SedsProblem {
            space: ParameterSpace::new(baseline, &self.config),
            objective: ObjectiveFunction::new(self.config.objective, samples),
            constraints: ConstraintProvider::from_config(&self.config),
        };
        let x0 = problem.space.initial_point();
        self.state = OptimizerState::Packed;

        let initial_objective = problem.objective(&x0, None);
        self.state = OptimizerState::Optimizing;
        let solver = if problem.dimension() == 0 {
            let mut values = vec![0.0; problem.constraint_count()];
            problem.constraints(&x0, &mut values, None);
            SolverReport {
                x: x0,
                objective: initial_objective,
                max_violation: values.iter().fold(0.0_f64, |m, v| m.max(*v)),
                iterations: 0,
                evaluations: 1,
                status: SolverStatus::Converged,
            }
        } else {
            ConstrainedSolver::new(SolverOptions::from(&self.config)).solve(&problem, &x0)
        };

        let params = problem.space.unpack(&solver.x);
        let mixture = params.to_mixture()?;
        let violations = self.violations(&problem, &solver.x);
        let final_objective = problem.objective(&solver.x, None);

        if solver.status != SolverStatus::Converged {
            warn!(
                "Stability optimizer stopped with {:?} after {} iterations (violation {:.3e})",
                solver.status, solver.iterations, solver.max_violation
            );
        }
        for v in &violations {
            match v.component {
                Some(k) => warn!(
                    "Component {} stability constraint {} violated by {:.3e}",
                    k, v.index, v.value
                ),
                None => warn!(
                    "Lyapunov positivity constraint {} violated by {:.3e}",
                    v.index, v.value
                ),
            }
        }
        info!(
            "Stability optimizer finished: objective {:.6} -> {:.6}, {} iterations, {} violations",
            initial_objective,
            final_objective,
            solver.iterations,
            violations.len()
        );

        self.state = if solver.status == SolverStatus::Converged && violations.is_empty() {
            OptimizerState::Converged
        } else {
            OptimizerState::Failed
        };
        self.mixture = Some(mixture);
        self.lyapunov = Some(params.lyapunov.clone());

        Ok(SedsReport {
            solver,
            initial_objective,
            final_objective,
            violations,
            lyapunov: params.lyapunov,
        })
    }

    fn violations(&self, problem: &SedsProblem<'_>, x: &[f64]) -> Vec<ConstraintViolation> {
        let mut values = vec![0.0; problem.constraint_count()];
        problem.constraints(x, &mut values, None);
        values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > self.config.constraint_tolerance || v.is_nan())
            .map(|(row, v)| {
                let (owner, index) = constraint_owner(&problem.space.layout, row);
                ConstraintViolation {
                    component: match owner {
                        ConstraintOwner::Component(k) => Some(k),
                        ConstraintOwner::Lyapunov => None,
                    },
                    index,
                    value: *v,
                }
            })
            .collect()
    }

    /// Largest eigenvalue of `P A_k + A_kᵀ P` for each component of `gmm`,
    /// with `A_k` taken from the position-to-velocity regression.
    ///
    /// Every entry is negative when the mixture field is stable.
    pub fn check_stability(&self, gmm: &Gmm) -> SedsResult<Vec<f64>> {
        let d = gmm.dim() / 2;
        if d == 0 || gmm.dim() % 2 != 0 {
            return Err(SedsError::DimensionMismatch {
                expected: 2 * d.max(1),
                actual: gmm.dim(),
                context: "stability check".to_string(),
            });
        }
        let gmr = Gmr::new(gmm, (0..d).collect(), (d..2 * d).collect())?;
        let maps: Vec<DMatrix<f64>> = (0..gmm.n_states())
            .map(|k| {
                let rows = gmr.coefficients(k);
                DMatrix::from_fn(d, d, |i, j| rows[i][j])
            })
            .collect();
        Ok(stability_margins(&self.lyapunov(d), &maps))
    }
}
