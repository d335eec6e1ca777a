//! Generic inequality-constrained nonlinear minimization.
//!
//! Problems implement [`ConstrainedProblem`]: an objective with optional
//! gradient and a vector of constraints `c_i(x) <= 0` with an optional
//! row-major Jacobian. [`ConstrainedSolver`] wraps four algorithms behind the
//! same outer loop, which tightens a penalty (and, for the Lagrangian
//! variants, updates multipliers) until the constraints hold within
//! tolerance or the iteration budget is spent.
//!
//! | Algorithm | Merit | Inner solver |
//! |---|---|---|
//! | `GradientLocal` | quadratic penalty | BFGS |
//! | `AugmentedLagrangian` | PHR augmented Lagrangian | BFGS |
//! | `DerivativeFree` | PHR augmented Lagrangian | Nelder–Mead |
//! | `DirectSearch` | PHR augmented Lagrangian | compass search |

use crate::config::{SedsConfig, SolverAlgorithm};
use crate::math_utils::{dot, norm};
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::cell::Cell;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Penalty weight of the first outer pass
const INITIAL_PENALTY: f64 = 10.0;

/// Penalty growth factor between outer passes
const PENALTY_GROWTH: f64 = 10.0;

/// Penalty ceiling
const MAX_PENALTY: f64 = 1e12;

/// Outer passes before the solver gives up
const MAX_OUTER_ITERATIONS: usize = 40;

/// Required violation reduction per outer pass before the penalty is raised
const VIOLATION_REDUCTION: f64 = 0.25;

/// Armijo sufficient-decrease constant
const ARMIJO: f64 = 1e-4;

/// Step halvings before a line search gives up
const MAX_BACKTRACKS: usize = 60;

/// BFGS updates are skipped unless `sᵀy > CURVATURE_GUARD·|s||y|`
const CURVATURE_GUARD: f64 = 1e-10;

/// Inner solves stop once the merit gradient is this small
const GRADIENT_TOLERANCE: f64 = 1e-12;

/// Initial simplex / pattern step relative to `max(1, |x_i|)`
const INITIAL_STEP: f64 = 0.05;

/// Inequality-constrained problem `min f(x) s.t. c(x) <= 0`.
pub trait ConstrainedProblem {
    /// Number of variables.
    fn dimension(&self) -> usize;

    /// Number of inequality constraints.
    fn constraint_count(&self) -> usize;

    /// Objective value; fills `gradient` when provided.
    fn objective(&self, x: &[f64], gradient: Option<&mut [f64]>) -> f64;

    /// Constraint values; fills the row-major `m × n` `jacobian` when provided.
    fn constraints(&self, x: &[f64], values: &mut [f64], jacobian: Option<&mut [f64]>);
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolverStatus {
    /// Inner solve converged with constraints satisfied within tolerance
    Converged,
    /// Iteration budget exhausted
    MaxIterations,
    /// No further progress possible at the maximal penalty
    Stalled,
}

/// Result of a solve; `x` is always the best point found.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverReport {
    /// Final parameters
    pub x: Vec<f64>,
    /// Objective at `x`
    pub objective: f64,
    /// `max(0, max_i c_i(x))`
    pub max_violation: f64,
    /// Inner iterations across all outer passes
    pub iterations: usize,
    /// Objective evaluations
    pub evaluations: usize,
    /// Termination status
    pub status: SolverStatus,
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Algorithm
    pub algorithm: SolverAlgorithm,
    /// Inner-iteration budget across all outer passes
    pub max_iterations: usize,
    /// Relative parameter-change stopping tolerance
    pub tolerance: f64,
    /// Accepted constraint violation
    pub constraint_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            algorithm: SolverAlgorithm::AugmentedLagrangian,
            max_iterations: 1000,
            tolerance: 1e-10,
            constraint_tolerance: 1e-8,
        }
    }
}

impl From<&SedsConfig> for SolverOptions {
    fn from(config: &SedsConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            constraint_tolerance: config.constraint_tolerance,
        }
    }
}

/// Merit function minimized by an inner solve.
#[derive(Debug, Clone, Copy)]
enum Merit<'m> {
    /// `f + ρ/2 Σ max(0, c_i)²`
    Penalty { rho: f64 },
    /// `f + 1/(2ρ) Σ (max(0, λ_i + ρ c_i)² - λ_i²)`
    Lagrangian { rho: f64, multipliers: &'m [f64] },
}

struct InnerResult {
    x: Vec<f64>,
    iterations: usize,
    converged: bool,
}

/// Counts evaluations and assembles merit values.
struct Evaluator<'a, P: ConstrainedProblem + ?Sized> {
    problem: &'a P,
    evaluations: Cell<usize>,
}

impl<'a, P: ConstrainedProblem + ?Sized> Evaluator<'a, P> {
    fn objective(&self, x: &[f64], gradient: Option<&mut [f64]>) -> f64 {
        self.evaluations.set(self.evaluations.get() + 1);
        self.problem.objective(x, gradient)
    }

    fn constraint_values(&self, x: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.problem.constraint_count()];
        if !values.is_empty() {
            self.problem.constraints(x, &mut values, None);
        }
        values
    }

    fn merit(&self, merit: Merit<'_>, x: &[f64], gradient: Option<&mut [f64]>) -> f64 {
        let n = x.len();
        let m = self.problem.constraint_count();
        match gradient {
            None => {
                let mut value = self.objective(x, None);
                if m > 0 {
                    let values = self.constraint_values(x);
                    value += merit_terms(merit, &values, |_, _| {});
                }
                finite_or_infinity(value)
            }
            Some(grad) => {
                let mut value = self.objective(x, Some(&mut *grad));
                if m > 0 {
                    let mut values = vec![0.0; m];
                    let mut jacobian = vec![0.0; m * n];
                    self.problem.constraints(x, &mut values, Some(&mut jacobian));
                    value += merit_terms(merit, &values, |i, weight| {
                        for (g, j) in grad.iter_mut().zip(&jacobian[i * n..(i + 1) * n]) {
                            *g += weight * j;
                        }
                    });
                }
                finite_or_infinity(value)
            }
        }
    }
}

/// Adds the constraint part of the merit; `accumulate(i, w)` receives the
/// weight of `∇c_i` in the merit gradient.
fn merit_terms(merit: Merit<'_>, values: &[f64], mut accumulate: impl FnMut(usize, f64)) -> f64 {
    let mut total = 0.0;
    for (i, &c) in values.iter().enumerate() {
        match merit {
            Merit::Penalty { rho } => {
                let t = c.max(0.0);
                total += 0.5 * rho * t * t;
                if t > 0.0 {
                    accumulate(i, rho * t);
                }
            }
            Merit::Lagrangian { rho, multipliers } => {
                let lambda = multipliers[i];
                let t = (lambda + rho * c).max(0.0);
                total += (t * t - lambda * lambda) / (2.0 * rho);
                if t > 0.0 {
                    accumulate(i, t);
                }
            }
        }
    }
    total
}

fn finite_or_infinity(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

fn max_violation(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

fn relative_change(from: &[f64], to: &[f64]) -> f64 {
    let step: f64 = from
        .iter()
        .zip(to)
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    step / norm(from).max(1.0)
}

/// Constrained solver dispatching to the configured algorithm.
#[derive(Debug, Clone, Default)]
pub struct ConstrainedSolver {
    options: SolverOptions,
}

impl ConstrainedSolver {
    /// Solver with the given options.
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Minimizes `problem` from `x0`.
    pub fn solve<P: ConstrainedProblem + ?Sized>(&self, problem: &P, x0: &[f64]) -> SolverReport {
        let eval = Evaluator {
            problem,
            evaluations: Cell::new(0),
        };
        let algorithm = self.options.algorithm;
        // only GradientLocal runs on the pure penalty
        let uses_multipliers = algorithm != SolverAlgorithm::GradientLocal;

        let mut x = x0.to_vec();
        let mut multipliers = vec![0.0; problem.constraint_count()];
        let mut rho = INITIAL_PENALTY;
        let mut iterations = 0;
        let mut previous_violation = f64::INFINITY;
        let mut status = SolverStatus::Stalled;

        for outer in 0..MAX_OUTER_ITERATIONS {
            let merit = if uses_multipliers {
                Merit::Lagrangian {
                    rho,
                    multipliers: &multipliers,
                }
            } else {
                Merit::Penalty { rho }
            };
            let budget = self.options.max_iterations.saturating_sub(iterations);
            let inner = match algorithm {
                SolverAlgorithm::GradientLocal | SolverAlgorithm::AugmentedLagrangian => {
                    self.bfgs(&eval, merit, &x, budget)
                }
                SolverAlgorithm::DerivativeFree => self.nelder_mead(&eval, merit, &x, budget),
                SolverAlgorithm::DirectSearch => self.compass_search(&eval, merit, &x, budget),
            };
            iterations += inner.iterations;
            let step = relative_change(&x, &inner.x);
            x = inner.x;

            let values = eval.constraint_values(&x);
            let violation = max_violation(&values);
            debug!(
                "solver pass {}: penalty {:.1e}, violation {:.3e}, inner iterations {}",
                outer, rho, violation, inner.iterations
            );

            if violation <= self.options.constraint_tolerance && inner.converged {
                status = SolverStatus::Converged;
                break;
            }
            if iterations >= self.options.max_iterations {
                status = SolverStatus::MaxIterations;
                break;
            }
            if violation <= self.options.constraint_tolerance {
                continue;
            }

            if uses_multipliers {
                for (lambda, c) in multipliers.iter_mut().zip(&values) {
                    *lambda = (*lambda + rho * c).max(0.0);
                }
            }
            let at_max_penalty = rho >= MAX_PENALTY;
            if !uses_multipliers || violation > VIOLATION_REDUCTION * previous_violation {
                rho = (rho * PENALTY_GROWTH).min(MAX_PENALTY);
            }
            if at_max_penalty && step < self.options.tolerance && violation >= previous_violation {
                status = SolverStatus::Stalled;
                break;
            }
            previous_violation = violation;
        }

        let objective = eval.objective(&x, None);
        let max_violation = max_violation(&eval.constraint_values(&x));
        SolverReport {
            x,
            objective,
            max_violation,
            iterations,
            evaluations: eval.evaluations.get(),
            status,
        }
    }

    /// BFGS with Armijo backtracking on the merit function.
    fn bfgs<P: ConstrainedProblem + ?Sized>(
        &self,
        eval: &Evaluator<'_, P>,
        merit: Merit<'_>,
        x0: &[f64],
        max_iterations: usize,
    ) -> InnerResult {
        let n = x0.len();
        let mut x = x0.to_vec();
        let mut g = vec![0.0; n];
        let mut f = eval.merit(merit, &x, Some(&mut g));
        if !f.is_finite() {
            return InnerResult {
                x,
                iterations: 0,
                converged: false,
            };
        }
        let mut h = DMatrix::<f64>::identity(n, n);
        let mut scaled = false;

        for iteration in 0..max_iterations {
            if g.iter().all(|v| v.abs() < GRADIENT_TOLERANCE) {
                return InnerResult {
                    x,
                    iterations: iteration,
                    converged: true,
                };
            }

            let gv = DVector::from_column_slice(&g);
            let mut p: Vec<f64> = (-(&h * &gv)).iter().copied().collect();
            let mut slope = dot(&g, &p);
            if !(slope < 0.0) || !slope.is_finite() {
                h = DMatrix::identity(n, n);
                p = g.iter().map(|v| -v).collect();
                slope = -dot(&g, &g);
            }

            let mut t = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let trial: Vec<f64> = x.iter().zip(&p).map(|(xi, pi)| xi + t * pi).collect();
                let mut trial_gradient = vec![0.0; n];
                let value = eval.merit(merit, &trial, Some(&mut trial_gradient));
                if value <= f + ARMIJO * t * slope {
                    accepted = Some((trial, value, trial_gradient));
                    break;
                }
                t *= 0.5;
            }
            let Some((x_new, f_new, g_new)) = accepted else {
                // no descent possible at floating-point resolution
                return InnerResult {
                    x,
                    iterations: iteration + 1,
                    converged: true,
                };
            };

            let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
            let change = relative_change(&x, &x_new);
            x = x_new;
            f = f_new;
            g = g_new;
            if change < self.options.tolerance {
                return InnerResult {
                    x,
                    iterations: iteration + 1,
                    converged: true,
                };
            }

            let sy = dot(&s, &y);
            if sy > CURVATURE_GUARD * norm(&s) * norm(&y) {
                if !scaled {
                    h = DMatrix::identity(n, n) * (sy / dot(&y, &y));
                    scaled = true;
                }
                let sv = DVector::from_column_slice(&s);
                let yv = DVector::from_column_slice(&y);
                let hy = &h * &yv;
                let r = 1.0 / sy;
                let yhy = yv.dot(&hy);
                let outer_ss = &sv * sv.transpose();
                let cross = &hy * sv.transpose() + &sv * hy.transpose();
                h = h - cross * r + outer_ss * (r * r * yhy + r);
            }
        }

        InnerResult {
            x,
            iterations: max_iterations,
            converged: false,
        }
    }

    /// Nelder–Mead simplex on merit values.
    fn nelder_mead<P: ConstrainedProblem + ?Sized>(
        &self,
        eval: &Evaluator<'_, P>,
        merit: Merit<'_>,
        x0: &[f64],
        max_iterations: usize,
    ) -> InnerResult {
        let n = x0.len();
        if n == 0 {
            return InnerResult {
                x: Vec::new(),
                iterations: 0,
                converged: true,
            };
        }
        let value = |x: &[f64]| eval.merit(merit, x, None);

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((x0.to_vec(), value(x0)));
        for j in 0..n {
            let mut vertex = x0.to_vec();
            vertex[j] += INITIAL_STEP * x0[j].abs().max(1.0);
            let f = value(&vertex);
            simplex.push((vertex, f));
        }

        let by_value = |a: &(Vec<f64>, f64), b: &(Vec<f64>, f64)| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        };

        for iteration in 0..max_iterations {
            simplex.sort_by(by_value);
            let best = simplex[0].0.clone();
            let diameter = simplex
                .iter()
                .skip(1)
                .map(|(v, _)| relative_change(&best, v))
                .fold(0.0, f64::max);
            if diameter < self.options.tolerance {
                return InnerResult {
                    x: best,
                    iterations: iteration,
                    converged: true,
                };
            }

            let mut centroid = vec![0.0; n];
            for (v, _) in simplex.iter().take(n) {
                for (c, vi) in centroid.iter_mut().zip(v) {
                    *c += vi / n as f64;
                }
            }
            let along = |coefficient: f64, point: &[f64]| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(point)
                    .map(|(c, p)| c + coefficient * (p - c))
                    .collect()
            };

            let (worst, f_worst) = simplex[n].clone();
            let f_best = simplex[0].1;
            let f_second = simplex[n - 1].1;

            let reflected = along(-1.0, &worst);
            let f_reflected = value(&reflected);
            if f_reflected < f_best {
                let expanded = along(-2.0, &worst);
                let f_expanded = value(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }
            if f_reflected < f_second {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < f_worst {
                let c = along(-0.5, &worst);
                let f = value(&c);
                (c, f)
            } else {
                let c = along(0.5, &worst);
                let f = value(&c);
                (c, f)
            };
            if f_contracted < f_reflected.min(f_worst) {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            // shrink toward the best vertex
            let anchor = simplex[0].0.clone();
            for (v, f) in simplex.iter_mut().skip(1) {
                for (vi, a) in v.iter_mut().zip(&anchor) {
                    *vi = a + 0.5 * (*vi - a);
                }
                *f = value(v);
            }
        }

        simplex.sort_by(by_value);
        InnerResult {
            x: simplex.swap_remove(0).0,
            iterations: max_iterations,
            converged: false,
        }
    }

    /// Compass search: poll `±Δ e_j`, halve `Δ` when no poll improves.
    fn compass_search<P: ConstrainedProblem + ?Sized>(
        &self,
        eval: &Evaluator<'_, P>,
        merit: Merit<'_>,
        x0: &[f64],
        max_iterations: usize,
    ) -> InnerResult {
        let mut x = x0.to_vec();
        let mut f = eval.merit(merit, &x, None);
        let magnitude = |x: &[f64]| x.iter().fold(1.0f64, |m, v| m.max(v.abs()));
        let mut delta = INITIAL_STEP * magnitude(&x);

        for iteration in 0..max_iterations {
            if delta / magnitude(&x) < self.options.tolerance {
                return InnerResult {
                    x,
                    iterations: iteration,
                    converged: true,
                };
            }
            let mut improved = false;
            'poll: for j in 0..x.len() {
                for sign in [1.0, -1.0] {
                    let mut trial = x.clone();
                    trial[j] += sign * delta;
                    let value = eval.merit(merit, &trial, None);
                    if value < f {
                        x = trial;
                        f = value;
                        improved = true;
                        break 'poll;
                    }
                }
            }
            if !improved {
                delta *= 0.5;
            }
        }

        InnerResult {
            x,
            iterations: max_iterations,
            converged: false,
        }
    }
}

/// Central-difference gradient with step `step·max(1, |x_j|)`.
pub fn finite_difference_gradient(f: impl Fn(&[f64]) -> f64, x: &[f64], step: f64) -> Vec<f64> {
    let mut probe = x.to_vec();
    (0..x.len())
        .map(|j| {
            let h = step * x[j].abs().max(1.0);
            probe[j] = x[j] + h;
            let plus = f(&probe);
            probe[j] = x[j] - h;
            let minus = f(&probe);
            probe[j] = x[j];
            (plus - minus) / (2.0 * h)
        })
        .collect()
}

/// Central-difference Jacobian (row-major `m × n`) of `f(x, out)` filling `m` values.
pub fn finite_difference_jacobian(
    f: impl Fn(&[f64], &mut [f64]),
    m: usize,
    x: &[f64],
    step: f64,
) -> Vec<f64> {
    let n = x.len();
    let mut jacobian = vec![0.0; m * n];
    let mut probe = x.to_vec();
    let mut plus = vec![0.0; m];
    let mut minus = vec![0.0; m];
    for j in 0..n {
        let h = step * x[j].abs().max(1.0);
        probe[j] = x[j] + h;
        f(&probe, &mut plus);
        probe[j] = x[j] - h;
        f(&probe, &mut minus);
        probe[j] = x[j];
        for i in 0..m {
            jacobian[i * n + j] = (plus[i] - minus[i]) / (2.0 * h);
        }
    }
    jacobian
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// `(x-2)² + (y-1)²` subject to `x + y <= 1`; optimum (1, 0).
    struct HalfPlane;

    impl ConstrainedProblem for HalfPlane {
        fn dimension(&self) -> usize {
            2
        }
        fn constraint_count(&self) -> usize {
            1
        }
        fn objective(&self, x: &[f64], gradient: Option<&mut [f64]>) -> f64 {
            if let Some(g) = gradient {
                g[0] = 2.0 * (x[0] - 2.0);
                g[1] = 2.0 * (x[1] - 1.0);
            }
            (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2)
        }
        fn constraints(&self, x: &[f64], values: &mut [f64], jacobian: Option<&mut [f64]>) {
            values[0] = x[0] + x[1] - 1.0;
            if let Some(j) = jacobian {
                j[0] = 1.0;
                j[1] = 1.0;
            }
        }
    }

    /// Ill-scaled unconstrained quadratic with minimum at (1, -2).
    struct Valley;

    impl ConstrainedProblem for Valley {
        fn dimension(&self) -> usize {
            2
        }
        fn constraint_count(&self) -> usize {
            0
        }
        fn objective(&self, x: &[f64], gradient: Option<&mut [f64]>) -> f64 {
            if let Some(g) = gradient {
                g[0] = 2.0 * (x[0] - 1.0);
                g[1] = 20.0 * (x[1] + 2.0);
            }
            (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2)
        }
        fn constraints(&self, _x: &[f64], _values: &mut [f64], _jacobian: Option<&mut [f64]>) {}
    }

    fn options(algorithm: SolverAlgorithm, constraint_tolerance: f64) -> SolverOptions {
        SolverOptions {
            algorithm,
            max_iterations: 5000,
            tolerance: 1e-10,
            constraint_tolerance,
        }
    }

    #[test]
    fn test_unconstrained_all_algorithms() {
        for (algorithm, accuracy) in [
            (SolverAlgorithm::GradientLocal, 1e-6),
            (SolverAlgorithm::AugmentedLagrangian, 1e-6),
            (SolverAlgorithm::DerivativeFree, 1e-4),
            (SolverAlgorithm::DirectSearch, 1e-4),
        ] {
            let solver = ConstrainedSolver::new(options(algorithm, 1e-8));
            let report = solver.solve(&Valley, &[-3.0, 4.0]);
            assert_eq!(report.status, SolverStatus::Converged, "{:?}", algorithm);
            assert!((report.x[0] - 1.0).abs() < accuracy, "{:?}: {:?}", algorithm, report.x);
            assert!((report.x[1] + 2.0).abs() < accuracy, "{:?}: {:?}", algorithm, report.x);
            assert_eq!(report.max_violation, 0.0);
        }
    }

    #[test]
    fn test_augmented_lagrangian_active_constraint() {
        let solver = ConstrainedSolver::new(options(SolverAlgorithm::AugmentedLagrangian, 1e-9));
        let report = solver.solve(&HalfPlane, &[0.0, 0.0]);
        assert_eq!(report.status, SolverStatus::Converged);
        assert_approx_eq!(report.x[0], 1.0, 1e-6);
        assert_approx_eq!(report.x[1], 0.0, 1e-6);
        assert!(report.max_violation <= 1e-9);
        assert_approx_eq!(report.objective, 2.0, 1e-5);
        assert!(report.evaluations > 0);
    }

    #[test]
    fn test_penalty_reaches_feasibility() {
        let solver = ConstrainedSolver::new(options(SolverAlgorithm::GradientLocal, 1e-6));
        let report = solver.solve(&HalfPlane, &[3.0, 3.0]);
        assert!(report.max_violation <= 1e-6);
        assert_approx_eq!(report.x[0], 1.0, 1e-3);
        assert_approx_eq!(report.x[1], 0.0, 1e-3);
    }

    #[test]
    fn test_derivative_free_variants_constrained() {
        for algorithm in [SolverAlgorithm::DerivativeFree, SolverAlgorithm::DirectSearch] {
            let solver = ConstrainedSolver::new(options(algorithm, 1e-4));
            let report = solver.solve(&HalfPlane, &[0.0, 0.0]);
            assert!(report.max_violation <= 1e-4, "{:?}", algorithm);
            assert!((report.x[0] - 1.0).abs() < 1e-2, "{:?}: {:?}", algorithm, report.x);
            assert!(report.x[1].abs() < 1e-2, "{:?}: {:?}", algorithm, report.x);
        }
    }

    #[test]
    fn test_direct_search_closes_oblique_active_constraint() {
        // the boundary x + y = 1 is diagonal to every poll direction
        let solver = ConstrainedSolver::new(options(SolverAlgorithm::DirectSearch, 1e-6));
        let report = solver.solve(&HalfPlane, &[0.0, 0.0]);
        assert!(report.max_violation <= 1e-6, "{:?}", report);
        assert_approx_eq!(report.objective, 2.0, 1e-2);
    }

    #[test]
    fn test_iteration_cap_reported() {
        let solver = ConstrainedSolver::new(SolverOptions {
            max_iterations: 1,
            ..options(SolverAlgorithm::AugmentedLagrangian, 1e-12)
        });
        let report = solver.solve(&HalfPlane, &[5.0, 5.0]);
        assert_eq!(report.status, SolverStatus::MaxIterations);
        assert_eq!(report.iterations, 1);
    }

    #[test]
    fn test_finite_difference_helpers() {
        let f = |x: &[f64]| x[0].powi(3) + x[0] * x[1];
        let g = finite_difference_gradient(f, &[2.0, -1.0], 1e-6);
        assert_approx_eq!(g[0], 12.0 - 1.0, 1e-6);
        assert_approx_eq!(g[1], 2.0, 1e-6);

        let jac = finite_difference_jacobian(
            |x, out| {
                out[0] = x[0] * x[1];
                out[1] = x[1].sin();
            },
            2,
            &[1.5, 0.3],
            1e-6,
        );
        assert_approx_eq!(jac[0], 0.3, 1e-8);
        assert_approx_eq!(jac[1], 1.5, 1e-8);
        assert_approx_eq!(jac[2], 0.0, 1e-8);
        assert_approx_eq!(jac[3], 0.3f64.cos(), 1e-8);
    }
}
