//! # Engine Configuration
//!
//! Configuration structures for mixture fitting (EM), stability-constrained
//! refinement (SEDS) and the dynamical-system wrapper that chains them. Every
//! structure has a `Default`, a few named presets and a `validate` method.

use crate::errors::{validate_count, validate_parameter, SedsResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Covariance structure estimated in the EM M-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CovarianceKind {
    /// Full symmetric covariance
    Full,
    /// Diagonal covariance (independent dimensions)
    Diagonal,
    /// Isotropic covariance `σ²I`
    Spherical,
}

/// Mixture initialization policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InitPolicy {
    /// Means drawn from random data points
    Random,
    /// Means spread evenly along the first dimension
    UniformSplit,
    /// Hard-assignment k-means, seeded by k-means++.
    ///
    /// The first seed is a uniformly random data point; each further seed is
    /// a data point drawn with probability proportional to its squared
    /// distance from the nearest seed so far. Covariances come from the final
    /// clusters in the configured [`CovarianceKind`].
    KMeans,
}

/// EM training configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmConfig {
    /// Iteration cap
    pub max_iterations: usize,
    /// Stop when the mean log-likelihood changes by less than this
    pub tolerance: f64,
    /// Covariance structure
    pub covariance_kind: CovarianceKind,
    /// Initialization policy used by `Gmm::train`
    pub init: InitPolicy,
    /// Added to every covariance diagonal in the M-step
    pub min_variance: f64,
    /// RNG seed; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-5,
            covariance_kind: CovarianceKind::Full,
            init: InitPolicy::KMeans,
            min_variance: 1e-8,
            seed: None,
        }
    }
}

impl EmConfig {
    /// Default configuration with a fixed seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Check ranges.
    pub fn validate(&self) -> SedsResult<()> {
        validate_count(self.max_iterations, 1, "max_iterations")?;
        validate_parameter(self.tolerance, 0.0, f64::MAX, "tolerance")?;
        validate_parameter(self.min_variance, 0.0, f64::MAX, "min_variance")?;
        Ok(())
    }
}

/// Objective minimized by the stability optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SedsObjective {
    /// Negative mean log-likelihood of joint (position, velocity) samples
    Likelihood,
    /// Mean squared error of the regressed velocity
    MeanSquareError,
}

/// Negative-definiteness test applied to `P·A_k + A_kᵀ·P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum StabilityCriterion {
    /// Alternating-sign leading principal minors, analytic gradients
    PrincipalMinors,
    /// Sorted eigenvalues, finite-difference gradients
    Eigenvalues,
}

/// How the Lyapunov matrix is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LyapunovMode {
    /// `P = I`
    Identity,
    /// `P` is a free symmetric matrix optimized jointly, constrained to `P ≻ 0`
    Optimized,
}

/// Constrained nonlinear solver algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SolverAlgorithm {
    /// Exterior quadratic penalty with a BFGS inner solve
    GradientLocal,
    /// Augmented Lagrangian (PHR multipliers) with a BFGS inner solve
    AugmentedLagrangian,
    /// Nelder–Mead on the augmented Lagrangian, no gradients
    DerivativeFree,
    /// Compass pattern search on the augmented Lagrangian, no gradients
    DirectSearch,
}

/// Stability optimizer configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SedsConfig {
    /// Objective form
    pub objective: SedsObjective,
    /// Constraint test
    pub criterion: StabilityCriterion,
    /// Lyapunov matrix handling
    pub lyapunov: LyapunovMode,
    /// Solver algorithm
    pub algorithm: SolverAlgorithm,
    /// Optimize the component priors
    pub optimize_priors: bool,
    /// Optimize the position means
    pub optimize_means: bool,
    /// Optimize covariances (or linear maps for the MSE objective)
    pub optimize_covariances: bool,
    /// Iteration cap across all outer solver passes
    pub max_iterations: usize,
    /// Relative parameter-change stopping tolerance
    pub tolerance: f64,
    /// Constraint values must stay below `-margin`
    pub constraint_margin: f64,
    /// Accepted residual constraint violation
    pub constraint_tolerance: f64,
    /// Diagonal bias added to reconstructed covariances
    pub covariance_bias: f64,
    /// Relative step for finite-difference eigenvalue gradients
    pub finite_difference_step: f64,
}

impl Default for SedsConfig {
    fn default() -> Self {
        Self::likelihood()
    }
}

impl SedsConfig {
    /// Likelihood objective, principal-minor constraints, `P = I`.
    pub fn likelihood() -> Self {
        Self {
            objective: SedsObjective::Likelihood,
            criterion: StabilityCriterion::PrincipalMinors,
            lyapunov: LyapunovMode::Identity,
            algorithm: SolverAlgorithm::AugmentedLagrangian,
            optimize_priors: true,
            optimize_means: true,
            optimize_covariances: true,
            max_iterations: 1000,
            tolerance: 1e-10,
            constraint_margin: 1e-4,
            constraint_tolerance: 1e-8,
            covariance_bias: 1e-10,
            finite_difference_step: 1e-6,
        }
    }

    /// Mean-square-error objective on the regressed velocity.
    pub fn mean_square_error() -> Self {
        Self {
            objective: SedsObjective::MeanSquareError,
            ..Self::likelihood()
        }
    }

    /// Likelihood objective with a jointly optimized Lyapunov matrix.
    pub fn with_lyapunov() -> Self {
        Self {
            lyapunov: LyapunovMode::Optimized,
            ..Self::likelihood()
        }
    }

    /// Check ranges.
    pub fn validate(&self) -> SedsResult<()> {
        validate_count(self.max_iterations, 1, "max_iterations")?;
        validate_parameter(self.tolerance, 0.0, 1.0, "tolerance")?;
        validate_parameter(self.constraint_margin, 0.0, f64::MAX, "constraint_margin")?;
        validate_parameter(
            self.constraint_tolerance,
            0.0,
            f64::MAX,
            "constraint_tolerance",
        )?;
        validate_parameter(self.covariance_bias, 0.0, f64::MAX, "covariance_bias")?;
        validate_parameter(
            self.finite_difference_step,
            f64::MIN_POSITIVE,
            1.0,
            "finite_difference_step",
        )?;
        Ok(())
    }
}

/// Configuration of the trainable dynamical system.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DynamicsConfig {
    /// Number of mixture components
    pub n_components: usize,
    /// Integration time step
    pub dt: f64,
    /// Integration stops once the speed falls below this
    pub speed_floor: f64,
    /// Drop zero-velocity samples away from the attractor before training
    pub prune_static_points: bool,
    /// EM settings for the initial fit
    pub em: EmConfig,
    /// Stability optimizer settings
    pub seds: SedsConfig,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            dt: 0.02,
            speed_floor: 1e-6,
            prune_static_points: false,
            em: EmConfig::default(),
            seds: SedsConfig::default(),
        }
    }
}

impl DynamicsConfig {
    /// Default configuration with `n_components` components.
    pub fn with_components(n_components: usize) -> Self {
        Self {
            n_components,
            ..Self::default()
        }
    }

    /// Check ranges, including nested configurations.
    pub fn validate(&self) -> SedsResult<()> {
        validate_count(self.n_components, 1, "n_components")?;
        validate_parameter(self.dt, f64::MIN_POSITIVE, f64::MAX, "dt")?;
        validate_parameter(self.speed_floor, 0.0, f64::MAX, "speed_floor")?;
        self.em.validate()?;
        self.seds.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SedsError;

    #[test]
    fn test_defaults() {
        let em = EmConfig::default();
        assert_eq!(em.max_iterations, 100);
        assert_eq!(em.covariance_kind, CovarianceKind::Full);
        assert_eq!(em.init, InitPolicy::KMeans);

        let seds = SedsConfig::default();
        assert_eq!(seds.objective, SedsObjective::Likelihood);
        assert_eq!(seds.criterion, StabilityCriterion::PrincipalMinors);
        assert_eq!(seds.lyapunov, LyapunovMode::Identity);
        assert_eq!(seds.algorithm, SolverAlgorithm::AugmentedLagrangian);
        assert!(seds.optimize_priors && seds.optimize_means && seds.optimize_covariances);

        let dynamics = DynamicsConfig::default();
        assert_eq!(dynamics.n_components, 3);
        assert!(dynamics.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(
            SedsConfig::mean_square_error().objective,
            SedsObjective::MeanSquareError
        );
        assert_eq!(SedsConfig::with_lyapunov().lyapunov, LyapunovMode::Optimized);
        assert_eq!(EmConfig::seeded(9).seed, Some(9));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = DynamicsConfig::with_components(0);
        assert!(matches!(
            config.validate(),
            Err(SedsError::InvalidParameter { .. })
        ));

        config.n_components = 2;
        config.dt = -0.1;
        assert!(config.validate().is_err());

        config.dt = 0.01;
        config.seds.constraint_margin = -1.0;
        assert!(config.validate().is_err());

        config.seds.constraint_margin = 1e-4;
        config.em.max_iterations = 0;
        assert!(config.validate().is_err());
    }
}
