//! # Stable Dynamical Systems from Demonstrations
//!
//! Learns globally asymptotically stable velocity fields `ẋ = f(x)` from
//! demonstrated trajectories. A Gaussian mixture is fitted to joint
//! (position, velocity) samples by EM, refined under Lyapunov stability
//! constraints, and queried through Gaussian mixture regression.
//!
//! ## Key Features
//!
//! - **Gaussian mixtures**: packed symmetric storage, cached Cholesky state with
//!   diagonal-bias recovery, EM with k-means++ seeding, weighted and online updates
//! - **Mixture regression**: conditional mean and covariance over any input/output split
//! - **Stability optimizer**: likelihood or mean-square-error objectives with analytic
//!   gradients, principal-minor or eigenvalue constraints, optional joint Lyapunov matrix
//! - **Constrained solver**: penalty, augmented Lagrangian, Nelder–Mead and compass search
//!   behind one interface
//! - **Persistence**: self-describing whitespace text format
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stable_ds::{DynamicalSystem, DynamicsConfig, Trajectory};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dt = 0.05;
//!     let demo: Vec<Vec<f64>> = (0..=40)
//!         .map(|i| {
//!             let s = 1.0 - i as f64 / 40.0;
//!             vec![2.0 * s, 1.0 * s]
//!         })
//!         .collect();
//!     let trajectories = vec![Trajectory::from_positions(demo, dt)?];
//!
//!     let mut system = DynamicalSystem::new(DynamicsConfig::with_components(2));
//!     system.train(&trajectories, None)?;
//!
//!     let path = system.integrate(&[2.0, 1.0], 400)?;
//!     println!("reached {:?}", path.last());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! [`DynamicalSystem`] orchestrates [`Gmm`] training, the
//! [`StableDynamicsOptimizer`] and a cached [`Gmr`]. Each layer is usable on
//! its own.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod math_utils;
pub mod random;
pub mod symmetric_matrix;

// Mixture models
pub mod gaussian;
pub mod mixture_model;
pub mod mixture_regression;

// Stability optimization
pub mod constrained_solver;
pub mod seds;
pub mod seds_constraints;
pub mod seds_objective;
pub mod seds_parameters;

// Demonstrations and the trained system
pub mod demonstrations;
pub mod dynamical_system;
pub mod persistence;

// Re-exports for convenience - main public API
pub use config::{
    CovarianceKind, DynamicsConfig, EmConfig, InitPolicy, LyapunovMode, SedsConfig,
    SedsObjective, SolverAlgorithm, StabilityCriterion,
};
pub use errors::{SedsError, SedsResult};
pub use random::ModelRng;
pub use symmetric_matrix::{SymmetricMatrix, WeightedMoments};

pub use gaussian::Gaussian;
pub use mixture_model::{EmReport, EmStatus, Gmm};
pub use mixture_regression::{Gmr, RegressionOutput};

pub use constrained_solver::{
    finite_difference_gradient, finite_difference_jacobian, ConstrainedProblem,
    ConstrainedSolver, SolverOptions, SolverReport, SolverStatus,
};
pub use seds::{ConstraintViolation, OptimizerState, SedsReport, StableDynamicsOptimizer};
pub use seds_constraints::{
    AnalyticPrincipalMinor, ConstraintProvider, FiniteDifferenceEigenvalue, StabilityConstraints,
};
pub use seds_objective::ObjectiveFunction;
pub use seds_parameters::{ParameterLayout, ParameterSpace, SedsParameters};

pub use demonstrations::{DemonstrationSet, Trajectory};
pub use dynamical_system::{train_shared, DynamicalSystem, SharedDynamicalSystem, TrainingOutcome};
pub use persistence::StoredModel;

// Mathematical utilities exports
pub use math_utils::{
    float_ops::{approx_eq, approx_eq_eps, floored_div, safe_div},
    log_sum_exp,
};
