//! Trainable, provably stable velocity field learned from demonstrations.
//!
//! Training fits a joint (position, velocity) mixture by EM, refines it with
//! the [`StableDynamicsOptimizer`], and caches a position-to-velocity
//! regression. Queries evaluate that regression at `x - endpoint`.

use crate::config::DynamicsConfig;
use crate::demonstrations::{DemonstrationSet, Trajectory};
use crate::errors::{validate_all_finite, validate_dimension, SedsError, SedsResult};
use crate::math_utils::norm;
use crate::mixture_model::{EmReport, Gmm};
use crate::mixture_regression::{Gmr, RegressionOutput};
use crate::persistence;
use crate::random::ModelRng;
use crate::seds::{SedsReport, StableDynamicsOptimizer};
use log::{info, warn};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

/// Zero-velocity samples closer to the endpoint than this fraction of the
/// largest endpoint distance survive pruning.
const STATIC_RADIUS_FRACTION: f64 = 0.05;

/// Result of [`DynamicalSystem::train`].
#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    /// Model trained and committed
    Trained {
        /// Initial EM fit
        em: EmReport,
        /// Stability refinement
        seds: SedsReport,
    },
    /// No usable samples; the previous model is untouched
    NothingToDo {
        /// Why training was skipped
        reason: String,
    },
}

/// Trained model state, committed atomically.
#[derive(Debug, Clone)]
struct TrainedModel {
    gmm: Gmm,
    regression: Gmr,
    endpoint: Vec<f64>,
}

impl TrainedModel {
    fn new(gmm: Gmm, endpoint: Vec<f64>) -> SedsResult<Self> {
        let d = endpoint.len();
        let regression = Gmr::new(&gmm, (0..d).collect(), (d..2 * d).collect())?;
        Ok(Self {
            gmm,
            regression,
            endpoint,
        })
    }
}

/// Velocity field `ẋ = f(x - endpoint)` backed by a stabilized mixture.
#[derive(Debug, Clone)]
pub struct DynamicalSystem {
    config: DynamicsConfig,
    model: Option<TrainedModel>,
}

/// Handle sharing one system between a trainer and concurrent readers.
pub type SharedDynamicalSystem = Arc<RwLock<DynamicalSystem>>;

impl DynamicalSystem {
    /// Untrained system.
    pub fn new(config: DynamicsConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Wraps the system for shared access.
    pub fn into_shared(self) -> SharedDynamicalSystem {
        Arc::new(RwLock::new(self))
    }

    /// Configuration.
    pub fn config(&self) -> &DynamicsConfig {
        &self.config
    }

    /// Whether a model is available for queries.
    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Position dimension; zero when untrained.
    pub fn dim(&self) -> usize {
        self.model.as_ref().map_or(0, |m| m.endpoint.len())
    }

    /// Trained joint mixture.
    pub fn mixture(&self) -> Option<&Gmm> {
        self.model.as_ref().map(|m| &m.gmm)
    }

    /// Attractor; empty when untrained.
    pub fn endpoint(&self) -> &[f64] {
        self.model
            .as_ref()
            .map(|m| m.endpoint.as_slice())
            .unwrap_or(&[])
    }

    /// Fits EM, stabilizes, and commits the model.
    ///
    /// `warm_start` seeds EM when it matches the component count and joint
    /// dimension; otherwise EM initializes from the data. On error or
    /// `NothingToDo` the previous model is kept.
    pub fn train(
        &mut self,
        trajectories: &[Trajectory],
        warm_start: Option<&Gmm>,
    ) -> SedsResult<TrainingOutcome> {
        self.config.validate()?;
        if trajectories.iter().all(Trajectory::is_empty) {
            return Ok(TrainingOutcome::NothingToDo {
                reason: "no demonstration samples".to_string(),
            });
        }
        let set = DemonstrationSet::new(trajectories.to_vec())?;
        let d = set.dim();
        if d == 0 {
            return Ok(TrainingOutcome::NothingToDo {
                reason: "zero-dimensional demonstrations".to_string(),
            });
        }
        let samples = if self.config.prune_static_points {
            let reach = set
                .samples()
                .iter()
                .map(|row| norm(&row[..d]))
                .fold(0.0_f64, f64::max);
            set.samples_pruned(self.config.speed_floor, STATIC_RADIUS_FRACTION * reach)
        } else {
            set.samples()
        };
        if samples.is_empty() {
            return Ok(TrainingOutcome::NothingToDo {
                reason: "all samples pruned".to_string(),
            });
        }

        let mut rng = ModelRng::from_optional_seed(self.config.em.seed);
        let (mut gmm, em) = match warm_start {
            Some(previous)
                if previous.n_states() == self.config.n_components && previous.dim() == 2 * d =>
            {
                let mut gmm = previous.clone();
                let report = gmm.refine(&samples, &self.config.em, &mut rng)?;
                (gmm, report)
            }
            other => {
                if other.is_some() {
                    warn!("Warm-start mixture does not match the model shape; initializing from data");
                }
                let mut gmm = Gmm::new(self.config.n_components, 2 * d);
                let report = gmm.train(&samples, &self.config.em, &mut rng)?;
                (gmm, report)
            }
        };
        gmm.normalize_priors();

        let mut optimizer = StableDynamicsOptimizer::new(self.config.seds.clone());
        let seds = optimizer.optimize(&gmm, &samples)?;
        let refined = optimizer.mixture().cloned().ok_or(SedsError::ModelNotTrained)?;

        self.model = Some(TrainedModel::new(refined, set.endpoint().to_vec())?);
        info!(
            "Trained dynamical system: {} components, {} samples, stable = {}",
            self.config.n_components,
            samples.len(),
            seds.is_stable()
        );
        Ok(TrainingOutcome::Trained { em, seds })
    }

    fn trained(&self) -> SedsResult<&TrainedModel> {
        let model = self.model.as_ref().ok_or(SedsError::ModelNotTrained)?;
        if model.regression.is_stale_for(&model.gmm) {
            return Err(SedsError::NumericalError {
                reason: "regression cache out of date with its mixture".to_string(),
                operation: Some("velocity query".to_string()),
            });
        }
        Ok(model)
    }

    fn offset(model: &TrainedModel, x: &[f64]) -> SedsResult<Vec<f64>> {
        validate_dimension(model.endpoint.len(), x.len(), "velocity query")?;
        validate_all_finite(x, "velocity query")?;
        Ok(x.iter().zip(&model.endpoint).map(|(a, b)| a - b).collect())
    }

    /// Velocity at `x`.
    pub fn velocity_at(&self, x: &[f64]) -> SedsResult<Vec<f64>> {
        Ok(self.velocity_with_covariance(x)?.mean)
    }

    /// Velocity at `x` with its regression covariance.
    pub fn velocity_with_covariance(&self, x: &[f64]) -> SedsResult<RegressionOutput> {
        let model = self.trained()?;
        let offset = Self::offset(model, x)?;
        model.regression.regress(&offset)
    }

    /// Euler integration from `start` for at most `steps` steps of `config.dt`.
    ///
    /// The returned path starts with `start` and stops early once the speed
    /// drops below `config.speed_floor`.
    pub fn integrate(&self, start: &[f64], steps: usize) -> SedsResult<Vec<Vec<f64>>> {
        let model = self.trained()?;
        let mut x = start.to_vec();
        Self::offset(model, &x)?;
        let mut path = Vec::with_capacity(steps + 1);
        path.push(x.clone());
        for _ in 0..steps {
            let velocity = model.regression.regress(&Self::offset(model, &x)?)?.mean;
            if norm(&velocity) < self.config.speed_floor {
                break;
            }
            for (xi, vi) in x.iter_mut().zip(&velocity) {
                *xi += self.config.dt * vi;
            }
            path.push(x.clone());
        }
        Ok(path)
    }

    /// Writes the trained model and endpoint to `path`.
    pub fn save_model(&self, path: impl AsRef<Path>) -> SedsResult<()> {
        let model = self.model.as_ref().ok_or(SedsError::ModelNotTrained)?;
        persistence::save(
            path,
            &model.gmm,
            model.endpoint.len(),
            Some(&model.endpoint),
        )
    }

    /// Replaces the model with one read from `path`; on failure the current model is kept.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> SedsResult<()> {
        let path = path.as_ref();
        let loaded = persistence::load(path).and_then(|stored| {
            let dim = stored.gmm.dim();
            if dim % 2 != 0 || stored.output_dim * 2 != dim {
                return Err(SedsError::malformed(format!(
                    "expected a joint position/velocity model, found dim {} with {} outputs",
                    dim, stored.output_dim
                )));
            }
            let endpoint = stored.endpoint.unwrap_or_else(|| vec![0.0; dim / 2]);
            TrainedModel::new(stored.gmm, endpoint)
        });
        match loaded {
            Ok(model) => {
                self.model = Some(model);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load model from {}: {}", path.display(), e);
                Err(e)
            }
        }
    }
}

/// Trains `shared` under a single write guard; readers see either the old or the new model.
pub fn train_shared(
    shared: &SharedDynamicalSystem,
    trajectories: &[Trajectory],
    warm_start: Option<&Gmm>,
) -> SedsResult<TrainingOutcome> {
    shared.write().train(trajectories, warm_start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmConfig;

    fn line(from: [f64; 2], steps: usize, dt: f64) -> Trajectory {
        let positions = (0..=steps)
            .map(|i| {
                let s = 1.0 - i as f64 / steps as f64;
                vec![from[0] * s, from[1] * s]
            })
            .collect();
        Trajectory::from_positions(positions, dt).unwrap()
    }

    fn config() -> DynamicsConfig {
        let mut config = DynamicsConfig::with_components(2);
        config.em = EmConfig::seeded(3);
        config.dt = 0.05;
        config
    }

    #[test]
    fn test_untrained_queries_fail() {
        let system = DynamicalSystem::new(config());
        assert!(!system.is_trained());
        assert!(matches!(
            system.velocity_at(&[0.0, 0.0]),
            Err(SedsError::ModelNotTrained)
        ));
        assert!(matches!(
            system.save_model("/tmp/never.txt"),
            Err(SedsError::ModelNotTrained)
        ));
        assert!(system.endpoint().is_empty());
    }

    #[test]
    fn test_empty_training_is_nothing_to_do() {
        let mut system = DynamicalSystem::new(config());
        let outcome = system.train(&[], None).unwrap();
        assert!(matches!(outcome, TrainingOutcome::NothingToDo { .. }));
        let outcome = system
            .train(&[Trajectory::from_positions(Vec::new(), 0.1).unwrap()], None)
            .unwrap();
        assert!(matches!(outcome, TrainingOutcome::NothingToDo { .. }));
        assert!(!system.is_trained());
    }

    #[test]
    fn test_train_and_query() {
        let mut system = DynamicalSystem::new(config());
        let demos = vec![line([2.0, 1.0], 40, 0.05), line([-1.0, 2.0], 40, 0.05)];
        let outcome = system.train(&demos, None).unwrap();
        assert!(matches!(outcome, TrainingOutcome::Trained { .. }));
        assert_eq!(system.dim(), 2);
        assert!(system.endpoint().iter().all(|e| e.abs() < 1e-12));

        let v = system.velocity_at(&[1.0, 0.5]).unwrap();
        // velocity points back towards the origin
        assert!(v[0] * 1.0 + v[1] * 0.5 < 0.0);
        let out = system.velocity_with_covariance(&[1.0, 0.5]).unwrap();
        assert_eq!(out.mean, v);
        assert!(matches!(
            system.velocity_at(&[1.0]),
            Err(SedsError::DimensionMismatch { .. })
        ));

        let path = system.integrate(&[2.0, 1.0], 10).unwrap();
        assert_eq!(path[0], vec![2.0, 1.0]);
        assert!(path.len() > 1);
    }

    #[test]
    fn test_warm_start_and_shared_training() {
        let demos = vec![line([2.0, 1.0], 40, 0.05), line([-1.0, 2.0], 40, 0.05)];
        let shared = DynamicalSystem::new(config()).into_shared();
        train_shared(&shared, &demos, None).unwrap();
        let previous = shared.read().mixture().cloned().unwrap();
        let outcome = train_shared(&shared, &demos, Some(&previous)).unwrap();
        assert!(matches!(outcome, TrainingOutcome::Trained { .. }));
        assert!(shared.read().is_trained());
    }

    #[test]
    fn test_failed_load_keeps_model() {
        let mut system = DynamicalSystem::new(config());
        let demos = vec![line([2.0, 1.0], 30, 0.05)];
        system.train(&demos, None).unwrap();
        let before = system.velocity_at(&[1.0, 1.0]).unwrap();
        assert!(system.load_model("/nonexistent/model.txt").is_err());
        assert_eq!(system.velocity_at(&[1.0, 1.0]).unwrap(), before);
    }
}
