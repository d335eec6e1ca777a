//! Gaussian mixture model with EM training.
//!
//! The mixture owns its components exclusively. Every mutating method bumps a
//! revision counter, which lets derived consumers (mixture regression) detect
//! that their cached state no longer matches the parameters.

use crate::config::{CovarianceKind, EmConfig, InitPolicy};
use crate::errors::{validate_dimension, validate_samples, SedsError, SedsResult};
use crate::gaussian::Gaussian;
use crate::math_utils::constants::{EMPTY_COMPONENT_WEIGHT, PRIOR_FLOOR};
use crate::math_utils::log_sum_exp;
use crate::random::ModelRng;
use crate::symmetric_matrix::SymmetricMatrix;
use log::{debug, info, warn};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum hard-assignment passes during k-means initialization
const KMEANS_MAX_ITERATIONS: usize = 100;

/// Centroid movement below which k-means stops
const KMEANS_TOLERANCE: f64 = 1e-9;

/// Termination status of an EM run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EmStatus {
    /// Log-likelihood change fell below tolerance with no pending reseed
    Converged,
    /// Iteration cap reached
    MaxIterations,
    /// Empty input; parameters untouched
    NothingToDo,
}

/// Summary of an EM run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmReport {
    /// Number of E-steps performed
    pub iterations: usize,
    /// Final mean log-likelihood per sample
    pub log_likelihood: f64,
    /// Mean log-likelihood after each E-step
    pub history: Vec<f64>,
    /// Number of component reseeds
    pub reseeds: usize,
    /// Termination status
    pub status: EmStatus,
}

impl EmReport {
    fn nothing_to_do() -> Self {
        Self {
            iterations: 0,
            log_likelihood: f64::NEG_INFINITY,
            history: Vec::new(),
            reseeds: 0,
            status: EmStatus::NothingToDo,
        }
    }
}

/// Weighted collection of Gaussian components.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gmm {
    dim: usize,
    components: Vec<Gaussian>,
    revision: u64,
}

impl Gmm {
    /// `n_states` components with zero mean, identity covariance and uniform priors.
    pub fn new(n_states: usize, dim: usize) -> Self {
        let prior = if n_states > 0 {
            1.0 / n_states as f64
        } else {
            0.0
        };
        let components = (0..n_states)
            .map(|_| {
                let mut g = Gaussian::new(dim);
                g.set_prior(prior);
                g
            })
            .collect();
        Self {
            dim,
            components,
            revision: 0,
        }
    }

    /// Builds a mixture from explicit components; all must share one dimension.
    pub fn from_components(components: Vec<Gaussian>) -> SedsResult<Self> {
        let first = components.first().ok_or(SedsError::InsufficientData {
            required: 1,
            actual: 0,
        })?;
        let dim = first.dim();
        for g in &components {
            validate_dimension(dim, g.dim(), "mixture component")?;
        }
        Ok(Self {
            dim,
            components,
            revision: 0,
        })
    }

    /// Component count.
    #[inline]
    pub fn n_states(&self) -> usize {
        self.components.len()
    }

    /// Dimension of every component.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Parameter revision; changes on every mutation.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Components in order.
    pub fn components(&self) -> &[Gaussian] {
        &self.components
    }

    /// Component `k`.
    pub fn component(&self, k: usize) -> &Gaussian {
        &self.components[k]
    }

    /// Mutable access to component `k`; bumps the revision.
    pub fn component_mut(&mut self, k: usize) -> &mut Gaussian {
        self.touch();
        &mut self.components[k]
    }

    /// Priors in component order.
    pub fn priors(&self) -> Vec<f64> {
        self.components.iter().map(Gaussian::prior).collect()
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Rescales priors to sum to one; uniform if they sum to (near) zero.
    pub fn normalize_priors(&mut self) {
        let total: f64 = self.components.iter().map(|g| g.prior().max(0.0)).sum();
        let k = self.components.len() as f64;
        for g in &mut self.components {
            let p = if total > PRIOR_FLOOR && total.is_finite() {
                g.prior().max(0.0) / total
            } else {
                1.0 / k
            };
            g.set_prior(p);
        }
        self.touch();
    }

    /// `Σ_k π_k N_k(x)`.
    pub fn density(&self, x: &[f64]) -> f64 {
        self.components
            .iter()
            .map(|g| g.prior() * g.density(x))
            .sum()
    }

    fn log_joint(&self, x: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|g| g.prior().max(PRIOR_FLOOR).ln() + g.log_density(x))
            .collect()
    }

    /// Mean log-likelihood per sample.
    pub fn log_likelihood(&self, data: &[Vec<f64>]) -> SedsResult<f64> {
        validate_samples(data, self.dim, "log-likelihood data")?;
        if data.is_empty() {
            return Ok(f64::NEG_INFINITY);
        }
        let total: f64 = data.iter().map(|x| log_sum_exp(&self.log_joint(x))).sum();
        Ok(total / data.len() as f64)
    }

    /// Posterior component probabilities at `x`, each floored at `f64::MIN_POSITIVE`.
    pub fn responsibilities(&self, x: &[f64]) -> SedsResult<Vec<f64>> {
        validate_dimension(self.dim, x.len(), "responsibility query")?;
        Ok(self.responsibilities_unchecked(x).0)
    }

    fn responsibilities_unchecked(&self, x: &[f64]) -> (Vec<f64>, f64) {
        let log_joint = self.log_joint(x);
        let normalizer = log_sum_exp(&log_joint);
        let resp = log_joint
            .iter()
            .map(|l| (l - normalizer).exp().max(f64::MIN_POSITIVE))
            .collect();
        (resp, normalizer)
    }

    /// Index maximizing `π_k N_k(x)`; ties go to the lowest index.
    pub fn most_likely_state(&self, x: &[f64]) -> SedsResult<usize> {
        validate_dimension(self.dim, x.len(), "most likely state query")?;
        let mut best = 0;
        let mut best_value = f64::NEG_INFINITY;
        for (k, g) in self.components.iter().enumerate() {
            let value = g.prior() * g.density(x);
            if value > best_value {
                best_value = value;
                best = k;
            }
        }
        Ok(best)
    }

    /// Draws a component by prior, then a point from it.
    pub fn sample(&self, rng: &mut ModelRng) -> Vec<f64> {
        if self.components.is_empty() {
            return vec![0.0; self.dim];
        }
        let k = rng.weighted_index(&self.priors());
        self.components[k].sample(rng)
    }

    /// Initializes means, covariances and priors from `data`.
    ///
    /// Covariances are built in the `kind` family that EM will later fit, so
    /// the first M-step cannot lower the likelihood by projecting them.
    pub fn init(
        &mut self,
        data: &[Vec<f64>],
        policy: InitPolicy,
        kind: CovarianceKind,
        rng: &mut ModelRng,
    ) -> SedsResult<()> {
        if data.is_empty() || self.components.is_empty() {
            return Err(SedsError::InsufficientData {
                required: 1,
                actual: data.len(),
            });
        }
        validate_samples(data, self.dim, "initialization data")?;

        let shared = empirical_covariance(data, self.dim, kind);
        let k = self.components.len();
        let means: Vec<Vec<f64>> = match policy {
            InitPolicy::Random => random_points(data, k, rng),
            InitPolicy::UniformSplit => uniform_split_points(data, k),
            InitPolicy::KMeans => {
                let seeds = kmeans_plus_plus(data, k, rng);
                let (centroids, assignments) = kmeans(data, seeds);
                self.apply_cluster_statistics(data, &centroids, &assignments, &shared, kind);
                self.touch();
                return Ok(());
            }
        };

        for (g, mean) in self.components.iter_mut().zip(means) {
            g.set_mean(mean);
            g.set_covariance(shared.clone());
            g.set_prior(1.0 / k as f64);
        }
        self.touch();
        Ok(())
    }

    fn apply_cluster_statistics(
        &mut self,
        data: &[Vec<f64>],
        centroids: &[Vec<f64>],
        assignments: &[usize],
        shared: &SymmetricMatrix,
        kind: CovarianceKind,
    ) {
        let n = data.len() as f64;
        for (j, g) in self.components.iter_mut().enumerate() {
            let weights: Vec<f64> = assignments
                .iter()
                .map(|&a| if a == j { 1.0 } else { 0.0 })
                .collect();
            let count: f64 = weights.iter().sum();
            g.set_mean(centroids[j].clone());
            // too few points for a covariance estimate
            let covariance = if count > self.dim as f64 {
                SymmetricMatrix::weighted_covariance(data, &weights, kind)
                    .map(|m| m.covariance)
                    .unwrap_or_else(|| shared.clone())
            } else {
                shared.clone()
            };
            g.set_covariance(covariance);
            g.set_prior((count / n).max(PRIOR_FLOOR));
        }
        self.normalize_priors();
    }

    /// Initializes with `config.init`, then runs EM.
    pub fn train(
        &mut self,
        data: &[Vec<f64>],
        config: &EmConfig,
        rng: &mut ModelRng,
    ) -> SedsResult<EmReport> {
        config.validate()?;
        if data.is_empty() || self.components.is_empty() {
            return Ok(EmReport::nothing_to_do());
        }
        validate_samples(data, self.dim, "training data")?;
        self.init(data, config.init, config.covariance_kind, rng)?;
        self.expectation_maximization(data, None, config, rng)
    }

    /// Initializes, then runs EM with per-sample weights scaling the responsibilities.
    pub fn train_weighted(
        &mut self,
        data: &[Vec<f64>],
        weights: &[f64],
        config: &EmConfig,
        rng: &mut ModelRng,
    ) -> SedsResult<EmReport> {
        config.validate()?;
        validate_dimension(data.len(), weights.len(), "sample weights")?;
        if let Some(&bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SedsError::InvalidParameter {
                parameter: "weights".to_string(),
                value: bad,
                constraint: "finite and non-negative".to_string(),
            });
        }
        let total: f64 = weights.iter().sum();
        if data.is_empty() || self.components.is_empty() || total <= 0.0 {
            return Ok(EmReport::nothing_to_do());
        }
        validate_samples(data, self.dim, "training data")?;
        self.init(data, config.init, config.covariance_kind, rng)?;
        self.expectation_maximization(data, Some(weights), config, rng)
    }

    /// Runs EM from the current parameters without re-initializing.
    pub fn refine(
        &mut self,
        data: &[Vec<f64>],
        config: &EmConfig,
        rng: &mut ModelRng,
    ) -> SedsResult<EmReport> {
        config.validate()?;
        if data.is_empty() || self.components.is_empty() {
            return Ok(EmReport::nothing_to_do());
        }
        validate_samples(data, self.dim, "training data")?;
        self.expectation_maximization(data, None, config, rng)
    }

    fn expectation_maximization(
        &mut self,
        data: &[Vec<f64>],
        weights: Option<&[f64]>,
        config: &EmConfig,
        rng: &mut ModelRng,
    ) -> SedsResult<EmReport> {
        let shared = empirical_covariance(data, self.dim, config.covariance_kind);
        let mut history = Vec::with_capacity(config.max_iterations);
        let mut previous = f64::NEG_INFINITY;
        let mut reseeded_last = false;
        let mut reseeds = 0;
        let mut status = EmStatus::MaxIterations;

        for iteration in 0..config.max_iterations {
            let (resp, log_likelihood) = self.expectation(data);
            history.push(log_likelihood);
            debug!("EM iteration {}: mean log-likelihood {:.8}", iteration, log_likelihood);

            if iteration > 0
                && !reseeded_last
                && (log_likelihood - previous).abs() < config.tolerance
            {
                status = EmStatus::Converged;
                break;
            }
            previous = log_likelihood;

            let reseeded = self.maximization(data, &resp, weights, config, &shared, rng);
            reseeds += reseeded;
            reseeded_last = reseeded > 0;
        }

        let log_likelihood = history.last().copied().unwrap_or(f64::NEG_INFINITY);
        if status == EmStatus::MaxIterations {
            debug!(
                "EM reached {} iterations without converging",
                config.max_iterations
            );
        }
        info!(
            "EM finished after {} iterations: log-likelihood {:.6}, {} reseeds, {:?}",
            history.len(),
            log_likelihood,
            reseeds,
            status
        );
        Ok(EmReport {
            iterations: history.len(),
            log_likelihood,
            history,
            reseeds,
            status,
        })
    }

    /// Responsibilities `r[n][k]` and the mean log-likelihood.
    fn expectation(&self, data: &[Vec<f64>]) -> (Vec<Vec<f64>>, f64) {
        let mut total = 0.0;
        let resp = data
            .iter()
            .map(|x| {
                let (r, normalizer) = self.responsibilities_unchecked(x);
                total += normalizer;
                r
            })
            .collect();
        (resp, total / data.len() as f64)
    }

    /// Updates every component; returns how many were reseeded.
    fn maximization(
        &mut self,
        data: &[Vec<f64>],
        resp: &[Vec<f64>],
        weights: Option<&[f64]>,
        config: &EmConfig,
        shared: &SymmetricMatrix,
        rng: &mut ModelRng,
    ) -> usize {
        let total_weight: f64 = weights.map_or(data.len() as f64, |w| w.iter().sum());
        let k_count = self.components.len();
        let mut reseeded = 0;

        for k in 0..k_count {
            let w: Vec<f64> = resp
                .iter()
                .enumerate()
                .map(|(n, r)| r[k] * weights.map_or(1.0, |w| w[n]))
                .collect();
            let moments = SymmetricMatrix::weighted_covariance(data, &w, config.covariance_kind)
                .filter(|m| m.effective_count >= EMPTY_COMPONENT_WEIGHT);

            let g = &mut self.components[k];
            match moments {
                Some(m) => {
                    let mut covariance = m.covariance;
                    covariance.add_to_diagonal(config.min_variance);
                    g.set_prior(m.effective_count / total_weight);
                    g.set_mean(m.mean);
                    g.set_covariance(covariance);
                }
                None => {
                    let idx = rng.usize(0..data.len());
                    warn!("EM component {} is empty, reseeding at sample {}", k, idx);
                    g.set_mean(data[idx].clone());
                    g.set_covariance(shared.clone());
                    g.set_prior(1.0 / k_count as f64);
                    reseeded += 1;
                }
            }
        }
        self.normalize_priors();
        reseeded
    }

    /// Windowed online update with learning rate `1/window`.
    pub fn update_online(&mut self, x: &[f64], window: usize) -> SedsResult<()> {
        validate_dimension(self.dim, x.len(), "online update")?;
        crate::errors::validate_all_finite(x, "online update sample")?;
        crate::errors::validate_count(window, 1, "window")?;
        let eta = 1.0 / window as f64;
        let (resp, _) = self.responsibilities_unchecked(x);
        for (g, r) in self.components.iter_mut().zip(resp) {
            let prior = (1.0 - eta) * g.prior() + eta * r;
            g.set_prior(prior);
            let rate = if prior > PRIOR_FLOOR {
                (eta * r / prior).clamp(0.0, 1.0)
            } else {
                0.0
            };
            g.update(x, rate);
        }
        self.normalize_priors();
        Ok(())
    }
}

/// Unweighted covariance of the whole data set.
fn empirical_covariance(data: &[Vec<f64>], dim: usize, kind: CovarianceKind) -> SymmetricMatrix {
    let weights = vec![1.0; data.len()];
    SymmetricMatrix::weighted_covariance(data, &weights, kind)
        .map(|m| m.covariance)
        .unwrap_or_else(|| SymmetricMatrix::identity(dim))
}

/// `k` data points, distinct while `k <= data.len()`.
fn random_points(data: &[Vec<f64>], k: usize, rng: &mut ModelRng) -> Vec<Vec<f64>> {
    let mut indices: Vec<usize> = (0..data.len()).collect();
    (0..k)
        .map(|i| {
            if i < indices.len() {
                let j = rng.usize(i..indices.len());
                indices.swap(i, j);
                data[indices[i]].clone()
            } else {
                data[rng.usize(0..data.len())].clone()
            }
        })
        .collect()
}

/// Points nearest to evenly spaced values along the first dimension.
fn uniform_split_points(data: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let (low, high) = data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
        (lo.min(x[0]), hi.max(x[0]))
    });
    (0..k)
        .map(|i| {
            let target = low + (high - low) * (i as f64 + 0.5) / k as f64;
            data.iter()
                .min_by(|a, b| {
                    (a[0] - target)
                        .abs()
                        .partial_cmp(&(b[0] - target).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned()
                .unwrap_or_else(|| data[0].clone())
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-means++ seeding: first centroid uniform, the rest proportional to squared distance.
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut ModelRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.usize(0..data.len())].clone());
    while centroids.len() < k {
        let distances: Vec<f64> = data
            .iter()
            .map(|x| {
                centroids
                    .iter()
                    .map(|c| squared_distance(x, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let idx = rng.weighted_index(&distances);
        centroids.push(data[idx].clone());
    }
    centroids
}

/// Lloyd iterations; empty clusters keep their centroid.
fn kmeans(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>) -> (Vec<Vec<f64>>, Vec<usize>) {
    let k = centroids.len();
    let dim = data[0].len();
    let mut assignments = vec![0; data.len()];

    for _ in 0..KMEANS_MAX_ITERATIONS {
        for (a, x) in assignments.iter_mut().zip(data) {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (j, c) in centroids.iter().enumerate() {
                let d = squared_distance(x, c);
                if d < best_distance {
                    best_distance = d;
                    best = j;
                }
            }
            *a = best;
        }

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for (x, &a) in data.iter().zip(&assignments) {
            counts[a] += 1;
            for (s, v) in sums[a].iter_mut().zip(x) {
                *s += v;
            }
        }

        let mut max_change = 0.0f64;
        for j in 0..k {
            if counts[j] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[j].iter().map(|s| s / counts[j] as f64).collect();
            max_change = max_change.max(squared_distance(&updated, &centroids[j]).sqrt());
            centroids[j] = updated;
        }
        if max_change < KMEANS_TOLERANCE {
            break;
        }
    }
    (centroids, assignments)
}
