//! Demonstration trajectories and the joint sample matrix fed to training.

use crate::errors::{validate_all_finite, validate_dimension, validate_parameter, SedsError, SedsResult};
use crate::math_utils::norm;
use log::debug;

/// One demonstrated motion: positions with matching velocities.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    positions: Vec<Vec<f64>>,
    velocities: Vec<Vec<f64>>,
}

impl Trajectory {
    /// Velocities by forward differences over `dt`; the final velocity is zero.
    pub fn from_positions(positions: Vec<Vec<f64>>, dt: f64) -> SedsResult<Self> {
        validate_parameter(dt, f64::MIN_POSITIVE, f64::MAX, "dt")?;
        let dim = check_rows(&positions, "trajectory positions")?;
        let mut velocities: Vec<Vec<f64>> = positions
            .windows(2)
            .map(|w| w[1].iter().zip(&w[0]).map(|(b, a)| (b - a) / dt).collect())
            .collect();
        if !positions.is_empty() {
            velocities.push(vec![0.0; dim]);
        }
        Ok(Self {
            positions,
            velocities,
        })
    }

    /// Trajectory from explicit `(position, velocity)` pairs.
    pub fn from_samples(samples: Vec<(Vec<f64>, Vec<f64>)>) -> SedsResult<Self> {
        let (positions, velocities): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
        let dim = check_rows(&positions, "trajectory positions")?;
        for v in &velocities {
            validate_dimension(dim, v.len(), "trajectory velocities")?;
            validate_all_finite(v, "trajectory velocities")?;
        }
        Ok(Self {
            positions,
            velocities,
        })
    }

    /// State dimension; zero for an empty trajectory.
    pub fn dim(&self) -> usize {
        self.positions.first().map_or(0, Vec::len)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the trajectory has no samples.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in time order.
    pub fn positions(&self) -> &[Vec<f64>] {
        &self.positions
    }

    /// Velocities in time order.
    pub fn velocities(&self) -> &[Vec<f64>] {
        &self.velocities
    }

    /// Last position, if any.
    pub fn final_position(&self) -> Option<&[f64]> {
        self.positions.last().map(Vec::as_slice)
    }
}

/// Common dimension of `rows`, checking finiteness.
fn check_rows(rows: &[Vec<f64>], context: &str) -> SedsResult<usize> {
    let dim = rows.first().map_or(0, Vec::len);
    for row in rows {
        validate_dimension(dim, row.len(), context)?;
        validate_all_finite(row, context)?;
    }
    Ok(dim)
}

/// A set of trajectories converging to a shared endpoint.
#[derive(Debug, Clone)]
pub struct DemonstrationSet {
    trajectories: Vec<Trajectory>,
    endpoint: Vec<f64>,
    dim: usize,
}

impl DemonstrationSet {
    /// Collects non-empty trajectories; the endpoint is the mean final position.
    pub fn new(trajectories: Vec<Trajectory>) -> SedsResult<Self> {
        let trajectories: Vec<Trajectory> = trajectories.into_iter().filter(|t| !t.is_empty()).collect();
        let dim = match trajectories.first() {
            Some(t) => t.dim(),
            None => {
                return Err(SedsError::InsufficientData {
                    required: 1,
                    actual: 0,
                })
            }
        };
        let mut endpoint = vec![0.0; dim];
        for t in &trajectories {
            validate_dimension(dim, t.dim(), "demonstration set")?;
            if let Some(last) = t.final_position() {
                for (e, v) in endpoint.iter_mut().zip(last) {
                    *e += v;
                }
            }
        }
        let count = trajectories.len() as f64;
        endpoint.iter_mut().for_each(|e| *e /= count);
        Ok(Self {
            trajectories,
            endpoint,
            dim,
        })
    }

    /// Position dimension `d`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Attractor position.
    pub fn endpoint(&self) -> &[f64] {
        &self.endpoint
    }

    /// Trajectories in the set.
    pub fn trajectories(&self) -> &[Trajectory] {
        &self.trajectories
    }

    /// Total sample count.
    pub fn sample_count(&self) -> usize {
        self.trajectories.iter().map(Trajectory::len).sum()
    }

    /// Joint rows `[x - endpoint, ẋ]` of length `2d`.
    pub fn samples(&self) -> Vec<Vec<f64>> {
        self.trajectories
            .iter()
            .flat_map(|t| t.positions().iter().zip(t.velocities()))
            .map(|(x, v)| self.joint_row(x, v))
            .collect()
    }

    /// Joint rows without samples whose speed is at most `speed_floor`
    /// while their distance to the endpoint exceeds `radius`.
    pub fn samples_pruned(&self, speed_floor: f64, radius: f64) -> Vec<Vec<f64>> {
        let all = self.sample_count();
        let kept: Vec<Vec<f64>> = self
            .trajectories
            .iter()
            .flat_map(|t| t.positions().iter().zip(t.velocities()))
            .filter(|(x, v)| {
                let offset: Vec<f64> = x.iter().zip(&self.endpoint).map(|(a, b)| a - b).collect();
                norm(v) > speed_floor || norm(&offset) <= radius
            })
            .map(|(x, v)| self.joint_row(x, v))
            .collect();
        debug!("Pruned {} static samples of {}", all - kept.len(), all);
        kept
    }

    fn joint_row(&self, x: &[f64], v: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.endpoint)
            .map(|(a, b)| a - b)
            .chain(v.iter().copied())
            .collect()
    }
}
