//! Packed symmetric matrices and the triangular algebra built on them.
//!
//! A `SymmetricMatrix` of dimension `n` stores the upper triangle row by row
//! in `n(n+1)/2` scalars. The same layout holds upper-triangular Cholesky
//! factors, so a factor and the matrix it came from share one type.

use crate::config::CovarianceKind;
use nalgebra::DMatrix;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Symmetric matrix stored as its packed upper triangle.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymmetricMatrix {
    dim: usize,
    data: Vec<f64>,
}

/// Weighted mean and covariance of a point set.
#[derive(Debug, Clone)]
pub struct WeightedMoments {
    /// Weighted mean
    pub mean: Vec<f64>,
    /// Weighted covariance, normalized by the weight sum
    pub covariance: SymmetricMatrix,
    /// Sum of weights
    pub effective_count: f64,
}

/// Number of scalars in a packed triangle of dimension `n`.
#[inline]
pub const fn packed_len(n: usize) -> usize {
    n * (n + 1) / 2
}

impl SymmetricMatrix {
    /// Zero matrix.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; packed_len(dim)],
        }
    }

    /// Identity matrix.
    pub fn identity(dim: usize) -> Self {
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Wraps an existing packed buffer; `None` if the length is wrong.
    pub fn from_packed(dim: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == packed_len(dim)).then_some(Self { dim, data })
    }

    /// Builds from a full square matrix, symmetrizing as `(A + Aᵀ)/2`.
    pub fn from_full(rows: &[Vec<f64>]) -> Self {
        let dim = rows.len();
        let mut m = Self::zeros(dim);
        for i in 0..dim {
            for j in i..dim {
                let a = rows[i].get(j).copied().unwrap_or(0.0);
                let b = rows[j].get(i).copied().unwrap_or(0.0);
                m.set(i, j, 0.5 * (a + b));
            }
        }
        m
    }

    /// Builds from an nalgebra matrix, symmetrizing.
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Self {
        let dim = m.nrows();
        let mut out = Self::zeros(dim);
        for i in 0..dim {
            for j in i..dim {
                out.set(i, j, 0.5 * (m[(i, j)] + m[(j, i)]));
            }
        }
        out
    }

    /// Dimension `n`.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Packed upper triangle.
    #[inline]
    pub fn as_packed(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        let (r, c) = if i <= j { (i, j) } else { (j, i) };
        r * self.dim - r * (r.saturating_sub(1)) / 2 + (c - r)
    }

    /// Entry `(i, j)`; symmetric access.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.index(i, j)]
    }

    /// Sets `(i, j)` and, implicitly, `(j, i)`.
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }

    /// Entry `(i, j)` of an upper-triangular factor stored in this layout (zero below the diagonal).
    #[inline]
    pub fn upper(&self, i: usize, j: usize) -> f64 {
        if i > j {
            0.0
        } else {
            self.get(i, j)
        }
    }

    /// Dense row-major copy.
    pub fn to_full(&self) -> Vec<Vec<f64>> {
        (0..self.dim)
            .map(|i| (0..self.dim).map(|j| self.get(i, j)).collect())
            .collect()
    }

    /// Dense nalgebra copy.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.dim, self.dim, |i, j| self.get(i, j))
    }

    /// Diagonal entries.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.dim).map(|i| self.get(i, i)).collect()
    }

    /// Sum of the diagonal.
    pub fn trace(&self) -> f64 {
        (0..self.dim).map(|i| self.get(i, i)).sum()
    }

    /// Adds `bias` to every diagonal entry.
    pub fn add_to_diagonal(&mut self, bias: f64) {
        for i in 0..self.dim {
            let idx = self.index(i, i);
            self.data[idx] += bias;
        }
    }

    /// Scales every entry.
    pub fn scale(&mut self, factor: f64) {
        self.data.iter_mut().for_each(|v| *v *= factor);
    }

    /// `A·x`.
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        (0..self.dim)
            .map(|i| (0..self.dim).map(|j| self.get(i, j) * x[j]).sum())
            .collect()
    }

    /// `xᵀ·A·x`.
    pub fn quadratic_form(&self, x: &[f64]) -> f64 {
        let mut total = 0.0;
        for i in 0..self.dim {
            total += self.get(i, i) * x[i] * x[i];
            for j in (i + 1)..self.dim {
                total += 2.0 * self.get(i, j) * x[i] * x[j];
            }
        }
        total
    }

    /// Principal submatrix over `dims` (in the given order).
    pub fn submatrix(&self, dims: &[usize]) -> SymmetricMatrix {
        let mut out = Self::zeros(dims.len());
        for (a, &i) in dims.iter().enumerate() {
            for (b, &j) in dims.iter().enumerate().skip(a) {
                out.set(a, b, self.get(i, j));
            }
        }
        out
    }

    /// Cholesky factorization `UᵀU = A`, returning `U` in packed upper form.
    ///
    /// Returns `None` as soon as a pivot is non-positive or not finite; the
    /// caller is expected to add a diagonal bias and retry.
    pub fn cholesky(&self) -> Option<SymmetricMatrix> {
        let n = self.dim;
        let mut u = Self::zeros(n);
        for i in 0..n {
            let mut pivot = self.get(i, i);
            for k in 0..i {
                let uki = u.get(k, i);
                pivot -= uki * uki;
            }
            if !(pivot > 0.0) || !pivot.is_finite() {
                return None;
            }
            let uii = pivot.sqrt();
            u.set(i, i, uii);
            for j in (i + 1)..n {
                let mut s = self.get(i, j);
                for k in 0..i {
                    s -= u.get(k, i) * u.get(k, j);
                }
                u.set(i, j, s / uii);
            }
        }
        Some(u)
    }

    /// Solves `Uᵀ·y = b` for an upper factor `u`.
    pub fn forward_solve(u: &SymmetricMatrix, b: &[f64]) -> Vec<f64> {
        let n = u.dim;
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut s = b[i];
            for k in 0..i {
                s -= u.get(k, i) * y[k];
            }
            y[i] = s / u.get(i, i);
        }
        y
    }

    /// Solves `U·x = y` for an upper factor `u`.
    pub fn backward_solve(u: &SymmetricMatrix, y: &[f64]) -> Vec<f64> {
        let n = u.dim;
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut s = y[i];
            for k in (i + 1)..n {
                s -= u.get(i, k) * x[k];
            }
            x[i] = s / u.get(i, i);
        }
        x
    }

    /// Solves `A·x = b` given `A`'s upper factor.
    pub fn cholesky_solve(u: &SymmetricMatrix, b: &[f64]) -> Vec<f64> {
        let y = Self::forward_solve(u, b);
        Self::backward_solve(u, &y)
    }

    /// `ln det(A)` from `A`'s upper factor.
    pub fn log_determinant_from_factor(u: &SymmetricMatrix) -> f64 {
        2.0 * (0..u.dim).map(|i| u.get(i, i).ln()).sum::<f64>()
    }

    /// Weighted mean and covariance of `data` rows.
    ///
    /// Returns `None` when there is no data or the weights sum to zero.
    pub fn weighted_covariance(
        data: &[Vec<f64>],
        weights: &[f64],
        kind: CovarianceKind,
    ) -> Option<WeightedMoments> {
        let dim = data.first()?.len();
        let total: f64 = weights.iter().take(data.len()).sum();
        if !(total > 0.0) || !total.is_finite() {
            return None;
        }

        let mut mean = vec![0.0; dim];
        for (row, &w) in data.iter().zip(weights) {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += w * x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= total);

        let mut covariance = Self::zeros(dim);
        for (row, &w) in data.iter().zip(weights) {
            if w == 0.0 {
                continue;
            }
            for i in 0..dim {
                let di = row[i] - mean[i];
                match kind {
                    CovarianceKind::Full => {
                        for j in i..dim {
                            let idx = covariance.index(i, j);
                            covariance.data[idx] += w * di * (row[j] - mean[j]);
                        }
                    }
                    CovarianceKind::Diagonal | CovarianceKind::Spherical => {
                        let idx = covariance.index(i, i);
                        covariance.data[idx] += w * di * di;
                    }
                }
            }
        }
        covariance.scale(1.0 / total);

        if kind == CovarianceKind::Spherical && dim > 0 {
            let variance = covariance.trace() / dim as f64;
            covariance = Self::identity(dim);
            covariance.scale(variance);
        }

        Some(WeightedMoments {
            mean,
            covariance,
            effective_count: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn spd3() -> SymmetricMatrix {
        SymmetricMatrix::from_full(&[
            vec![4.0, 1.0, 0.5],
            vec![1.0, 3.0, 0.2],
            vec![0.5, 0.2, 2.0],
        ])
    }

    #[test]
    fn test_packed_layout_row_major_upper() {
        let m = spd3();
        assert_eq!(m.as_packed(), &[4.0, 1.0, 0.5, 3.0, 0.2, 2.0]);
        assert_eq!(m.get(2, 0), m.get(0, 2));
        assert_eq!(packed_len(4), 10);
    }

    #[test]
    fn test_cholesky_reconstructs() {
        let a = spd3();
        let u = a.cholesky().unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let recon: f64 = (0..3).map(|k| u.upper(k, i) * u.upper(k, j)).sum();
                assert_approx_eq!(recon, a.get(i, j), 1e-12);
            }
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = SymmetricMatrix::from_full(&[vec![1.0, 2.0], vec![2.0, 1.0]]);
        assert!(a.cholesky().is_none());
        let singular = SymmetricMatrix::zeros(2);
        assert!(singular.cholesky().is_none());
        let nan = SymmetricMatrix::from_full(&[vec![f64::NAN]]);
        assert!(nan.cholesky().is_none());
    }

    #[test]
    fn test_triangular_solves() {
        let a = spd3();
        let u = a.cholesky().unwrap();
        let b = vec![1.0, -2.0, 0.5];
        let x = SymmetricMatrix::cholesky_solve(&u, &b);
        let ax = a.mul_vec(&x);
        for i in 0..3 {
            assert_approx_eq!(ax[i], b[i], 1e-12);
        }
        // quadratic form through the forward solve
        let y = SymmetricMatrix::forward_solve(&u, &b);
        let q: f64 = y.iter().map(|v| v * v).sum();
        assert_approx_eq!(q, crate::math_utils::dot(&b, &x), 1e-12);
    }

    #[test]
    fn test_log_determinant() {
        let a = spd3();
        let u = a.cholesky().unwrap();
        let det = a.to_dmatrix().determinant();
        assert_approx_eq!(SymmetricMatrix::log_determinant_from_factor(&u), det.ln(), 1e-12);
    }

    #[test]
    fn test_weighted_covariance_variants() {
        let data = vec![vec![0.0, 0.0], vec![2.0, 2.0], vec![2.0, 0.0], vec![0.0, 2.0]];
        let weights = vec![1.0; 4];

        let full = SymmetricMatrix::weighted_covariance(&data, &weights, CovarianceKind::Full).unwrap();
        assert_approx_eq!(full.mean[0], 1.0, 1e-12);
        assert_approx_eq!(full.covariance.get(0, 0), 1.0, 1e-12);
        assert_approx_eq!(full.covariance.get(0, 1), 0.0, 1e-12);
        assert_approx_eq!(full.effective_count, 4.0, 1e-12);

        let weights = vec![1.0, 1.0, 0.0, 0.0];
        let full = SymmetricMatrix::weighted_covariance(&data, &weights, CovarianceKind::Full).unwrap();
        assert_approx_eq!(full.covariance.get(0, 1), 1.0, 1e-12);
        let diag =
            SymmetricMatrix::weighted_covariance(&data, &weights, CovarianceKind::Diagonal).unwrap();
        assert_approx_eq!(diag.covariance.get(0, 1), 0.0, 1e-12);
        assert_approx_eq!(diag.covariance.get(1, 1), 1.0, 1e-12);

        let data = vec![vec![0.0, 0.0], vec![4.0, 0.0]];
        let sphere = SymmetricMatrix::weighted_covariance(&data, &[1.0, 1.0], CovarianceKind::Spherical)
            .unwrap();
        // variances 4 and 0 average to 2
        assert_approx_eq!(sphere.covariance.get(0, 0), 2.0, 1e-12);
        assert_approx_eq!(sphere.covariance.get(1, 1), 2.0, 1e-12);
    }

    #[test]
    fn test_weighted_covariance_zero_weight() {
        let data = vec![vec![1.0], vec![2.0]];
        assert!(SymmetricMatrix::weighted_covariance(&data, &[0.0, 0.0], CovarianceKind::Full).is_none());
        assert!(SymmetricMatrix::weighted_covariance(&[], &[], CovarianceKind::Full).is_none());
    }

    #[test]
    fn test_submatrix_and_quadratic_form() {
        let a = spd3();
        let sub = a.submatrix(&[0, 2]);
        assert_approx_eq!(sub.get(0, 1), 0.5, 1e-12);
        assert_approx_eq!(sub.get(1, 1), 2.0, 1e-12);
        let x = [1.0, 2.0, 3.0];
        let direct = crate::math_utils::dot(&x, &a.mul_vec(&x));
        assert_approx_eq!(a.quadratic_form(&x), direct, 1e-12);
    }
}
