//! Numerical constants and small dense helpers shared by the mixture and
//! stability-optimization code.
//!
//! The constants module collects every floor and bias used to keep densities,
//! responsibilities and factorizations finite. Keeping them in one place
//! makes the chosen thresholds auditable.

use nalgebra::{DMatrix, SymmetricEigen};

/// Safe comparison for floating point values (handles NaN)
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater, // push NaN to end
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
    }
}

/// Numerically stable `ln(Σ exp(v_i))`.
///
/// Returns `-inf` for an empty slice or when every entry is `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Dot product of two equal-length slices.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
#[inline]
pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Determinant of a small dense matrix.
pub fn determinant(m: &DMatrix<f64>) -> f64 {
    match m.nrows() {
        0 => 1.0,
        1 => m[(0, 0)],
        2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        _ => m.clone().determinant(),
    }
}

/// Cofactor matrix `C` of a square matrix, `C_ij = (-1)^(i+j) det(M without row i, column j)`.
///
/// `d det(M) = Σ_ij C_ij dM_ij`. Unlike `det(M)·M⁻¹` this stays defined when
/// `M` is singular.
pub fn cofactor_matrix(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    if n == 1 {
        return DMatrix::from_element(1, 1, 1.0);
    }
    DMatrix::from_fn(n, n, |i, j| {
        let minor = m.clone().remove_row(i).remove_column(j);
        let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
        sign * determinant(&minor)
    })
}

/// Eigenvalues of a symmetric matrix sorted ascending.
pub fn sorted_symmetric_eigenvalues(m: &DMatrix<f64>) -> Vec<f64> {
    let eigen = SymmetricEigen::new(m.clone());
    let mut values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    values.sort_by(float_total_cmp);
    values
}

/// Cholesky-based factorization of a symmetric positive-definite matrix.
#[derive(Debug, Clone)]
pub struct SpdFactorization {
    /// Lower factor `L` with `LLᵀ = M + bias·I`
    pub lower: DMatrix<f64>,
    /// `(M + bias·I)⁻¹`
    pub inverse: DMatrix<f64>,
    /// `ln det(M + bias·I)`
    pub log_determinant: f64,
    /// Diagonal bias that was needed
    pub bias: f64,
}

/// Factorizes `m`, walking [`constants::BIAS_LADDER`] until Cholesky succeeds.
///
/// Falls back to the absolute diagonal when every level fails.
pub fn spd_factorization(m: &DMatrix<f64>) -> SpdFactorization {
    let n = m.nrows();
    let mean_diagonal = if n > 0 {
        m.diagonal().iter().map(|v| v.abs()).sum::<f64>() / n as f64
    } else {
        0.0
    };
    let scale = if mean_diagonal.is_finite() {
        mean_diagonal.max(1.0)
    } else {
        1.0
    };

    for &multiplier in constants::BIAS_LADDER.iter() {
        let bias = multiplier * scale;
        let biased = m + DMatrix::identity(n, n) * bias;
        if biased.iter().any(|v| !v.is_finite()) {
            break;
        }
        if let Some(cholesky) = biased.cholesky() {
            let lower = cholesky.l();
            let log_determinant = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
            if !log_determinant.is_finite() {
                continue;
            }
            return SpdFactorization {
                inverse: cholesky.inverse(),
                lower,
                log_determinant,
                bias,
            };
        }
    }

    let bias = constants::BIAS_LADDER[constants::BIAS_LADDER.len() - 1] * scale;
    let diagonal: Vec<f64> = (0..n)
        .map(|i| {
            let v = m[(i, i)];
            if v.is_finite() {
                v.abs() + bias
            } else {
                bias
            }
        })
        .collect();
    SpdFactorization {
        lower: DMatrix::from_fn(n, n, |i, j| if i == j { diagonal[i].sqrt() } else { 0.0 }),
        inverse: DMatrix::from_fn(n, n, |i, j| if i == j { 1.0 / diagonal[i] } else { 0.0 }),
        log_determinant: diagonal.iter().map(|v| v.ln()).sum(),
        bias,
    }
}

/// Logistic function `1 / (1 + e^-p)`.
#[inline]
pub fn sigmoid(p: f64) -> f64 {
    if p >= 0.0 {
        1.0 / (1.0 + (-p).exp())
    } else {
        let e = p.exp();
        e / (1.0 + e)
    }
}

/// Inverse of [`sigmoid`], `-ln(1/π - 1)`, with π clamped into the open unit interval.
#[inline]
pub fn logit(pi: f64) -> f64 {
    let pi = pi.clamp(constants::PRIOR_FLOOR, 1.0 - constants::PRIOR_FLOOR);
    -(1.0 / pi - 1.0).ln()
}

/// Numerical floors and biases.
pub mod constants {
    /// Default tolerance for float comparisons
    pub const DEFAULT_EPSILON: f64 = 1e-12;

    /// Smallest density value returned by a Gaussian
    pub const DENSITY_FLOOR: f64 = f64::MIN_POSITIVE;

    /// Floor for the Gaussian normalization factor once bias escalation is exhausted
    pub const MIN_NORMALIZATION: f64 = 1e-300;

    /// Multipliers of the diagonal scale tried in turn when a Cholesky factorization fails
    pub const BIAS_LADDER: [f64; 7] = [0.0, 1e-12, 1e-9, 1e-6, 1e-3, 1e-1, 1.0];

    /// Effective weight below which an EM component is considered empty and reseeded
    pub const EMPTY_COMPONENT_WEIGHT: f64 = 1e-10;

    /// Prior floor used by logit transforms and prior normalization
    pub const PRIOR_FLOOR: f64 = 1e-12;

    /// Denominator floor for ratios of mixture weights
    pub const WEIGHT_FLOOR: f64 = 1e-300;

    /// ln(2π)
    pub const LN_TWO_PI: f64 = 1.837_877_066_409_345_5;

    /// 2π
    pub const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
}

/// Safe floating-point operations.
pub mod float_ops {
    use super::constants::DEFAULT_EPSILON;

    /// Check if two floating point numbers are approximately equal
    #[inline]
    pub fn approx_eq(a: f64, b: f64) -> bool {
        approx_eq_eps(a, b, DEFAULT_EPSILON)
    }

    /// Check if two floating point numbers are approximately equal with custom epsilon
    #[inline]
    pub fn approx_eq_eps(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    /// Safe division that checks for near-zero denominators and infinite/NaN inputs
    pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
        if denominator.abs() < DEFAULT_EPSILON || !numerator.is_finite() || !denominator.is_finite()
        {
            None
        } else {
            Some(numerator / denominator)
        }
    }

    /// Division with the denominator floored away from zero (sign preserved).
    #[inline]
    pub fn floored_div(numerator: f64, denominator: f64, floor: f64) -> f64 {
        if denominator.abs() < floor {
            numerator / floor.copysign(denominator)
        } else {
            numerator / denominator
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_log_sum_exp_matches_direct_sum() {
        let values = [0.1, -2.0, 1.5];
        let direct: f64 = values.iter().map(|v: &f64| v.exp()).sum::<f64>().ln();
        assert_approx_eq!(log_sum_exp(&values), direct, 1e-12);
    }

    #[test]
    fn test_log_sum_exp_extreme_values() {
        let values = [-1000.0, -1001.0];
        let expected = -1000.0 + (1.0 + (-1.0f64).exp()).ln();
        assert_approx_eq!(log_sum_exp(&values), expected, 1e-10);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_cofactor_matches_adjugate_of_invertible() {
        let m = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 4.0]);
        let cof = cofactor_matrix(&m);
        let det = determinant(&m);
        let inv = m.clone().try_inverse().unwrap();
        // C = det · M⁻ᵀ
        for i in 0..3 {
            for j in 0..3 {
                assert_approx_eq!(cof[(i, j)], det * inv[(j, i)], 1e-10);
            }
        }
    }

    #[test]
    fn test_cofactor_singular_matrix_finite() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let cof = cofactor_matrix(&m);
        assert_approx_eq!(cof[(0, 0)], 4.0, 1e-12);
        assert_approx_eq!(cof[(0, 1)], -2.0, 1e-12);
        assert_approx_eq!(determinant(&m), 0.0, 1e-12);
    }

    #[test]
    fn test_sorted_eigenvalues() {
        let m = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, -3.0]);
        let eig = sorted_symmetric_eigenvalues(&m);
        assert_approx_eq!(eig[0], -3.0, 1e-12);
        assert_approx_eq!(eig[1], -1.0, 1e-12);
    }

    #[test]
    fn test_spd_factorization_plain_and_singular() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let f = spd_factorization(&m);
        assert_eq!(f.bias, 0.0);
        assert_approx_eq!(f.log_determinant, 8.0f64.ln(), 1e-12);
        let identity = &m * &f.inverse;
        assert_approx_eq!(identity[(0, 0)], 1.0, 1e-12);
        assert_approx_eq!(identity[(0, 1)], 0.0, 1e-12);

        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let f = spd_factorization(&singular);
        assert!(f.bias > 0.0);
        assert!(f.log_determinant.is_finite());
    }

    #[test]
    fn test_sigmoid_logit_inverse() {
        for &pi in &[0.01, 0.3, 0.5, 0.9] {
            assert_approx_eq!(sigmoid(logit(pi)), pi, 1e-12);
        }
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
    }

    #[test]
    fn test_floored_div() {
        assert_approx_eq!(float_ops::floored_div(1.0, 0.0, 1e-3), 1000.0, 1e-9);
        assert_approx_eq!(float_ops::floored_div(1.0, -1e-6, 1e-3), -1000.0, 1e-9);
        assert_approx_eq!(float_ops::floored_div(1.0, 4.0, 1e-3), 0.25, 1e-12);
        assert!(float_ops::safe_div(1.0, 0.0).is_none());
    }
}
