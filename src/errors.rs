//! Error types and validation functions for the dynamical-system learning engine.
//!
//! Numerical degeneracy (singular covariances, empty mixture components,
//! underflowing normalizers) is repaired where it happens and never shows up
//! here. The variants below cover what a caller can actually act on: bad
//! input, bad configuration, file problems and malformed persisted models.

use std::sync::Arc;
use thiserror::Error;

/// Error types for mixture fitting, regression and stability optimization.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SedsError {
    /// Not enough samples or trajectories for the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Invalid configuration value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Vector or matrix dimension does not match the model.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Dimension actually supplied
        actual: usize,
        /// Where the mismatch was detected
        context: String,
    },

    /// Numerical computation failed and could not be repaired locally.
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },

    /// A persisted model could not be parsed.
    #[error("Malformed model file: {reason}")]
    MalformedModel {
        /// What was wrong with the file
        reason: String,
    },

    /// A query was made before any model was trained or loaded.
    #[error("No model has been trained or loaded")]
    ModelNotTrained,

    /// I/O operation error.
    #[error("I/O operation failed: {operation}")]
    IoError {
        /// I/O operation that failed
        operation: String,
        /// Underlying error if available
        #[source]
        source: Option<Arc<std::io::Error>>,
    },
}

/// Result type for engine operations.
pub type SedsResult<T> = Result<T, SedsError>;

impl SedsError {
    /// Wraps an `std::io::Error` with the operation that produced it.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        SedsError::IoError {
            operation: operation.into(),
            source: Some(Arc::new(source)),
        }
    }

    /// Shorthand for a malformed model error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        SedsError::MalformedModel {
            reason: reason.into(),
        }
    }
}

/// Validates that a parameter is within expected bounds (inclusive).
///
/// # Example
/// ```rust
/// use stable_ds::errors::validate_parameter;
///
/// assert!(validate_parameter(0.5, 0.0, 1.0, "tolerance").is_ok());
/// assert!(validate_parameter(1.5, 0.0, 1.0, "tolerance").is_err());
/// ```
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> SedsResult<()> {
    if value.is_nan() {
        return Err(SedsError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if min.is_nan() || max.is_nan() || min > max {
        return Err(SedsError::NumericalError {
            reason: format!(
                "Invalid bounds for parameter {}: min={}, max={}",
                name, min, max
            ),
            operation: None,
        });
    }

    if value < min || value > max {
        Err(SedsError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that a count-like parameter is at least `min`.
pub fn validate_count(value: usize, min: usize, name: &str) -> SedsResult<()> {
    if value < min {
        Err(SedsError::InvalidParameter {
            parameter: name.to_string(),
            value: value as f64,
            constraint: format!(">= {}", min),
        })
    } else {
        Ok(())
    }
}

/// Validates that a value is finite and not NaN.
pub fn validate_finite(value: f64, name: &str) -> SedsResult<()> {
    if !value.is_finite() {
        Err(SedsError::NumericalError {
            reason: format!("{} is not finite: {}", name, value),
            operation: None,
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a slice are finite.
///
/// Returns immediately on the first non-finite value.
pub fn validate_all_finite(data: &[f64], name: &str) -> SedsResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        let value_desc = if value.is_nan() {
            "NaN".to_string()
        } else if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };

        return Err(SedsError::NumericalError {
            reason: format!(
                "{} contains non-finite value at index {}: {}",
                name, i, value_desc
            ),
            operation: None,
        });
    }

    Ok(())
}

/// Validates that a vector has the dimension a model expects.
pub fn validate_dimension(expected: usize, actual: usize, context: &str) -> SedsResult<()> {
    if expected != actual {
        Err(SedsError::DimensionMismatch {
            expected,
            actual,
            context: context.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validates that every row of a sample matrix has `dim` finite entries.
pub fn validate_samples(data: &[Vec<f64>], dim: usize, context: &str) -> SedsResult<()> {
    for row in data {
        validate_dimension(dim, row.len(), context)?;
        validate_all_finite(row, context)?;
    }
    Ok(())
}
