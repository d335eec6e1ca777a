//! Whitespace-separated text format for trained mixtures.
//!
//! ```text
//! <dim> <output_dim> <n_components>
//! <prior_0> ... <prior_{K-1}>
//! <mean_0 over dim>
//! ...
//! <covariance_0 as dim rows of dim values>
//! ...
//! [<endpoint over dim - output_dim>]
//! ```
//!
//! Presence of the endpoint is decided by the number of trailing tokens.

use crate::errors::{SedsError, SedsResult};
use crate::gaussian::Gaussian;
use crate::mixture_model::Gmm;
use crate::symmetric_matrix::SymmetricMatrix;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// A mixture with its regression split and optional attractor.
#[derive(Debug, Clone)]
pub struct StoredModel {
    /// Joint mixture
    pub gmm: Gmm,
    /// Number of trailing output dimensions
    pub output_dim: usize,
    /// Attractor over the input dimensions
    pub endpoint: Option<Vec<f64>>,
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders `gmm` in the text format.
pub fn write_model(gmm: &Gmm, output_dim: usize, endpoint: Option<&[f64]>) -> SedsResult<String> {
    let dim = gmm.dim();
    if output_dim > dim {
        return Err(SedsError::DimensionMismatch {
            expected: dim,
            actual: output_dim,
            context: "output dimension of stored model".to_string(),
        });
    }
    if let Some(e) = endpoint {
        crate::errors::validate_dimension(dim - output_dim, e.len(), "stored endpoint")?;
    }

    let mut out = String::new();
    push_line(&mut out, format_args!("{} {} {}", dim, output_dim, gmm.n_states()))?;
    push_line(&mut out, format_args!("{}", join(&gmm.priors())))?;
    for g in gmm.components() {
        push_line(&mut out, format_args!("{}", join(g.mean())))?;
    }
    for g in gmm.components() {
        for row in g.covariance().to_full() {
            push_line(&mut out, format_args!("{}", join(&row)))?;
        }
    }
    if let Some(e) = endpoint {
        push_line(&mut out, format_args!("{}", join(e)))?;
    }
    Ok(out)
}

fn push_line(out: &mut String, line: std::fmt::Arguments<'_>) -> SedsResult<()> {
    writeln!(out, "{}", line).map_err(|_| SedsError::IoError {
        operation: "format model text".to_string(),
        source: None,
    })
}

struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn count(&mut self, what: &str) -> SedsResult<usize> {
        let token = self
            .inner
            .next()
            .ok_or_else(|| SedsError::malformed(format!("missing {}", what)))?;
        token
            .parse()
            .map_err(|_| SedsError::malformed(format!("invalid {} '{}'", what, token)))
    }

    fn value(&mut self, what: &str) -> SedsResult<f64> {
        let token = self
            .inner
            .next()
            .ok_or_else(|| SedsError::malformed(format!("truncated {}", what)))?;
        let v: f64 = token
            .parse()
            .map_err(|_| SedsError::malformed(format!("invalid {} value '{}'", what, token)))?;
        if !v.is_finite() {
            return Err(SedsError::malformed(format!("non-finite {} value", what)));
        }
        Ok(v)
    }

    fn values(&mut self, n: usize, what: &str) -> SedsResult<Vec<f64>> {
        (0..n).map(|_| self.value(what)).collect()
    }
}

/// Parses the text format.
pub fn read_model(text: &str) -> SedsResult<StoredModel> {
    let mut tokens = Tokens {
        inner: text.split_whitespace(),
    };
    let dim = tokens.count("dimension")?;
    let output_dim = tokens.count("output dimension")?;
    let n_components = tokens.count("component count")?;
    if dim == 0 || n_components == 0 || output_dim > dim {
        return Err(SedsError::malformed(format!(
            "invalid header {} {} {}",
            dim, output_dim, n_components
        )));
    }

    let priors = tokens.values(n_components, "prior")?;
    if priors.iter().any(|p| *p < 0.0) {
        return Err(SedsError::malformed("negative prior"));
    }
    let means: Vec<Vec<f64>> = (0..n_components)
        .map(|_| tokens.values(dim, "mean"))
        .collect::<SedsResult<_>>()?;
    let mut components = Vec::with_capacity(n_components);
    for (prior, mean) in priors.into_iter().zip(means) {
        let rows: Vec<Vec<f64>> = (0..dim)
            .map(|_| tokens.values(dim, "covariance"))
            .collect::<SedsResult<_>>()?;
        components.push(Gaussian::from_parts(prior, mean, SymmetricMatrix::from_full(&rows)));
    }

    let rest: Vec<&str> = tokens.inner.collect();
    let endpoint = match rest.len() {
        0 => None,
        n if n == dim - output_dim => {
            let parsed = rest
                .iter()
                .map(|t| {
                    t.parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| SedsError::malformed(format!("invalid endpoint value '{}'", t)))
                })
                .collect::<SedsResult<Vec<f64>>>()?;
            Some(parsed)
        }
        n => {
            return Err(SedsError::malformed(format!(
                "{} trailing tokens, expected 0 or {}",
                n,
                dim - output_dim
            )))
        }
    };

    Ok(StoredModel {
        gmm: Gmm::from_components(components)?,
        output_dim,
        endpoint,
    })
}

/// Writes the model to `path`.
pub fn save(path: impl AsRef<Path>, gmm: &Gmm, output_dim: usize, endpoint: Option<&[f64]>) -> SedsResult<()> {
    let text = write_model(gmm, output_dim, endpoint)?;
    fs::write(path.as_ref(), text).map_err(|e| SedsError::io("write model", e))
}

/// Reads a model from `path`.
pub fn load(path: impl AsRef<Path>) -> SedsResult<StoredModel> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| SedsError::io("read model", e))?;
    read_model(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Gmm {
        let a = Gaussian::from_parts(
            0.25,
            vec![0.1, -0.2],
            SymmetricMatrix::from_full(&[vec![1.0, 0.3], vec![0.3, 2.0]]),
        );
        let b = Gaussian::from_parts(
            0.75,
            vec![1.0 / 3.0, 4.0],
            SymmetricMatrix::from_full(&[vec![0.5, 0.0], vec![0.0, 0.5]]),
        );
        Gmm::from_components(vec![a, b]).unwrap()
    }

    #[test]
    fn test_round_trip_exact() {
        let gmm = model();
        let text = write_model(&gmm, 1, Some(&[0.5])).unwrap();
        let stored = read_model(&text).unwrap();
        assert_eq!(stored.output_dim, 1);
        assert_eq!(stored.endpoint, Some(vec![0.5]));
        for k in 0..2 {
            assert_eq!(stored.gmm.component(k).mean(), gmm.component(k).mean());
            assert_eq!(
                stored.gmm.component(k).covariance().as_packed(),
                gmm.component(k).covariance().as_packed()
            );
        }
        assert_eq!(stored.gmm.priors()[1], 0.75);
    }

    #[test]
    fn test_endpoint_optional() {
        let text = write_model(&model(), 1, None).unwrap();
        assert!(read_model(&text).unwrap().endpoint.is_none());
    }

    #[test]
    fn test_header_layout() {
        let text = write_model(&model(), 1, None).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, "2 1 2");
        assert_eq!(text.lines().count(), 1 + 1 + 2 + 4);
    }

    #[test]
    fn test_writer_emits_one_line_per_row() {
        let gmm = model();
        let with_endpoint = write_model(&gmm, 1, Some(&[0.5])).unwrap();
        // header, priors, 2 means, 2 × 2 covariance rows, endpoint
        assert_eq!(with_endpoint.lines().count(), 1 + 1 + 2 + 4 + 1);
        assert!(with_endpoint.ends_with('\n'));
        let without = write_model(&gmm, 1, None).unwrap();
        assert_eq!(without.lines().count(), 8);
        assert!(matches!(
            write_model(&gmm, 1, Some(&[0.5, 1.0])),
            Err(SedsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let good = write_model(&model(), 1, Some(&[0.5])).unwrap();
        let cases = [
            String::new(),
            "2 1".to_string(),
            "0 0 1".to_string(),
            "2 3 1".to_string(),
            good.replace("0.25", "abc"),
            format!("{} 7", good),
            good[..good.len() / 2].to_string(),
        ];
        for case in &cases {
            assert!(
                matches!(read_model(case), Err(SedsError::MalformedModel { .. })),
                "accepted {:?}",
                case
            );
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load("/nonexistent/dir/model.txt"),
            Err(SedsError::IoError { .. })
        ));
    }
}
