//! Runtime-selected kernels
//!
//! The classifier picks its kernel from configuration, so the concrete
//! kernels are wrapped in a serializable enum. Gamma may be left symbolic
//! (`scale` / `auto`) and resolved against the training data at fit time.

use crate::core::{Result, SVMError, Sample, SparseVector};
use crate::kernel::{Kernel, LinearKernel, PolynomialKernel, RBFKernel};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kernel family chosen by the user; gamma is supplied separately
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelChoice {
    Linear,
    Rbf,
    Polynomial { degree: u32, coef0: f64 },
}

impl Default for KernelChoice {
    fn default() -> Self {
        Self::Rbf
    }
}

impl KernelChoice {
    /// Bind a concrete gamma, producing an evaluable kernel
    pub fn with_gamma(self, gamma: f64) -> Result<KernelFunction> {
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "gamma must be positive and finite, got {gamma}"
            )));
        }
        Ok(match self {
            KernelChoice::Linear => KernelFunction::Linear,
            KernelChoice::Rbf => KernelFunction::Rbf { gamma },
            KernelChoice::Polynomial { degree, coef0 } => {
                if degree == 0 {
                    return Err(SVMError::InvalidParameter(
                        "polynomial degree must be positive".to_string(),
                    ));
                }
                KernelFunction::Polynomial {
                    degree,
                    gamma,
                    coef0,
                }
            }
        })
    }
}

/// Fully specified kernel, stored with trained models
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelFunction {
    Linear,
    Rbf { gamma: f64 },
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
}

impl KernelFunction {
    /// Short name used in logs and model files
    pub fn name(&self) -> &'static str {
        match self {
            KernelFunction::Linear => "linear",
            KernelFunction::Rbf { .. } => "rbf",
            KernelFunction::Polynomial { .. } => "polynomial",
        }
    }

    /// Gamma of the kernel, if it has one
    pub fn gamma(&self) -> Option<f64> {
        match *self {
            KernelFunction::Linear => None,
            KernelFunction::Rbf { gamma } | KernelFunction::Polynomial { gamma, .. } => Some(gamma),
        }
    }

    /// Check parameters read back from a model file
    pub fn validate(&self) -> Result<()> {
        match *self {
            KernelFunction::Linear => Ok(()),
            KernelFunction::Rbf { gamma } => KernelChoice::Rbf.with_gamma(gamma).map(|_| ()),
            KernelFunction::Polynomial {
                degree,
                gamma,
                coef0,
            } => KernelChoice::Polynomial { degree, coef0 }
                .with_gamma(gamma)
                .map(|_| ()),
        }
    }
}

impl Kernel for KernelFunction {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        match *self {
            KernelFunction::Linear => LinearKernel.compute(x, y),
            KernelFunction::Rbf { gamma } => RBFKernel::new(gamma).compute(x, y),
            KernelFunction::Polynomial {
                degree,
                gamma,
                coef0,
            } => PolynomialKernel::new(degree, gamma, coef0).compute(x, y),
        }
    }

    fn compute_with_norms(
        &self,
        x: &SparseVector,
        y: &SparseVector,
        x_norm_sq: f64,
        y_norm_sq: f64,
    ) -> f64 {
        match *self {
            KernelFunction::Rbf { gamma } => {
                RBFKernel::new(gamma).compute_with_norms(x, y, x_norm_sq, y_norm_sq)
            }
            _ => self.compute(x, y),
        }
    }
}

impl fmt::Display for KernelFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            KernelFunction::Linear => write!(f, "linear"),
            KernelFunction::Rbf { gamma } => write!(f, "rbf(gamma={gamma})"),
            KernelFunction::Polynomial {
                degree,
                gamma,
                coef0,
            } => write!(f, "polynomial(degree={degree}, gamma={gamma}, coef0={coef0})"),
        }
    }
}

/// Kernel coefficient, possibly derived from the training data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GammaRepr", into = "GammaRepr")]
pub enum Gamma {
    /// 1 / (n_features * Var(X)), variance taken over every pixel of every sample
    Scale,
    /// 1 / n_features
    Auto,
    /// Fixed value
    Value(f64),
}

impl Default for Gamma {
    fn default() -> Self {
        Self::Scale
    }
}

impl Gamma {
    /// Resolve to a concrete value for the given training samples
    pub fn resolve(&self, samples: &[Sample], n_features: usize) -> Result<f64> {
        match *self {
            Gamma::Value(g) => {
                if g.is_finite() && g > 0.0 {
                    Ok(g)
                } else {
                    Err(SVMError::InvalidParameter(format!(
                        "gamma must be positive and finite, got {g}"
                    )))
                }
            }
            _ if n_features == 0 => Err(SVMError::InvalidDataset(
                "cannot derive gamma for zero features".to_string(),
            )),
            Gamma::Auto => Ok(1.0 / n_features as f64),
            Gamma::Scale => {
                let variance = feature_variance(samples, n_features);
                if variance > 0.0 {
                    Ok(1.0 / (n_features as f64 * variance))
                } else {
                    Ok(1.0)
                }
            }
        }
    }
}

/// Variance of all entries of the (dense) sample matrix
fn feature_variance(samples: &[Sample], n_features: usize) -> f64 {
    let count = (samples.len() * n_features) as f64;
    if count == 0.0 {
        return 0.0;
    }
    let (sum, sum_sq) = samples
        .iter()
        .flat_map(|s| s.features.values.iter())
        .fold((0.0, 0.0), |(s, sq), &v| (s + v, sq + v * v));
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

impl FromStr for Gamma {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scale" => Ok(Gamma::Scale),
            "auto" => Ok(Gamma::Auto),
            other => other
                .parse::<f64>()
                .map(Gamma::Value)
                .map_err(|_| SVMError::ParseError(format!("Invalid gamma: {s}"))),
        }
    }
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gamma::Scale => write!(f, "scale"),
            Gamma::Auto => write!(f, "auto"),
            Gamma::Value(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GammaRepr {
    Value(f64),
    Name(String),
}

impl TryFrom<GammaRepr> for Gamma {
    type Error = SVMError;

    fn try_from(repr: GammaRepr) -> Result<Self> {
        match repr {
            GammaRepr::Value(v) => Ok(Gamma::Value(v)),
            GammaRepr::Name(name) => name.parse(),
        }
    }
}

impl From<Gamma> for GammaRepr {
    fn from(gamma: Gamma) -> Self {
        match gamma {
            Gamma::Value(v) => GammaRepr::Value(v),
            other => GammaRepr::Name(other.to_string()),
        }
    }
}
