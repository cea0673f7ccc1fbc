//! High-level classifier interface
//!
//! [`Svc`] is a builder over the hyperparameters; fitting it yields a
//! [`TrainedSvc`], a one-vs-one ensemble with its kernel already bound to a
//! concrete gamma.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emnist_svm::api::Svc;
//! use emnist_svm::data::CsvImageReader;
//! use emnist_svm::kernel::Gamma;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let train = CsvImageReader::default().read_file("emnist-balanced-train.csv")?;
//! let test = CsvImageReader::default().read_file("emnist-balanced-test.csv")?;
//!
//! let model = Svc::new().with_c(10.0).with_gamma(Gamma::Scale).fit(&train)?;
//! println!("Accuracy: {:.2}%", model.score(&test)? * 100.0);
//! # Ok(())
//! # }
//! ```

use crate::core::{ClassPrediction, Dataset, OptimizerConfig, Result, SVMError, Sample};
use crate::data::NON_DIGIT_CLASS;
use crate::kernel::{Gamma, KernelChoice, KernelFunction};
use crate::metrics::{ConfusionMatrix, EvaluationMetrics};
use crate::multiclass::OneVsOne;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Hyperparameters of the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvcParams {
    pub kernel: KernelChoice,
    pub gamma: Gamma,
    #[serde(flatten)]
    pub optimizer: OptimizerConfig,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            kernel: KernelChoice::Rbf,
            gamma: Gamma::Scale,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SvcParams {
    pub fn validate(&self) -> Result<()> {
        let c = self.optimizer.c;
        if !(c.is_finite() && c > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "C must be positive and finite, got {c}"
            )));
        }
        if !(self.optimizer.epsilon > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.optimizer.epsilon
            )));
        }
        if let Gamma::Value(g) = self.gamma {
            if !(g.is_finite() && g > 0.0) {
                return Err(SVMError::InvalidParameter(format!(
                    "gamma must be positive and finite, got {g}"
                )));
            }
        }
        Ok(())
    }
}

/// Support vector classifier builder
#[derive(Debug, Clone, Default)]
pub struct Svc {
    params: SvcParams,
}

impl Svc {
    /// RBF kernel, gamma = scale, C = 1
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: SvcParams) -> Self {
        Self { params }
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.params.optimizer.c = c;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelChoice) -> Self {
        self.params.kernel = kernel;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.params.gamma = gamma;
        self
    }

    /// Set convergence tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.params.optimizer.epsilon = epsilon;
        self
    }

    /// Set maximum number of passes
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.optimizer.max_iterations = max_iterations;
        self
    }

    /// Set kernel cache size in bytes (per pairwise solve)
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.params.optimizer.cache_size = cache_size;
        self
    }

    pub fn params(&self) -> &SvcParams {
        &self.params
    }

    /// Train on a dataset whose labels are class indices
    pub fn fit<D: Dataset>(&self, dataset: &D) -> Result<TrainedSvc> {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        let samples = dataset.get_batch(&indices);
        self.fit_samples(&samples, dataset.dim())
    }

    /// Train on samples with `n_features` pixels each
    pub fn fit_samples(&self, samples: &[Sample], n_features: usize) -> Result<TrainedSvc> {
        self.params.validate()?;
        if samples.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        let gamma = self.params.gamma.resolve(samples, n_features)?;
        let kernel = self.params.kernel.with_gamma(gamma)?;

        info!(
            "Fitting {} on {} samples (C={})",
            kernel,
            samples.len(),
            self.params.optimizer.c
        );
        let start = Instant::now();
        let model = OneVsOne::train(Arc::new(kernel), &self.params.optimizer, samples)?;
        info!(
            "Fit finished in {:.2?}: {} support vectors",
            start.elapsed(),
            model.n_support_vectors()
        );

        Ok(TrainedSvc {
            model,
            kernel,
            params: self.params.clone(),
            n_features,
        })
    }
}

/// Trained multiclass classifier
pub struct TrainedSvc {
    model: OneVsOne<KernelFunction>,
    kernel: KernelFunction,
    params: SvcParams,
    n_features: usize,
}

impl TrainedSvc {
    pub(crate) fn from_parts(
        model: OneVsOne<KernelFunction>,
        kernel: KernelFunction,
        params: SvcParams,
        n_features: usize,
    ) -> Self {
        Self {
            model,
            kernel,
            params,
            n_features,
        }
    }

    /// Predict a single sample
    pub fn predict(&self, sample: &Sample) -> ClassPrediction {
        self.model.predict(sample)
    }

    /// Predict the class of every sample
    pub fn predict_batch(&self, samples: &[Sample]) -> Vec<usize> {
        self.model
            .predict_batch(samples)
            .into_iter()
            .map(|p| p.class)
            .collect()
    }

    /// Predict from dataset
    pub fn predict_dataset<D: Dataset>(&self, dataset: &D) -> Vec<usize> {
        let indices: Vec<usize> = (0..dataset.len()).collect();
        self.predict_batch(&dataset.get_batch(&indices))
    }

    /// Mean accuracy on a labeled dataset
    pub fn score<D: Dataset>(&self, dataset: &D) -> Result<f64> {
        Ok(self.confusion_matrix(dataset)?.accuracy())
    }

    /// Confusion matrix over the model's classes and those in `dataset`
    pub fn confusion_matrix<D: Dataset>(&self, dataset: &D) -> Result<ConfusionMatrix> {
        if dataset.is_empty() {
            return Err(SVMError::EmptyDataset);
        }
        if dataset.dim() != self.n_features {
            return Err(SVMError::DimensionMismatch {
                expected: self.n_features,
                actual: dataset.dim(),
            });
        }

        let y_true: Vec<usize> = dataset
            .get_labels()
            .into_iter()
            .map(|l| l.round().max(0.0) as usize)
            .collect();
        let y_pred = self.predict_dataset(dataset);

        let classes: Vec<usize> = self
            .model
            .classes()
            .iter()
            .chain(y_true.iter())
            .copied()
            .collect();
        ConfusionMatrix::with_classes(&classes, &y_true, &y_pred)
    }

    /// Digit (positive) vs non-digit (negative) detection metrics
    pub fn evaluate_detailed<D: Dataset>(&self, dataset: &D) -> Result<EvaluationMetrics> {
        Ok(self
            .confusion_matrix(dataset)?
            .to_binary(|c| c < NON_DIGIT_CLASS))
    }

    /// Get model information
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            kernel: self.kernel,
            classes: self.model.classes().to_vec(),
            n_pairs: self.model.pairs().len(),
            n_support_vectors: self.model.n_support_vectors(),
            n_features: self.n_features,
        }
    }

    pub fn kernel(&self) -> &KernelFunction {
        &self.kernel
    }

    pub fn params(&self) -> &SvcParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Get the underlying pairwise ensemble
    pub fn inner(&self) -> &OneVsOne<KernelFunction> {
        &self.model
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub kernel: KernelFunction,
    pub classes: Vec<usize>,
    pub n_pairs: usize,
    /// Summed over pairs; a sample can count once per pair it supports
    pub n_support_vectors: usize,
    pub n_features: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use crate::data::ImageDataset;

    fn blobs() -> ImageDataset {
        let mut samples = Vec::new();
        for (class, (x, y)) in [(0, (0.0, 0.0)), (7, (4.0, 0.0)), (10, (0.0, 4.0))] {
            for (dx, dy) in [(0.0, 0.0), (0.3, 0.1), (-0.2, 0.2), (0.1, -0.3)] {
                samples.push(Sample::with_class(
                    SparseVector::from_dense(&[x + dx + 1.0, y + dy + 1.0]),
                    class,
                ));
            }
        }
        ImageDataset::new(samples, 2).unwrap()
    }

    #[test]
    fn test_svc_builder_pattern() {
        let svc = Svc::new()
            .with_c(2.0)
            .with_epsilon(0.01)
            .with_max_iterations(5000)
            .with_kernel(KernelChoice::Linear)
            .with_gamma(Gamma::Auto);

        assert_eq!(svc.params().optimizer.c, 2.0);
        assert_eq!(svc.params().optimizer.epsilon, 0.01);
        assert_eq!(svc.params().optimizer.max_iterations, 5000);
        assert_eq!(svc.params().kernel, KernelChoice::Linear);
        assert_eq!(svc.params().gamma, Gamma::Auto);
    }

    #[test]
    fn test_fit_predict_and_score() {
        let data = blobs();
        let model = Svc::new()
            .with_c(10.0)
            .with_gamma(Gamma::Value(0.5))
            .fit(&data)
            .expect("training should succeed");

        assert_eq!(model.predict_dataset(&data), data.classes_per_sample());
        assert_eq!(model.score(&data).unwrap(), 1.0);

        let info = model.info();
        assert_eq!(info.classes, vec![0, 7, 10]);
        assert_eq!(info.n_pairs, 3);
        assert_eq!(info.kernel, KernelFunction::Rbf { gamma: 0.5 });
        assert!(info.n_support_vectors > 0);
    }

    #[test]
    fn test_evaluate_detailed_groups_digits() {
        let data = blobs();
        let model = Svc::new().with_gamma(Gamma::Value(0.5)).with_c(10.0).fit(&data).unwrap();
        let metrics = model.evaluate_detailed(&data).unwrap();
        assert_eq!(metrics.true_positives, 8);
        assert_eq!(metrics.true_negatives, 4);
        assert_eq!(metrics.accuracy(), 1.0);
    }

    #[test]
    fn test_invalid_params() {
        let data = blobs();
        assert!(matches!(
            Svc::new().with_c(0.0).fit(&data),
            Err(SVMError::InvalidParameter(_))
        ));
        assert!(matches!(
            Svc::new().with_gamma(Gamma::Value(-1.0)).fit(&data),
            Err(SVMError::InvalidParameter(_))
        ));
        let empty = ImageDataset::new(vec![], 2).unwrap();
        assert!(matches!(Svc::new().fit(&empty), Err(SVMError::EmptyDataset)));
    }

    #[test]
    fn test_params_serde_defaults() {
        let params: SvcParams = serde_json::from_str(r#"{"c": 5.0, "gamma": 0.01}"#).unwrap();
        assert_eq!(params.optimizer.c, 5.0);
        assert_eq!(params.gamma, Gamma::Value(0.01));
        assert_eq!(params.kernel, KernelChoice::Rbf);
        assert_eq!(params.optimizer.epsilon, OptimizerConfig::default().epsilon);
    }
}
