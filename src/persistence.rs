//! Model serialization and persistence
//!
//! A trained classifier is stored as JSON: the bound kernel, the class
//! list, and for every class pair its support vectors, alpha * y values
//! and bias. The scaling fitted on the training pixels can be stored
//! alongside so predictions on raw files are rescaled the same way.

use crate::api::{SvcParams, TrainedSvc};
use crate::core::{Result, SVMError, SVMModel, Sample, SparseVector};
use crate::kernel::KernelFunction;
use crate::multiclass::{OneVsOne, PairModel};
use crate::optimizer::TrainedSVM;
use crate::utils::scaling::ScalingParams;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

/// Serializable representation of a trained classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableModel {
    /// Kernel with gamma already resolved
    pub kernel: KernelFunction,
    /// Sorted class indices
    pub classes: Vec<usize>,
    /// Pixels per image
    pub n_features: usize,
    /// One entry per class pair
    pub pairs: Vec<SerializablePair>,
    /// Scaling applied to inputs before prediction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<ScalingParams>,
    /// Model metadata
    pub metadata: ModelMetadata,
}

/// Binary model separating `positive` from `negative`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializablePair {
    pub positive: usize,
    pub negative: usize,
    pub bias: f64,
    pub support_vectors: Vec<SerializableSample>,
    /// Alpha values times labels (alpha_i * y_i)
    pub alpha_y: Vec<f64>,
}

/// Serializable sample representation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SerializableSample {
    /// Feature indices
    pub indices: Vec<usize>,
    /// Feature values
    pub values: Vec<f64>,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    /// Support vectors summed over pairs
    pub n_support_vectors: usize,
    /// Training parameters used
    pub training_params: SvcParams,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl From<&SparseVector> for SerializableSample {
    fn from(features: &SparseVector) -> Self {
        Self {
            indices: features.indices.clone(),
            values: features.values.clone(),
        }
    }
}

impl SerializableSample {
    fn to_sample(&self, label: f64) -> Result<Sample> {
        if self.indices.len() != self.values.len() {
            return Err(SVMError::FormatError(format!(
                "support vector has {} indices but {} values",
                self.indices.len(),
                self.values.len()
            )));
        }
        Ok(Sample::new(
            SparseVector::new(self.indices.clone(), self.values.clone()),
            label,
        ))
    }
}

impl SerializableModel {
    /// Create a serializable model from a trained classifier
    pub fn from_trained_model(model: &TrainedSvc, scaling: Option<&ScalingParams>) -> Self {
        let pairs: Vec<SerializablePair> = model
            .inner()
            .pairs()
            .iter()
            .map(|pair| {
                let svm = &pair.model;
                SerializablePair {
                    positive: pair.positive,
                    negative: pair.negative,
                    bias: svm.bias(),
                    support_vectors: svm
                        .support_vectors()
                        .iter()
                        .map(|s| SerializableSample::from(&s.features))
                        .collect(),
                    alpha_y: svm
                        .alpha_values()
                        .iter()
                        .zip(svm.support_vectors())
                        .map(|(&alpha, sample)| alpha * sample.label)
                        .collect(),
                }
            })
            .collect();

        let info = model.info();
        Self {
            kernel: *model.kernel(),
            classes: info.classes,
            n_features: model.n_features(),
            pairs,
            scaling: scaling.cloned(),
            metadata: ModelMetadata {
                library_version: crate::VERSION.to_string(),
                n_support_vectors: info.n_support_vectors,
                training_params: model.params().clone(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(SVMError::IoError)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SVMError::IoError)?;
        let reader = BufReader::new(file);
        let model: Self = serde_json::from_reader(reader)?;
        if model.metadata.library_version != crate::VERSION {
            warn!(
                "Model was written by version {}, running {}",
                model.metadata.library_version,
                crate::VERSION
            );
        }
        Ok(model)
    }

    /// Rebuild a working classifier
    pub fn to_trained_model(&self) -> Result<TrainedSvc> {
        self.kernel.validate()?;
        let kernel = Arc::new(self.kernel);

        let pairs = self
            .pairs
            .iter()
            .map(|pair| -> Result<PairModel<KernelFunction>> {
                if pair.support_vectors.len() != pair.alpha_y.len() {
                    return Err(SVMError::DimensionMismatch {
                        expected: pair.support_vectors.len(),
                        actual: pair.alpha_y.len(),
                    });
                }
                let (support_vectors, alpha) = pair
                    .support_vectors
                    .iter()
                    .zip(&pair.alpha_y)
                    .map(|(sv, &ay)| -> Result<(Sample, f64)> {
                        let label = if ay >= 0.0 { 1.0 } else { -1.0 };
                        Ok((sv.to_sample(label)?, ay.abs()))
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .unzip();

                Ok(PairModel {
                    positive: pair.positive,
                    negative: pair.negative,
                    model: TrainedSVM::from_parts(
                        Arc::clone(&kernel),
                        support_vectors,
                        alpha,
                        pair.bias,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ensemble = OneVsOne::from_pairs(self.classes.clone(), pairs)?;
        Ok(TrainedSvc::from_parts(
            ensemble,
            self.kernel,
            self.metadata.training_params.clone(),
            self.n_features,
        ))
    }

    /// Print model summary
    pub fn print_summary(&self) {
        let params = &self.metadata.training_params;
        println!("=== SVM Model Summary ===");
        println!("Kernel: {}", self.kernel);
        println!("Classes: {:?}", self.classes);
        println!("Pairwise Models: {}", self.pairs.len());
        println!("Support Vectors: {}", self.metadata.n_support_vectors);
        println!("Features: {}", self.n_features);
        match &self.scaling {
            Some(scaling) => println!("Input Scaling: {:?}", scaling.method),
            None => println!("Input Scaling: none"),
        }
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at);
        println!("Training Parameters:");
        println!("  C: {}", params.optimizer.c);
        println!("  Gamma: {}", params.gamma);
        println!("  Epsilon: {}", params.optimizer.epsilon);
        println!("  Max Iterations: {}", params.optimizer.max_iterations);
    }
}
