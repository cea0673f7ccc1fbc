//! Core type definitions

use serde::{Deserialize, Serialize};

/// Binary prediction containing label and decision value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label (+1 or -1)
    pub label: f64,
    /// Raw decision function value
    pub decision_value: f64,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: f64, decision_value: f64) -> Self {
        Self {
            label,
            decision_value,
        }
    }

    /// Get confidence as absolute value of decision value
    pub fn confidence(&self) -> f64 {
        self.decision_value.abs()
    }
}

/// Multiclass prediction produced by pairwise voting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPrediction {
    /// Winning class index
    pub class: usize,
    /// Number of pairwise classifiers that voted for `class`
    pub votes: usize,
}

impl ClassPrediction {
    pub fn new(class: usize, votes: usize) -> Self {
        Self { class, votes }
    }
}

/// Sparse vector representation with sorted indices
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from a dense slice, dropping zero entries (blank pixels)
    pub fn from_dense(dense: &[f64]) -> Self {
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (i, &v) in dense.iter().enumerate() {
            if v != 0.0 {
                indices.push(i);
                values.push(v);
            }
        }
        Self { indices, values }
    }

    /// Expand into a dense vector of length `dim`
    ///
    /// Indices at or beyond `dim` are ignored.
    pub fn to_dense(&self, dim: usize) -> Vec<f64> {
        let mut dense = vec![0.0; dim];
        for (&i, &v) in self.indices.iter().zip(self.values.iter()) {
            if i < dim {
                dense[i] = v;
            }
        }
        dense
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Compute L2 norm
    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Labeled image with sparse pixel features
///
/// For multiclass data `label` carries the class index; binary
/// sub-problems relabel to +1 / -1.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Feature vector (sparse representation)
    pub features: SparseVector,
    /// Class label
    pub label: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(features: SparseVector, label: f64) -> Self {
        Self { features, label }
    }

    /// Create a sample labeled with a class index
    pub fn with_class(features: SparseVector, class: usize) -> Self {
        Self::new(features, class as f64)
    }

    /// Class index carried in the label
    pub fn class_index(&self) -> usize {
        self.label.round().max(0.0) as usize
    }
}

/// Result of optimization process
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Lagrange multipliers (alpha values)
    pub alpha: Vec<f64>,
    /// Bias term (b)
    pub b: f64,
    /// Indices of support vectors (where alpha > 0)
    pub support_vectors: Vec<usize>,
    /// Number of passes performed
    pub iterations: usize,
    /// Final dual objective value
    pub objective_value: f64,
}

/// Configuration for the SMO optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Tolerance for KKT conditions
    pub epsilon: f64,
    /// Maximum number of passes over the training set
    pub max_iterations: usize,
    /// Kernel cache size in bytes
    pub cache_size: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.001,
            max_iterations: 10000,
            cache_size: 100_000_000, // 100MB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_vector_creation() {
        let indices = vec![2, 0, 4];
        let values = vec![2.0, 1.0, 3.0];
        let sv = SparseVector::new(indices, values);

        assert_eq!(sv.indices, vec![0, 2, 4]);
        assert_eq!(sv.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sparse_vector_get() {
        let sv = SparseVector::new(vec![1, 3, 5], vec![1.0, 2.0, 3.0]);

        assert_eq!(sv.get(0), 0.0);
        assert_eq!(sv.get(1), 1.0);
        assert_eq!(sv.get(3), 2.0);
        assert_eq!(sv.get(5), 3.0);
        assert_eq!(sv.get(6), 0.0);
    }

    #[test]
    fn test_sparse_vector_norm() {
        let sv = SparseVector::new(vec![0, 1], vec![3.0, 4.0]);
        assert_eq!(sv.norm_squared(), 25.0);
        assert_eq!(sv.norm(), 5.0);
    }

    #[test]
    fn test_from_dense_drops_blank_pixels() {
        let sv = SparseVector::from_dense(&[0.0, 12.0, 0.0, 0.0, 255.0]);
        assert_eq!(sv.indices, vec![1, 4]);
        assert_eq!(sv.values, vec![12.0, 255.0]);
        assert_eq!(sv.to_dense(5), vec![0.0, 12.0, 0.0, 0.0, 255.0]);
    }

    #[test]
    fn test_to_dense_truncates() {
        let sv = SparseVector::new(vec![0, 7], vec![1.0, 2.0]);
        assert_eq!(sv.to_dense(3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_prediction() {
        let pred = Prediction::new(1.0, 2.5);
        assert_eq!(pred.label, 1.0);
        assert_eq!(pred.confidence(), 2.5);

        let neg_pred = Prediction::new(-1.0, -1.8);
        assert_eq!(neg_pred.confidence(), 1.8);
    }

    #[test]
    fn test_sample_class_index() {
        let sample = Sample::with_class(SparseVector::empty(), 10);
        assert_eq!(sample.label, 10.0);
        assert_eq!(sample.class_index(), 10);
    }

    #[test]
    fn test_optimizer_config_default() {
        let config = OptimizerConfig::default();
        assert_eq!(config.c, 1.0);
        assert_eq!(config.epsilon, 0.001);
        assert_eq!(config.max_iterations, 10000);
        assert_eq!(config.cache_size, 100_000_000);
    }

    #[test]
    fn test_optimizer_config_partial_json() {
        let config: OptimizerConfig = serde_json::from_str(r#"{"c": 10.0}"#).unwrap();
        assert_eq!(config.c, 10.0);
        assert_eq!(config.epsilon, 0.001);
    }

    #[test]
    #[should_panic(expected = "Indices and values must have same length")]
    fn test_sparse_vector_length_mismatch() {
        SparseVector::new(vec![0, 1], vec![1.0, 2.0, 3.0]);
    }
}
