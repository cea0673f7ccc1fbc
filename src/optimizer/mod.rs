//! Binary SVM training
//!
//! Ties a kernel to the SMO solver and keeps only the support vectors of
//! the solution for prediction.

use crate::core::{
    Dataset, OptimizationResult, OptimizerConfig, Prediction, Result, SVMError, SVMModel, Sample,
};
use crate::kernel::Kernel;
use crate::solver::SMOSolver;
use std::sync::Arc;

/// Binary SVM optimizer that integrates a kernel with the SMO solver
pub struct SVMOptimizer<K: Kernel> {
    kernel: Arc<K>,
    config: OptimizerConfig,
}

impl<K: Kernel> SVMOptimizer<K> {
    /// Create a new SVM optimizer with the given kernel and configuration
    pub fn new(kernel: K, config: OptimizerConfig) -> Self {
        Self::with_shared_kernel(Arc::new(kernel), config)
    }

    /// Create an optimizer that shares its kernel with other models
    pub fn with_shared_kernel(kernel: Arc<K>, config: OptimizerConfig) -> Self {
        Self { kernel, config }
    }

    /// Create a new SVM optimizer with default configuration
    pub fn with_kernel(kernel: K) -> Self {
        Self::new(kernel, OptimizerConfig::default())
    }

    /// Train on a dataset whose labels are +1 / -1
    pub fn train<D: Dataset>(&self, dataset: &D) -> Result<TrainedSVM<K>> {
        let samples: Vec<Sample> = (0..dataset.len()).map(|i| dataset.get_sample(i)).collect();
        self.train_samples(&samples)
    }

    /// Train on a slice of samples whose labels are +1 / -1
    pub fn train_samples(&self, samples: &[Sample]) -> Result<TrainedSVM<K>> {
        let solver = SMOSolver::new(Arc::clone(&self.kernel), self.config.clone());
        let result = solver.solve(samples)?;

        Ok(TrainedSVM::new(Arc::clone(&self.kernel), samples, result))
    }

    /// Get the optimizer configuration
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

/// A trained binary SVM
pub struct TrainedSVM<K: Kernel> {
    kernel: Arc<K>,
    support_vectors: Vec<Sample>,
    sv_norms: Vec<f64>,
    alpha: Vec<f64>,
    bias: f64,
    support_indices: Vec<usize>,
    iterations: usize,
}

impl<K: Kernel> TrainedSVM<K> {
    pub(crate) fn new(
        kernel: Arc<K>,
        training_samples: &[Sample],
        optimization_result: OptimizationResult,
    ) -> Self {
        let support_vectors: Vec<Sample> = optimization_result
            .support_vectors
            .iter()
            .map(|&i| training_samples[i].clone())
            .collect();
        let alpha = optimization_result
            .support_vectors
            .iter()
            .map(|&i| optimization_result.alpha[i])
            .collect();

        Self {
            kernel,
            sv_norms: support_vectors
                .iter()
                .map(|s| s.features.norm_squared())
                .collect(),
            support_vectors,
            alpha,
            bias: optimization_result.b,
            support_indices: optimization_result.support_vectors,
            iterations: optimization_result.iterations,
        }
    }

    /// Rebuild a model from stored support vectors (labels +1 / -1)
    pub fn from_parts(
        kernel: Arc<K>,
        support_vectors: Vec<Sample>,
        alpha: Vec<f64>,
        bias: f64,
    ) -> Result<Self> {
        if support_vectors.len() != alpha.len() {
            return Err(SVMError::DimensionMismatch {
                expected: support_vectors.len(),
                actual: alpha.len(),
            });
        }
        if let Some(bad) = support_vectors
            .iter()
            .find(|s| s.label != 1.0 && s.label != -1.0)
        {
            return Err(SVMError::InvalidLabel(bad.label));
        }

        Ok(Self {
            kernel,
            sv_norms: support_vectors
                .iter()
                .map(|s| s.features.norm_squared())
                .collect(),
            support_indices: (0..support_vectors.len()).collect(),
            support_vectors,
            alpha,
            bias,
            iterations: 0,
        })
    }

    /// Decision function value f(x) = sum_i alpha_i y_i K(x_i, x) + b
    pub fn decision_function(&self, sample: &Sample) -> f64 {
        let x_norm = sample.features.norm_squared();

        self.support_vectors
            .iter()
            .zip(self.alpha.iter().zip(self.sv_norms.iter()))
            .map(|(sv, (&alpha, &sv_norm))| {
                alpha
                    * sv.label
                    * self
                        .kernel
                        .compute_with_norms(&sample.features, &sv.features, x_norm, sv_norm)
            })
            .sum::<f64>()
            + self.bias
    }

    /// Get the support vectors
    pub fn support_vectors(&self) -> &[Sample] {
        &self.support_vectors
    }

    /// Get the alpha values for support vectors
    pub fn alpha_values(&self) -> &[f64] {
        &self.alpha
    }

    /// Get the indices of support vectors in the training set
    pub fn support_vector_indices(&self) -> &[usize] {
        &self.support_indices
    }

    /// Passes the solver needed (0 for reloaded models)
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }
}

impl<K: Kernel> SVMModel for TrainedSVM<K> {
    fn predict(&self, sample: &Sample) -> Prediction {
        let decision_value = self.decision_function(sample);
        let label = if decision_value >= 0.0 { 1.0 } else { -1.0 };
        Prediction::new(label, decision_value)
    }

    fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    fn bias(&self) -> f64 {
        self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use crate::kernel::LinearKernel;

    fn separable() -> Vec<Sample> {
        vec![
            Sample::new(SparseVector::new(vec![0], vec![2.0]), 1.0),
            Sample::new(SparseVector::new(vec![0], vec![-2.0]), -1.0),
            Sample::new(SparseVector::new(vec![0], vec![1.5]), 1.0),
            Sample::new(SparseVector::new(vec![0], vec![-1.5]), -1.0),
        ]
    }

    #[test]
    fn test_svm_optimizer_with_kernel() {
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());
        assert_eq!(optimizer.config().c, 1.0);
        assert_eq!(optimizer.config().epsilon, 0.001);
    }

    #[test]
    fn test_svm_training_simple_case() {
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());
        let samples = separable();

        let model = optimizer
            .train_samples(&samples)
            .expect("Training should succeed");

        assert!(model.n_support_vectors() > 0);
        assert_eq!(model.alpha_values().len(), model.support_vectors().len());
        assert!(model.iterations() > 0);

        for sample in &samples {
            assert_eq!(model.predict(sample).label, sample.label);
        }
    }

    #[test]
    fn test_support_vector_access() {
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());
        let samples = separable();
        let model = optimizer
            .train_samples(&samples)
            .expect("Training should succeed");

        assert_eq!(
            model.support_vectors().len(),
            model.support_vector_indices().len()
        );
        assert!(model.alpha_values().iter().all(|&a| a > 0.0));
        assert!(model
            .support_vector_indices()
            .iter()
            .all(|&i| i < samples.len()));
    }

    #[test]
    fn test_from_parts_matches_trained_model() {
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());
        let samples = separable();
        let model = optimizer.train_samples(&samples).unwrap();

        let rebuilt = TrainedSVM::from_parts(
            Arc::new(LinearKernel::new()),
            model.support_vectors().to_vec(),
            model.alpha_values().to_vec(),
            model.bias(),
        )
        .unwrap();

        let probe = Sample::new(SparseVector::new(vec![0], vec![0.3]), 1.0);
        assert!((rebuilt.decision_function(&probe) - model.decision_function(&probe)).abs() < 1e-12);
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let sv = vec![Sample::new(SparseVector::empty(), 1.0)];
        let result = TrainedSVM::from_parts(Arc::new(LinearKernel::new()), sv, vec![], 0.0);
        assert!(matches!(result, Err(SVMError::DimensionMismatch { .. })));
    }
}
