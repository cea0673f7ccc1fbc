//! One-vs-one multiclass reduction
//!
//! One binary SVM is trained for every unordered pair of classes. A sample
//! is assigned to the class that wins the most pairwise contests; ties go
//! to the smaller class index.

use crate::core::{ClassPrediction, OptimizerConfig, Result, SVMError, SVMModel, Sample};
use crate::kernel::Kernel;
use crate::optimizer::{SVMOptimizer, TrainedSVM};
use log::{debug, info};
use rayon::prelude::*;
use std::sync::Arc;

/// Binary classifier separating `positive` (+1) from `negative` (-1)
pub struct PairModel<K: Kernel> {
    pub positive: usize,
    pub negative: usize,
    pub model: TrainedSVM<K>,
}

/// One-vs-one ensemble of binary SVMs
pub struct OneVsOne<K: Kernel> {
    classes: Vec<usize>,
    pairs: Vec<PairModel<K>>,
}

impl<K: Kernel> OneVsOne<K> {
    /// Train one binary model per class pair, in parallel
    ///
    /// Sample labels are class indices.
    pub fn train(kernel: Arc<K>, config: &OptimizerConfig, samples: &[Sample]) -> Result<Self> {
        if samples.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        let mut classes: Vec<usize> = samples.iter().map(Sample::class_index).collect();
        classes.sort_unstable();
        classes.dedup();

        if classes.len() < 2 {
            return Err(SVMError::InvalidDataset(format!(
                "need at least two classes, found {}",
                classes.len()
            )));
        }

        let pair_ids: Vec<(usize, usize)> = classes
            .iter()
            .enumerate()
            .flat_map(|(i, &a)| classes[i + 1..].iter().map(move |&b| (a, b)))
            .collect();

        info!(
            "Training {} pairwise classifiers over {} classes ({} samples)",
            pair_ids.len(),
            classes.len(),
            samples.len()
        );

        let pairs = pair_ids
            .par_iter()
            .map(|&(positive, negative)| -> Result<PairModel<K>> {
                let subset: Vec<Sample> = samples
                    .iter()
                    .filter_map(|s| match s.class_index() {
                        c if c == positive => Some(Sample::new(s.features.clone(), 1.0)),
                        c if c == negative => Some(Sample::new(s.features.clone(), -1.0)),
                        _ => None,
                    })
                    .collect();

                let optimizer = SVMOptimizer::with_shared_kernel(Arc::clone(&kernel), config.clone());
                let model = optimizer.train_samples(&subset)?;
                debug!(
                    "pair ({positive}, {negative}): {} samples, {} support vectors",
                    subset.len(),
                    model.n_support_vectors()
                );

                Ok(PairModel {
                    positive,
                    negative,
                    model,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { classes, pairs })
    }

    /// Assemble an ensemble from previously trained pair models
    pub fn from_pairs(classes: Vec<usize>, pairs: Vec<PairModel<K>>) -> Result<Self> {
        if classes.len() < 2 {
            return Err(SVMError::InvalidDataset(
                "model needs at least two classes".to_string(),
            ));
        }
        let expected = classes.len() * (classes.len() - 1) / 2;
        if pairs.len() != expected {
            return Err(SVMError::DimensionMismatch {
                expected,
                actual: pairs.len(),
            });
        }
        for pair in &pairs {
            if !classes.contains(&pair.positive) || !classes.contains(&pair.negative) {
                return Err(SVMError::InvalidDataset(format!(
                    "pair ({}, {}) refers to an unknown class",
                    pair.positive, pair.negative
                )));
            }
        }
        Ok(Self { classes, pairs })
    }

    /// Predict by majority vote
    pub fn predict(&self, sample: &Sample) -> ClassPrediction {
        let mut votes = vec![0usize; self.classes.len()];

        for pair in &self.pairs {
            let winner = if pair.model.decision_function(sample) >= 0.0 {
                pair.positive
            } else {
                pair.negative
            };
            if let Some(pos) = self.classes.iter().position(|&c| c == winner) {
                votes[pos] += 1;
            }
        }

        // Classes are sorted, so the first maximum is the smallest index
        let mut best = 0;
        for (pos, &count) in votes.iter().enumerate() {
            if count > votes[best] {
                best = pos;
            }
        }

        ClassPrediction::new(self.classes[best], votes[best])
    }

    /// Predict many samples in parallel
    pub fn predict_batch(&self, samples: &[Sample]) -> Vec<ClassPrediction> {
        samples.par_iter().map(|s| self.predict(s)).collect()
    }

    /// Classes seen during training, sorted
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Pairwise models in training order
    pub fn pairs(&self) -> &[PairModel<K>] {
        &self.pairs
    }

    /// Support vectors summed over all pairs
    pub fn n_support_vectors(&self) -> usize {
        self.pairs.iter().map(|p| p.model.n_support_vectors()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SparseVector;
    use crate::kernel::{LinearKernel, RBFKernel};

    fn blob(class: usize, x: f64, y: f64) -> Vec<Sample> {
        [(0.0, 0.0), (0.1, 0.0), (0.0, 0.1), (-0.1, 0.0)]
            .iter()
            .map(|(dx, dy)| Sample::with_class(SparseVector::new(vec![0, 1], vec![x + dx, y + dy]), class))
            .collect()
    }

    fn three_blobs() -> Vec<Sample> {
        let mut samples = blob(0, 3.0, 0.0);
        samples.extend(blob(4, -3.0, 0.0));
        samples.extend(blob(10, 0.0, 3.0));
        samples
    }

    #[test]
    fn test_one_vs_one_trains_all_pairs() {
        let model = OneVsOne::train(
            Arc::new(RBFKernel::new(0.5)),
            &OptimizerConfig::default(),
            &three_blobs(),
        )
        .expect("Training should succeed");

        assert_eq!(model.classes(), &[0, 4, 10]);
        assert_eq!(model.pairs().len(), 3);
        assert!(model.n_support_vectors() > 0);
        assert!(model
            .pairs()
            .iter()
            .all(|p| p.positive < p.negative));
    }

    #[test]
    fn test_one_vs_one_predicts_training_classes() {
        let samples = three_blobs();
        let model = OneVsOne::train(
            Arc::new(RBFKernel::new(0.5)),
            &OptimizerConfig::default(),
            &samples,
        )
        .unwrap();

        let predictions = model.predict_batch(&samples);
        for (pred, sample) in predictions.iter().zip(&samples) {
            assert_eq!(pred.class, sample.class_index());
            assert_eq!(pred.votes, 2);
        }
    }

    #[test]
    fn test_one_vs_one_requires_two_classes() {
        let result = OneVsOne::train(
            Arc::new(LinearKernel::new()),
            &OptimizerConfig::default(),
            &blob(3, 0.0, 0.0),
        );
        assert!(matches!(result, Err(SVMError::InvalidDataset(_))));
    }

    #[test]
    fn test_vote_ties_go_to_smaller_class() {
        // Hand-built pair models that each vote a fixed way:
        // (0 vs 1) -> 1, (0 vs 2) -> 0, (1 vs 2) -> 2  => one vote each
        let constant = |bias: f64| {
            TrainedSVM::from_parts(Arc::new(LinearKernel::new()), vec![], vec![], bias).unwrap()
        };
        let pair = |positive, negative, bias| PairModel {
            positive,
            negative,
            model: constant(bias),
        };
        let pairs = vec![pair(0, 1, -1.0), pair(0, 2, 1.0), pair(1, 2, -1.0)];
        let model = OneVsOne::from_pairs(vec![0, 1, 2], pairs).unwrap();

        let pred = model.predict(&Sample::new(SparseVector::empty(), 0.0));
        assert_eq!(pred, ClassPrediction::new(0, 1));
    }

    #[test]
    fn test_from_pairs_checks_pair_count() {
        let result: Result<OneVsOne<LinearKernel>> = OneVsOne::from_pairs(vec![0, 1, 2], vec![]);
        assert!(matches!(result, Err(SVMError::DimensionMismatch { expected: 3, actual: 0 })));
    }
}
