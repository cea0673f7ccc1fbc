//! In-memory labeled image set

use crate::core::{Dataset, Result, SVMError, Sample};
use std::collections::BTreeMap;

/// Labeled images held in memory; labels are class indices
#[derive(Debug, Clone, Default)]
pub struct ImageDataset {
    samples: Vec<Sample>,
    dimensions: usize,
}

impl ImageDataset {
    /// Wrap samples with a known feature dimension
    ///
    /// Fails if any sample has a feature index outside `dimensions`.
    pub fn new(samples: Vec<Sample>, dimensions: usize) -> Result<Self> {
        if let Some(max_idx) = samples
            .iter()
            .filter_map(|s| s.features.indices.last())
            .max()
        {
            if *max_idx >= dimensions {
                return Err(SVMError::DimensionMismatch {
                    expected: dimensions,
                    actual: max_idx + 1,
                });
            }
        }
        Ok(Self {
            samples,
            dimensions,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    /// Class index of every sample, in order
    pub fn classes_per_sample(&self) -> Vec<usize> {
        self.samples.iter().map(Sample::class_index).collect()
    }

    /// Sorted distinct classes present
    pub fn classes(&self) -> Vec<usize> {
        self.class_counts().into_keys().collect()
    }

    /// Number of samples per class
    pub fn class_counts(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.class_index()).or_insert(0) += 1;
        }
        counts
    }

    /// New dataset with the samples at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
            dimensions: self.dimensions,
        }
    }

    /// Keep samples whose class satisfies `keep`
    pub fn filter_by_class<F: Fn(usize) -> bool>(&self, keep: F) -> Self {
        Self {
            samples: self
                .samples
                .iter()
                .filter(|s| keep(s.class_index()))
                .cloned()
                .collect(),
            dimensions: self.dimensions,
        }
    }

    /// Relabel every sample through `map`
    pub fn map_classes<F: Fn(usize) -> usize>(self, map: F) -> Self {
        Self {
            samples: self
                .samples
                .into_iter()
                .map(|mut s| {
                    s.label = map(s.class_index()) as f64;
                    s
                })
                .collect(),
            dimensions: self.dimensions,
        }
    }

    /// Replace all samples, keeping the dimension
    pub fn with_samples(&self, samples: Vec<Sample>) -> Self {
        Self {
            samples,
            dimensions: self.dimensions,
        }
    }

    /// Append `other` after `self` (training rows first, then test rows)
    pub fn concat(&self, other: &ImageDataset) -> Result<Self> {
        if self.dimensions != other.dimensions {
            return Err(SVMError::DimensionMismatch {
                expected: self.dimensions,
                actual: other.dimensions,
            });
        }
        let mut samples = self.samples.clone();
        samples.extend(other.samples.iter().cloned());
        Ok(Self {
            samples,
            dimensions: self.dimensions,
        })
    }
}

impl Dataset for ImageDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn dim(&self) -> usize {
        self.dimensions
    }

    fn get_sample(&self, i: usize) -> Sample {
        self.samples[i].clone()
    }

    fn get_labels(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.label).collect()
    }
}
