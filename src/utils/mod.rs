//! Utility functions for preparing pixel data

use crate::core::Sample;

/// Feature scaling utilities
///
/// Pixels that are absent from a sparse vector count as zeros when
/// statistics are fitted, so every method sees the same values a dense
/// array would hold.
pub mod scaling {
    use super::*;
    use crate::core::{Result, SVMError, SparseVector};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    /// Feature scaling methods
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "method", rename_all = "snake_case")]
    pub enum ScalingMethod {
        /// Divide every value by a constant (255 maps 8-bit pixels into [0, 1])
        Divide { divisor: f64 },
        /// Min-Max scaling to [min_val, max_val] range
        MinMax { min_val: f64, max_val: f64 },
        /// Divide by the feature's standard deviation
        ///
        /// Values are not centered, so blank pixels stay blank.
        StandardScore,
    }

    impl Default for ScalingMethod {
        fn default() -> Self {
            Self::Divide { divisor: 255.0 }
        }
    }

    impl ScalingMethod {
        pub fn validate(&self) -> Result<()> {
            match *self {
                ScalingMethod::Divide { divisor } if !(divisor.is_finite() && divisor != 0.0) => {
                    Err(SVMError::InvalidParameter(format!(
                        "Scaling divisor must be finite and non-zero, got {divisor}"
                    )))
                }
                ScalingMethod::MinMax { min_val, max_val } if min_val >= max_val => {
                    Err(SVMError::InvalidParameter(format!(
                        "Scaling range [{min_val}, {max_val}] is empty"
                    )))
                }
                _ => Ok(()),
            }
        }
    }

    /// Fitted scaling parameters
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ScalingParams {
        pub method: ScalingMethod,
        pub feature_stats: BTreeMap<usize, FeatureStats>,
    }

    /// Statistics for a single feature, zeros included
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FeatureStats {
        pub min: f64,
        pub max: f64,
        pub mean: f64,
        pub std: f64,
        /// Samples where the feature is non-zero
        pub count: usize,
    }

    impl ScalingParams {
        /// Compute scaling parameters from training data
        pub fn fit(samples: &[Sample], method: ScalingMethod) -> Self {
            let mut feature_stats = BTreeMap::new();

            // The fixed divisor needs no statistics
            if matches!(method, ScalingMethod::Divide { .. }) || samples.is_empty() {
                return Self {
                    method,
                    feature_stats,
                };
            }

            let n = samples.len();
            let mut feature_values: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
            for sample in samples {
                for (&feature_idx, &value) in sample
                    .features
                    .indices
                    .iter()
                    .zip(sample.features.values.iter())
                {
                    feature_values.entry(feature_idx).or_default().push(value);
                }
            }

            for (feature_idx, values) in feature_values {
                let zeros = n - values.len();
                let implicit_zero = if zeros > 0 { 0.0 } else { f64::NAN };

                let min = values.iter().fold(implicit_zero, |a, &b| a.min(b));
                let max = values.iter().fold(implicit_zero, |a, &b| a.max(b));
                let mean = values.iter().sum::<f64>() / n as f64;

                let variance = if n > 1 {
                    let stored: f64 = values.iter().map(|&x| (x - mean).powi(2)).sum();
                    (stored + zeros as f64 * mean * mean) / (n - 1) as f64
                } else {
                    0.0
                };

                feature_stats.insert(
                    feature_idx,
                    FeatureStats {
                        min,
                        max,
                        mean,
                        std: variance.sqrt(),
                        count: values.len(),
                    },
                );
            }

            Self {
                method,
                feature_stats,
            }
        }

        /// Transform a single sample using fitted parameters
        pub fn transform_sample(&self, sample: &Sample) -> Sample {
            let features = match self.method {
                ScalingMethod::Divide { divisor } => SparseVector {
                    indices: sample.features.indices.clone(),
                    values: sample.features.values.iter().map(|v| v / divisor).collect(),
                },
                _ => self.transform_fitted(&sample.features),
            };
            Sample::new(features, sample.label)
        }

        /// Min-max may move zeros, so every fitted feature is visited
        ///
        /// Features never non-zero in training were constant there and are
        /// dropped, like a constant feature under standard score.
        fn transform_fitted(&self, features: &SparseVector) -> SparseVector {
            let (indices, values) = self
                .feature_stats
                .iter()
                .map(|(&feature_idx, stats)| {
                    (feature_idx, self.scale_value(features.get(feature_idx), stats))
                })
                .filter(|&(_, value)| value != 0.0)
                .unzip();
            SparseVector { indices, values }
        }

        /// Transform multiple samples
        pub fn transform_samples(&self, samples: &[Sample]) -> Vec<Sample> {
            samples
                .iter()
                .map(|sample| self.transform_sample(sample))
                .collect()
        }

        fn scale_value(&self, value: f64, stats: &FeatureStats) -> f64 {
            match self.method {
                ScalingMethod::Divide { divisor } => value / divisor,
                ScalingMethod::MinMax { min_val, max_val } => {
                    if (stats.max - stats.min).abs() < 1e-12 {
                        // Constant feature
                        (min_val + max_val) / 2.0
                    } else {
                        let normalized = (value - stats.min) / (stats.max - stats.min);
                        min_val + normalized * (max_val - min_val)
                    }
                }
                ScalingMethod::StandardScore => {
                    if stats.std < 1e-12 {
                        0.0
                    } else {
                        value / stats.std
                    }
                }
            }
        }
    }

    /// Convenience function: fit and transform in one step
    pub fn fit_transform(
        samples: &[Sample],
        method: ScalingMethod,
    ) -> (Vec<Sample>, ScalingParams) {
        let params = ScalingParams::fit(samples, method);
        let transformed = params.transform_samples(samples);
        (transformed, params)
    }
}

/// Statistical utilities for datasets
pub mod stats {
    use super::*;
    use serde::Serialize;

    /// Calculate basic statistics for sparse vectors in a dataset
    pub fn sparse_vector_stats(samples: &[Sample]) -> SparseVectorStats {
        if samples.is_empty() {
            return SparseVectorStats::default();
        }

        let nnz_values: Vec<usize> = samples.iter().map(|s| s.features.nnz()).collect();

        let total_nnz: usize = nnz_values.iter().sum();
        let mean_nnz = total_nnz as f64 / samples.len() as f64;

        let max_nnz = nnz_values.iter().copied().max().unwrap_or(0);
        let min_nnz = nnz_values.iter().copied().min().unwrap_or(0);

        let variance = if samples.len() > 1 {
            nnz_values
                .iter()
                .map(|&x| (x as f64 - mean_nnz).powi(2))
                .sum::<f64>()
                / (samples.len() - 1) as f64
        } else {
            0.0
        };

        let max_value = samples
            .iter()
            .flat_map(|s| s.features.values.iter().copied())
            .fold(0.0_f64, f64::max);

        SparseVectorStats {
            mean_nnz,
            min_nnz,
            max_nnz,
            variance_nnz: variance,
            max_value,
            total_samples: samples.len(),
        }
    }

    /// Statistics for sparse vector analysis
    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct SparseVectorStats {
        /// Mean number of inked pixels per image
        pub mean_nnz: f64,
        pub min_nnz: usize,
        pub max_nnz: usize,
        pub variance_nnz: f64,
        /// Largest stored value; 255 for raw pixels, 1 after rescaling
        pub max_value: f64,
        pub total_samples: usize,
    }
}

#[cfg(test)]
mod tests {
    use super::scaling::{fit_transform, ScalingMethod, ScalingParams};
    use super::stats::sparse_vector_stats;
    use super::*;
    use crate::core::SparseVector;
    use approx::assert_relative_eq;

    #[test]
    fn test_scaling_divide_by_255() {
        let samples = vec![
            Sample::new(SparseVector::new(vec![3, 7], vec![255.0, 51.0]), 4.0),
            Sample::new(SparseVector::empty(), 10.0),
        ];

        let (transformed, params) = fit_transform(&samples, ScalingMethod::default());

        assert!(params.feature_stats.is_empty());
        assert_eq!(transformed[0].features.indices, vec![3, 7]);
        assert_relative_eq!(transformed[0].features.values[0], 1.0);
        assert_relative_eq!(transformed[0].features.values[1], 0.2);
        assert!(transformed[1].features.is_empty());
        assert_eq!(transformed[0].label, 4.0);
    }

    #[test]
    fn test_scaling_minmax() {
        let samples = vec![
            Sample::new(SparseVector::new(vec![0, 1], vec![1.0, 10.0]), 1.0),
            Sample::new(SparseVector::new(vec![0, 1], vec![3.0, 20.0]), 2.0),
            Sample::new(SparseVector::new(vec![0, 1], vec![5.0, 30.0]), 1.0),
        ];

        let params = ScalingParams::fit(
            &samples,
            ScalingMethod::MinMax {
                min_val: 0.0,
                max_val: 1.0,
            },
        );
        let transformed = params.transform_samples(&samples);

        // Feature 0: min=1, max=5; the zero-valued result is dropped
        assert_eq!(transformed[0].features.indices, Vec::<usize>::new());
        assert_relative_eq!(transformed[1].features.get(0), 0.5);
        assert_relative_eq!(transformed[2].features.get(0), 1.0);
        assert_relative_eq!(transformed[2].features.get(1), 1.0);
    }

    #[test]
    fn test_minmax_counts_blank_pixels() {
        // Feature 0 is blank in the second image, so its minimum is 0
        let samples = vec![
            Sample::new(SparseVector::new(vec![0], vec![200.0]), 0.0),
            Sample::new(SparseVector::empty(), 1.0),
        ];

        let params = ScalingParams::fit(
            &samples,
            ScalingMethod::MinMax {
                min_val: -1.0,
                max_val: 1.0,
            },
        );
        assert_eq!(params.feature_stats[&0].min, 0.0);

        let transformed = params.transform_samples(&samples);
        assert_relative_eq!(transformed[0].features.get(0), 1.0);
        // The blank pixel moves to the bottom of the range
        assert_relative_eq!(transformed[1].features.get(0), -1.0);
    }

    #[test]
    fn test_scaling_standard_score() {
        let samples = vec![
            Sample::new(SparseVector::new(vec![0], vec![2.0]), 1.0),
            Sample::new(SparseVector::empty(), 1.0),
            Sample::new(SparseVector::new(vec![0], vec![4.0]), 1.0),
        ];

        let params = ScalingParams::fit(&samples, ScalingMethod::StandardScore);
        let stats = &params.feature_stats[&0];
        assert_relative_eq!(stats.mean, 2.0);
        assert_relative_eq!(stats.std, 2.0);
        assert_eq!(stats.count, 2);

        let transformed = params.transform_samples(&samples);
        assert_relative_eq!(transformed[0].features.get(0), 1.0);
        assert!(transformed[1].features.is_empty());
        assert_relative_eq!(transformed[2].features.get(0), 2.0);
    }

    #[test]
    fn test_pixel_blank_in_training_is_dropped() {
        let train = vec![
            Sample::new(SparseVector::new(vec![0], vec![100.0]), 0.0),
            Sample::new(SparseVector::new(vec![0], vec![200.0]), 0.0),
        ];
        let test = Sample::new(SparseVector::new(vec![0, 5], vec![150.0, 255.0]), 0.0);

        let minmax = ScalingParams::fit(
            &train,
            ScalingMethod::MinMax {
                min_val: 0.0,
                max_val: 1.0,
            },
        );
        let scaled = minmax.transform_sample(&test);
        assert_eq!(scaled.features.indices, vec![0]);
        assert_relative_eq!(scaled.features.values[0], 0.5);

        let standard = ScalingParams::fit(&train, ScalingMethod::StandardScore);
        let scaled = standard.transform_sample(&test);
        assert_eq!(scaled.features.indices, vec![0]);
        assert!(scaled.features.values[0] > 0.0 && scaled.features.values[0] < 255.0);

        // Divide needs no statistics and scales every pixel
        let divide = ScalingParams::fit(&train, ScalingMethod::default());
        assert_eq!(divide.transform_sample(&test).features.indices, vec![0, 5]);
    }

    #[test]
    fn test_scaling_method_validation_and_serde() {
        assert!(ScalingMethod::Divide { divisor: 0.0 }.validate().is_err());
        assert!(ScalingMethod::MinMax {
            min_val: 1.0,
            max_val: 1.0
        }
        .validate()
        .is_err());
        assert!(ScalingMethod::StandardScore.validate().is_ok());

        let json = serde_json::to_string(&ScalingMethod::default()).unwrap();
        assert_eq!(json, r#"{"method":"divide","divisor":255.0}"#);
        let parsed: ScalingMethod = serde_json::from_str(r#"{"method":"standard_score"}"#).unwrap();
        assert_eq!(parsed, ScalingMethod::StandardScore);
    }

    #[test]
    fn test_sparse_vector_stats() {
        let samples = vec![
            Sample::new(SparseVector::new(vec![0, 1], vec![10.0, 255.0]), 1.0),
            Sample::new(SparseVector::new(vec![0, 1, 2, 3], vec![1.0; 4]), 1.0),
        ];

        let stats = sparse_vector_stats(&samples);
        assert_eq!(stats.total_samples, 2);
        assert_eq!(stats.min_nnz, 2);
        assert_eq!(stats.max_nnz, 4);
        assert_relative_eq!(stats.mean_nnz, 3.0);
        assert_relative_eq!(stats.variance_nnz, 2.0);
        assert_relative_eq!(stats.max_value, 255.0);

        assert_eq!(sparse_vector_stats(&[]).total_samples, 0);
    }
}
