//! Sequential Minimal Optimization (SMO) solver implementation
//!
//! Solves the binary SVM dual by repeatedly optimizing pairs of Lagrange
//! multipliers, following Platt's outer loop: alternate full passes with
//! passes over the non-bound multipliers until no KKT violation remains.

use crate::cache::KernelCache;
use crate::core::{OptimizationResult, OptimizerConfig, Result, SVMError, Sample};
use crate::kernel::Kernel;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Multipliers within this distance of a bound are treated as at the bound
const BOUND_EPS: f64 = 1e-8;

/// Tolerance when comparing the objective at both ends of the segment
const OBJECTIVE_EPS: f64 = 1e-12;

/// Fixed seed for the start offset of the fallback scans
const SCAN_SEED: u64 = 0x5eed;

/// SMO solver for SVM optimization
pub struct SMOSolver<K: Kernel> {
    kernel: Arc<K>,
    config: OptimizerConfig,
}

impl<K: Kernel> SMOSolver<K> {
    /// Create a new SMO solver with the given kernel and configuration
    pub fn new(kernel: Arc<K>, config: OptimizerConfig) -> Self {
        Self { kernel, config }
    }

    /// Solve the SVM optimization problem
    ///
    /// Labels must be +1 / -1 and both classes must be present.
    pub fn solve(&self, samples: &[Sample]) -> Result<OptimizationResult> {
        let mut cache = KernelCache::for_problem(samples.len(), self.config.cache_size);
        self.solve_with_cache(samples, &mut cache)
    }

    /// Solve the SVM optimization problem with a caller-provided kernel cache
    ///
    /// The cache must not hold values from a different sample set.
    pub fn solve_with_cache(
        &self,
        samples: &[Sample],
        cache: &mut KernelCache,
    ) -> Result<OptimizationResult> {
        self.validate(samples)?;

        let mut state = SmoState::new(self.kernel.as_ref(), samples, cache, &self.config);
        let n = samples.len();

        let mut iterations = 0;
        let mut num_changed = 0;
        let mut examine_all = true;

        while (num_changed > 0 || examine_all) && iterations < self.config.max_iterations {
            num_changed = 0;

            for i in 0..n {
                if (examine_all || state.is_free(i)) && state.examine_example(i) {
                    num_changed += 1;
                }
            }

            if examine_all {
                examine_all = false;
            } else if num_changed == 0 {
                examine_all = true;
            }

            iterations += 1;
        }

        if num_changed > 0 || examine_all {
            warn!(
                "SMO stopped after {} passes without meeting tolerance {}",
                iterations, self.config.epsilon
            );
        }

        let bias = state.refined_bias();
        let objective_value = state.objective();

        let support_vectors: Vec<usize> = state
            .alpha
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| if a > BOUND_EPS { Some(i) } else { None })
            .collect();

        debug!(
            "SMO finished: n={}, passes={}, support vectors={}, cache hit rate={:.2}",
            n,
            iterations,
            support_vectors.len(),
            state.cache.hit_rate()
        );

        Ok(OptimizationResult {
            alpha: state.alpha,
            b: bias,
            support_vectors,
            iterations,
            objective_value,
        })
    }

    fn validate(&self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        if !(self.config.c.is_finite() && self.config.c > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.config.c
            )));
        }

        if !(self.config.epsilon.is_finite() && self.config.epsilon > 0.0) {
            return Err(SVMError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.config.epsilon
            )));
        }

        for sample in samples {
            if sample.label != 1.0 && sample.label != -1.0 {
                return Err(SVMError::InvalidLabel(sample.label));
            }
        }

        let positives = samples.iter().filter(|s| s.label > 0.0).count();
        if positives == 0 || positives == samples.len() {
            return Err(SVMError::InvalidDataset(
                "binary problem needs samples of both classes".to_string(),
            ));
        }

        Ok(())
    }
}

/// Mutable optimization state of one solve
struct SmoState<'a, K: Kernel> {
    kernel: &'a K,
    samples: &'a [Sample],
    norms: Vec<f64>,
    cache: &'a mut KernelCache,
    alpha: Vec<f64>,
    /// E_i = f(x_i) - y_i, bias included
    errors: Vec<f64>,
    b: f64,
    c: f64,
    tol: f64,
    rng: StdRng,
}

impl<'a, K: Kernel> SmoState<'a, K> {
    fn new(
        kernel: &'a K,
        samples: &'a [Sample],
        cache: &'a mut KernelCache,
        config: &OptimizerConfig,
    ) -> Self {
        Self {
            kernel,
            samples,
            norms: samples.iter().map(|s| s.features.norm_squared()).collect(),
            cache,
            alpha: vec![0.0; samples.len()],
            // All alphas are zero and b = 0, so f(x_i) = 0
            errors: samples.iter().map(|s| -s.label).collect(),
            b: 0.0,
            c: config.c,
            tol: config.epsilon,
            rng: StdRng::seed_from_u64(SCAN_SEED),
        }
    }

    fn kernel_value(&mut self, i: usize, j: usize) -> f64 {
        let kernel = self.kernel;
        let samples = self.samples;
        let norms = &self.norms;
        self.cache.get_or_compute(i, j, || {
            kernel.compute_with_norms(
                &samples[i].features,
                &samples[j].features,
                norms[i],
                norms[j],
            )
        })
    }

    fn label(&self, i: usize) -> f64 {
        self.samples[i].label
    }

    fn is_free(&self, i: usize) -> bool {
        self.alpha[i] > BOUND_EPS && self.alpha[i] < self.c - BOUND_EPS
    }

    /// Check example `i2` against the KKT conditions and optimize it with a
    /// partner if it violates them
    fn examine_example(&mut self, i2: usize) -> bool {
        let y2 = self.label(i2);
        let alpha2 = self.alpha[i2];
        let e2 = self.errors[i2];
        let r2 = e2 * y2;

        if !((r2 < -self.tol && alpha2 < self.c) || (r2 > self.tol && alpha2 > 0.0)) {
            return false;
        }

        let n = self.samples.len();
        let free: Vec<usize> = (0..n).filter(|&i| i != i2 && self.is_free(i)).collect();

        // Second choice heuristic: maximize |E1 - E2|
        if let Some(i1) = free.iter().copied().max_by(|&a, &b| {
            let da = (self.errors[a] - e2).abs();
            let db = (self.errors[b] - e2).abs();
            da.total_cmp(&db)
        }) {
            if self.take_step(i1, i2) {
                return true;
            }
        }

        if !free.is_empty() {
            let start = self.rng.gen_range(0..free.len());
            for k in 0..free.len() {
                if self.take_step(free[(start + k) % free.len()], i2) {
                    return true;
                }
            }
        }

        let start = self.rng.gen_range(0..n);
        for k in 0..n {
            if self.take_step((start + k) % n, i2) {
                return true;
            }
        }

        false
    }

    /// Jointly optimize alpha[i1] and alpha[i2]
    fn take_step(&mut self, i1: usize, i2: usize) -> bool {
        if i1 == i2 {
            return false;
        }

        let c = self.c;
        let y1 = self.label(i1);
        let y2 = self.label(i2);
        let alpha1 = self.alpha[i1];
        let alpha2 = self.alpha[i2];
        let e1 = self.errors[i1];
        let e2 = self.errors[i2];
        let s = y1 * y2;

        let (low, high) = if y1 != y2 {
            ((alpha2 - alpha1).max(0.0), (c + alpha2 - alpha1).min(c))
        } else {
            ((alpha1 + alpha2 - c).max(0.0), (alpha1 + alpha2).min(c))
        };

        if high - low < BOUND_EPS {
            return false;
        }

        let k11 = self.kernel_value(i1, i1);
        let k12 = self.kernel_value(i1, i2);
        let k22 = self.kernel_value(i2, i2);
        let eta = k11 + k22 - 2.0 * k12;

        let mut a2 = if eta > 0.0 {
            (alpha2 + y2 * (e1 - e2) / eta).clamp(low, high)
        } else {
            // Objective is linear along the constraint line; take the better end
            let f1 = y1 * (e1 - self.b) - alpha1 * k11 - s * alpha2 * k12;
            let f2 = y2 * (e2 - self.b) - s * alpha1 * k12 - alpha2 * k22;
            let l1 = alpha1 + s * (alpha2 - low);
            let h1 = alpha1 + s * (alpha2 - high);
            let obj_low = l1 * f1
                + low * f2
                + 0.5 * l1 * l1 * k11
                + 0.5 * low * low * k22
                + s * low * l1 * k12;
            let obj_high = h1 * f1
                + high * f2
                + 0.5 * h1 * h1 * k11
                + 0.5 * high * high * k22
                + s * high * h1 * k12;

            if obj_low < obj_high - OBJECTIVE_EPS {
                low
            } else if obj_low > obj_high + OBJECTIVE_EPS {
                high
            } else {
                alpha2
            }
        };

        if a2 < BOUND_EPS {
            a2 = 0.0;
        } else if a2 > c - BOUND_EPS {
            a2 = c;
        }

        if (a2 - alpha2).abs() < self.tol * (a2 + alpha2 + self.tol) {
            return false;
        }

        let mut a1 = alpha1 + s * (alpha2 - a2);
        if a1 < BOUND_EPS {
            a1 = 0.0;
        } else if a1 > c - BOUND_EPS {
            a1 = c;
        }

        let delta1 = y1 * (a1 - alpha1);
        let delta2 = y2 * (a2 - alpha2);

        let b1 = self.b - e1 - delta1 * k11 - delta2 * k12;
        let b2 = self.b - e2 - delta1 * k12 - delta2 * k22;
        let new_b = if a1 > 0.0 && a1 < c {
            b1
        } else if a2 > 0.0 && a2 < c {
            b2
        } else {
            0.5 * (b1 + b2)
        };
        let delta_b = new_b - self.b;

        self.alpha[i1] = a1;
        self.alpha[i2] = a2;
        self.b = new_b;

        for k in 0..self.samples.len() {
            let k1k = self.kernel_value(i1, k);
            let k2k = self.kernel_value(i2, k);
            self.errors[k] += delta1 * k1k + delta2 * k2k + delta_b;
        }

        true
    }

    /// Average the threshold over free support vectors
    ///
    /// Falls back to the running threshold when every multiplier sits at a bound.
    fn refined_bias(&self) -> f64 {
        let (sum, count) = (0..self.samples.len())
            .filter(|&i| self.is_free(i))
            .fold((0.0, 0usize), |(sum, count), i| {
                (sum + self.errors[i], count + 1)
            });

        if count > 0 {
            self.b - sum / count as f64
        } else {
            self.b
        }
    }

    /// Dual objective: sum(alpha) - 1/2 sum_ij alpha_i alpha_j y_i y_j K_ij
    fn objective(&mut self) -> f64 {
        let active: Vec<usize> = (0..self.samples.len())
            .filter(|&i| self.alpha[i] > BOUND_EPS)
            .collect();

        let mut obj: f64 = self.alpha.iter().sum();
        for &i in &active {
            for &j in &active {
                let k_ij = self.kernel_value(i, j);
                obj -= 0.5 * self.alpha[i] * self.alpha[j] * self.label(i) * self.label(j) * k_ij;
            }
        }
        obj
    }
}
