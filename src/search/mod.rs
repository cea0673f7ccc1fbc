//! Hyperparameter search over C and gamma
//!
//! Every grid candidate is fitted on the training rows of every fold and
//! scored by accuracy on the fold's validation rows. Candidate/fold fits
//! run in parallel on the rayon pool.

use crate::api::{Svc, SvcParams, TrainedSvc};
use crate::core::{Dataset, Result, SVMError};
use crate::data::ImageDataset;
use crate::kernel::Gamma;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Cartesian grid of C and gamma values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub c: Vec<f64>,
    pub gamma: Vec<Gamma>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            c: vec![0.1, 1.0, 10.0],
            gamma: vec![Gamma::Scale, Gamma::Value(0.01), Gamma::Value(0.1)],
        }
    }
}

/// One grid point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub c: f64,
    pub gamma: Gamma,
}

impl ParamGrid {
    pub fn new(c: Vec<f64>, gamma: Vec<Gamma>) -> Self {
        Self { c, gamma }
    }

    /// All combinations, C varying slowest
    pub fn candidates(&self) -> Vec<Candidate> {
        self.c
            .iter()
            .flat_map(|&c| self.gamma.iter().map(move |&gamma| Candidate { c, gamma }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.c.len() * self.gamma.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SVMError::InvalidParameter(
                "parameter grid has no candidates".to_string(),
            ));
        }
        if let Some(c) = self.c.iter().find(|c| !(c.is_finite() && **c > 0.0)) {
            return Err(SVMError::InvalidParameter(format!(
                "grid C values must be positive, got {c}"
            )));
        }
        Ok(())
    }
}

/// Row indices of one train / validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Caller-defined folds, one fold id per row
///
/// `-1` keeps the row in training for every split; a value `k >= 0`
/// places the row in the validation set of split `k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedSplit {
    test_fold: Vec<i32>,
}

impl PredefinedSplit {
    pub fn new(test_fold: Vec<i32>) -> Result<Self> {
        if let Some(&bad) = test_fold.iter().find(|&&f| f < -1) {
            return Err(SVMError::InvalidParameter(format!(
                "fold id {bad} is invalid; use -1 or a fold index"
            )));
        }
        if test_fold.iter().all(|&f| f == -1) {
            return Err(SVMError::InvalidParameter(
                "predefined split has no validation rows".to_string(),
            ));
        }
        let split = Self { test_fold };
        // A fold holding every row would train on nothing
        if let Some(id) = split
            .fold_ids()
            .into_iter()
            .find(|&id| split.test_fold.iter().all(|&f| f == id))
        {
            return Err(SVMError::InvalidParameter(format!(
                "validation fold {id} contains every row, leaving none to train on"
            )));
        }
        Ok(split)
    }

    /// Training rows first, then test rows forming the single validation fold
    pub fn from_train_test(n_train: usize, n_test: usize) -> Result<Self> {
        let mut test_fold = vec![-1; n_train];
        test_fold.extend(std::iter::repeat(0).take(n_test));
        Self::new(test_fold)
    }

    pub fn test_fold(&self) -> &[i32] {
        &self.test_fold
    }

    pub fn len(&self) -> usize {
        self.test_fold.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_fold.is_empty()
    }

    /// Number of distinct validation folds
    pub fn n_splits(&self) -> usize {
        self.fold_ids().len()
    }

    fn fold_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.test_fold.iter().copied().filter(|&f| f >= 0).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Splits in ascending fold id order
    pub fn splits(&self) -> Vec<Fold> {
        self.fold_ids()
            .into_iter()
            .map(|id| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..self.test_fold.len()).partition(|&i| self.test_fold[i] == id);
                Fold { train, test }
            })
            .collect()
    }
}

/// K folds with every class spread evenly across them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub k: usize,
    pub seed: u64,
}

impl StratifiedKFold {
    pub fn new(k: usize, seed: u64) -> Self {
        Self { k, seed }
    }

    /// Shuffle each class with the seed, then deal its rows round-robin
    pub fn splits(&self, classes: &[usize]) -> Result<Vec<Fold>> {
        if self.k < 2 {
            return Err(SVMError::InvalidParameter(format!(
                "k-fold needs k >= 2, got {}",
                self.k
            )));
        }
        if classes.len() < self.k {
            return Err(SVMError::InvalidDataset(format!(
                "cannot split {} rows into {} folds",
                classes.len(),
                self.k
            )));
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, &c) in classes.iter().enumerate() {
            by_class.entry(c).or_default().push(i);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut fold_of = vec![0usize; classes.len()];
        // Continue dealing where the previous class stopped so fold sizes stay even
        let mut next = 0;
        for rows in by_class.values_mut() {
            rows.shuffle(&mut rng);
            for &row in rows.iter() {
                fold_of[row] = next % self.k;
                next += 1;
            }
        }

        Ok((0..self.k)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..classes.len()).partition(|&i| fold_of[i] == fold);
                Fold { train, test }
            })
            .collect())
    }
}

/// How validation folds are formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CvStrategy {
    Predefined(PredefinedSplit),
    StratifiedKFold(StratifiedKFold),
}

impl CvStrategy {
    /// Folds for a dataset with the given per-row classes
    pub fn folds(&self, classes: &[usize]) -> Result<Vec<Fold>> {
        match self {
            CvStrategy::Predefined(split) => {
                if split.len() != classes.len() {
                    return Err(SVMError::DimensionMismatch {
                        expected: classes.len(),
                        actual: split.len(),
                    });
                }
                Ok(split.splits())
            }
            CvStrategy::StratifiedKFold(kfold) => kfold.splits(classes),
        }
    }
}

/// Scores of one candidate across folds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResult {
    pub c: f64,
    pub gamma: Gamma,
    pub split_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    /// 1 is best; equal means share the lower rank
    pub rank: usize,
}

/// Serializable summary of a search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub n_splits: usize,
    pub results: Vec<CandidateResult>,
    pub best_index: usize,
    pub best_c: f64,
    pub best_gamma: Gamma,
    pub best_score: f64,
}

impl SearchReport {
    pub fn best(&self) -> &CandidateResult {
        &self.results[self.best_index]
    }
}

/// Search outcome; `best_model` is present when refitting was requested
pub struct GridSearchResult {
    pub report: SearchReport,
    pub best_model: Option<TrainedSvc>,
}

/// Exhaustive search over a [`ParamGrid`]
#[derive(Debug, Clone)]
pub struct GridSearch {
    base: SvcParams,
    grid: ParamGrid,
    cv: CvStrategy,
    refit: bool,
}

impl GridSearch {
    /// `base` supplies every parameter the grid does not vary
    pub fn new(base: SvcParams, grid: ParamGrid, cv: CvStrategy) -> Self {
        Self {
            base,
            grid,
            cv,
            refit: true,
        }
    }

    /// Whether to retrain the best candidate on all rows
    pub fn with_refit(mut self, refit: bool) -> Self {
        self.refit = refit;
        self
    }

    fn params_for(&self, candidate: &Candidate) -> SvcParams {
        let mut params = self.base.clone();
        params.optimizer.c = candidate.c;
        params.gamma = candidate.gamma;
        params
    }

    pub fn fit(&self, dataset: &ImageDataset) -> Result<GridSearchResult> {
        self.grid.validate()?;
        if dataset.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        let folds = self.cv.folds(&dataset.classes_per_sample())?;
        if folds.is_empty() {
            return Err(SVMError::InvalidParameter(
                "cross-validation produced no folds".to_string(),
            ));
        }
        let candidates = self.grid.candidates();

        info!(
            "Grid search: {} candidates x {} folds = {} fits",
            candidates.len(),
            folds.len(),
            candidates.len() * folds.len()
        );
        let start = Instant::now();

        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();

        let scores = tasks
            .par_iter()
            .map(|&(ci, fi)| -> Result<f64> {
                let fold = &folds[fi];
                let params = self.params_for(&candidates[ci]);
                let model = Svc::from_params(params).fit(&dataset.subset(&fold.train))?;
                let score = model.score(&dataset.subset(&fold.test))?;
                debug!(
                    "C={} gamma={} fold {}: accuracy {:.4}",
                    candidates[ci].c, candidates[ci].gamma, fi, score
                );
                Ok(score)
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut results: Vec<CandidateResult> = candidates
            .iter()
            .zip(scores.chunks(folds.len()))
            .map(|(candidate, split_scores)| {
                let n = split_scores.len() as f64;
                let mean = split_scores.iter().sum::<f64>() / n;
                let variance = split_scores
                    .iter()
                    .map(|s| (s - mean).powi(2))
                    .sum::<f64>()
                    / n;
                CandidateResult {
                    c: candidate.c,
                    gamma: candidate.gamma,
                    split_scores: split_scores.to_vec(),
                    mean_score: mean,
                    std_score: variance.sqrt(),
                    rank: 0,
                }
            })
            .collect();

        let means: Vec<f64> = results.iter().map(|r| r.mean_score).collect();
        for result in &mut results {
            result.rank = 1 + means.iter().filter(|&&m| m > result.mean_score).count();
        }
        let best_index = results.iter().position(|r| r.rank == 1).unwrap_or(0);
        let best = &results[best_index];

        info!(
            "Grid search finished in {:.2?}: best C={} gamma={} (accuracy {:.4})",
            start.elapsed(),
            best.c,
            best.gamma,
            best.mean_score
        );

        let report = SearchReport {
            n_splits: folds.len(),
            best_c: best.c,
            best_gamma: best.gamma,
            best_score: best.mean_score,
            best_index,
            results,
        };

        let best_model = if self.refit {
            let params = self.params_for(&candidates[best_index]);
            info!("Refitting best candidate on all {} rows", dataset.len());
            Some(Svc::from_params(params).fit(dataset)?)
        } else {
            None
        };

        Ok(GridSearchResult { report, best_model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Sample, SparseVector};

    #[test]
    fn test_grid_candidates_are_c_major() {
        let grid = ParamGrid::new(vec![1.0, 10.0], vec![Gamma::Scale, Gamma::Value(0.5)]);
        let candidates = grid.candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0], Candidate { c: 1.0, gamma: Gamma::Scale });
        assert_eq!(
            candidates[1],
            Candidate {
                c: 1.0,
                gamma: Gamma::Value(0.5)
            }
        );
        assert_eq!(candidates[2].c, 10.0);

        assert!(ParamGrid::new(vec![], vec![Gamma::Auto]).validate().is_err());
        assert!(ParamGrid::new(vec![-1.0], vec![Gamma::Auto]).validate().is_err());
    }

    #[test]
    fn test_predefined_split_from_train_test() {
        let split = PredefinedSplit::from_train_test(3, 2).unwrap();
        assert_eq!(split.test_fold(), &[-1, -1, -1, 0, 0]);
        assert_eq!(split.n_splits(), 1);

        let folds = split.splits();
        assert_eq!(folds[0].train, vec![0, 1, 2]);
        assert_eq!(folds[0].test, vec![3, 4]);
    }

    #[test]
    fn test_predefined_split_never_validates_on_minus_one() {
        let split = PredefinedSplit::new(vec![-1, 1, 0, -1, 1, 0]).unwrap();
        let folds = split.splits();
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].test, vec![2, 5]);
        assert_eq!(folds[1].test, vec![1, 4]);
        for fold in &folds {
            assert!(!fold.test.contains(&0) && !fold.test.contains(&3));
            assert!(fold.train.contains(&0) && fold.train.contains(&3));
        }
    }

    #[test]
    fn test_predefined_split_validation() {
        assert!(PredefinedSplit::new(vec![-1, -2]).is_err());
        assert!(PredefinedSplit::new(vec![-1, -1]).is_err());
        assert!(PredefinedSplit::from_train_test(4, 0).is_err());
        assert!(matches!(
            PredefinedSplit::new(vec![0, 0]),
            Err(SVMError::InvalidParameter(msg)) if msg.contains("fold 0")
        ));
        assert!(matches!(
            PredefinedSplit::from_train_test(0, 3),
            Err(SVMError::InvalidParameter(_))
        ));
        // Two folds train on each other
        assert_eq!(PredefinedSplit::new(vec![0, 1]).unwrap().n_splits(), 2);

        let cv = CvStrategy::Predefined(PredefinedSplit::from_train_test(1, 1).unwrap());
        assert!(matches!(
            cv.folds(&[0, 1, 2]),
            Err(SVMError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_stratified_kfold() {
        let classes = vec![0, 0, 0, 0, 1, 1, 1, 1];
        let kfold = StratifiedKFold::new(2, 42);
        let folds = kfold.splits(&classes).unwrap();

        assert_eq!(folds.len(), 2);
        for fold in &folds {
            assert_eq!(fold.test.len(), 4);
            let zeros = fold.test.iter().filter(|&&i| classes[i] == 0).count();
            assert_eq!(zeros, 2);
        }
        // Every row validated exactly once
        let mut all: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..8).collect::<Vec<_>>());

        assert_eq!(kfold.splits(&classes).unwrap(), folds);
        assert!(StratifiedKFold::new(1, 0).splits(&classes).is_err());
        assert!(StratifiedKFold::new(9, 0).splits(&classes).is_err());
    }

    fn two_class_data() -> ImageDataset {
        let mut samples = Vec::new();
        for i in 0..6 {
            let offset = i as f64 * 0.1;
            samples.push(Sample::with_class(
                SparseVector::new(vec![0, 1], vec![1.0 + offset, 5.0]),
                2,
            ));
            samples.push(Sample::with_class(
                SparseVector::new(vec![0, 1], vec![5.0 + offset, 1.0]),
                10,
            ));
        }
        ImageDataset::new(samples, 2).unwrap()
    }

    #[test]
    fn test_grid_search_predefined_split() {
        let data = two_class_data();
        let split = PredefinedSplit::from_train_test(8, 4).unwrap();
        let grid = ParamGrid::new(vec![1.0, 10.0], vec![Gamma::Value(0.1), Gamma::Scale]);

        let result = GridSearch::new(SvcParams::default(), grid, CvStrategy::Predefined(split))
            .fit(&data)
            .expect("search should succeed");

        let report = &result.report;
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.n_splits, 1);
        assert!(report.results.iter().all(|r| r.split_scores.len() == 1));
        assert!(report.results.iter().any(|r| r.rank == 1));
        assert_eq!(report.best().rank, 1);
        let top = report
            .results
            .iter()
            .map(|r| r.mean_score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.best_score, top);

        let model = result.best_model.expect("refit requested by default");
        assert_eq!(model.info().classes, vec![2, 10]);
    }

    #[test]
    fn test_grid_search_ranks_ties_and_skips_refit() {
        let data = two_class_data();
        let grid = ParamGrid::new(vec![1.0, 2.0], vec![Gamma::Value(0.1)]);
        let result = GridSearch::new(
            SvcParams::default(),
            grid,
            CvStrategy::StratifiedKFold(StratifiedKFold::new(3, 7)),
        )
        .with_refit(false)
        .fit(&data)
        .unwrap();

        assert!(result.best_model.is_none());
        let report = result.report;
        assert_eq!(report.n_splits, 3);
        // Separable data: both candidates are perfect and share rank 1
        assert!(report.results.iter().all(|r| r.mean_score == 1.0));
        assert!(report.results.iter().all(|r| r.rank == 1));
        assert_eq!(report.best_index, 0);
        assert_eq!(report.results[0].std_score, 0.0);
    }
}
