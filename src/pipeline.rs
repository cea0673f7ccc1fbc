//! End-to-end digit / non-digit experiment
//!
//! load → filter → subsample → merge → rescale → fit → evaluate → tune

use crate::api::{ModelInfo, Svc, SvcParams, TrainedSvc};
use crate::config::{CvConfig, PipelineConfig};
use crate::core::{Dataset, Result};
use crate::data::{detection_class_name, fix_orientation, ImageDataset, NON_DIGIT_CLASS};
use crate::metrics::{ClassMetrics, ConfusionMatrix, EvaluationMetrics};
use crate::persistence::SerializableModel;
use crate::prep::{filter_letters, merge_non_digits, subsample_detection, SubsampleQuota};
use crate::search::{
    CvStrategy, GridSearch, GridSearchResult, PredefinedSplit, SearchReport, StratifiedKFold,
};
use crate::utils::scaling::ScalingParams;
use crate::utils::stats::{sparse_vector_stats, SparseVectorStats};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Train and test sets ready for fitting
pub struct PreparedData {
    pub train: ImageDataset,
    pub test: ImageDataset,
    pub scaling: ScalingParams,
    pub summary: PreparationSummary,
}

/// Sizes and class balance after each preparation step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparationSummary {
    pub loaded_train: usize,
    pub loaded_test: usize,
    pub excluded_letters: Vec<char>,
    pub train_class_counts: BTreeMap<usize, usize>,
    pub test_class_counts: BTreeMap<usize, usize>,
    /// Pixel statistics of the training set before rescaling
    pub raw_pixels: SparseVectorStats,
}

/// Scores of one model on one labeled set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub per_class: Vec<ClassMetrics>,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    /// Digits as the positive group, non-digit as the negative
    pub detection: EvaluationMetrics,
}

impl EvaluationReport {
    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let (macro_precision, macro_recall, macro_f1) = confusion.macro_average();
        Self {
            accuracy: confusion.accuracy(),
            per_class: confusion.per_class(),
            detection: confusion.to_binary(|c| c < NON_DIGIT_CLASS),
            macro_precision,
            macro_recall,
            macro_f1,
            confusion,
        }
    }

    /// Confusion matrix with digit / non-digit class names
    pub fn table(&self) -> String {
        self.confusion.render(detection_class_name)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub created_at: String,
    pub config: PipelineConfig,
    pub preparation: PreparationSummary,
    pub model: ModelInfo,
    pub baseline: EvaluationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchReport>,
    /// Best grid candidate refitted on the training rows, scored on test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuned: Option<EvaluationReport>,
}

impl PipelineReport {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Configured experiment
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read both splits from disk
    pub fn load(&self) -> Result<(ImageDataset, ImageDataset)> {
        let expected = Some(self.config.n_features);
        info!("Loading training data: {}", self.config.train.describe());
        let train = self.config.train.load(expected)?;
        info!("Loading test data: {}", self.config.test.describe());
        let test = self.config.test.load(expected)?;
        info!("Loaded {} training and {} test images", train.len(), test.len());
        Ok((train, test))
    }

    /// Orientation, letter filtering, optional subsampling and merging
    pub fn prepare_split(
        &self,
        dataset: ImageDataset,
        quota: Option<SubsampleQuota>,
        rng: &mut StdRng,
    ) -> Result<ImageDataset> {
        let dataset = if self.config.fix_orientation {
            fix_orientation(&dataset)?
        } else {
            dataset
        };

        let filtered = filter_letters(&dataset, self.config.split, &self.config.excluded_letters())?;
        let sampled = match quota {
            Some(quota) => subsample_detection(&filtered, self.config.split, quota, rng),
            None => filtered,
        };
        merge_non_digits(sampled, self.config.split)
    }

    /// Load and prepare both splits; scaling is fitted on training rows only
    pub fn prepare(&self) -> Result<PreparedData> {
        let (train, test) = self.load()?;
        let loaded_train = train.len();
        let loaded_test = test.len();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let train = self.prepare_split(train, Some(self.config.train_quota), &mut rng)?;
        let test = self.prepare_split(test, Some(self.config.test_quota), &mut rng)?;
        info!(
            "Prepared {} training and {} test images over {} classes",
            train.len(),
            test.len(),
            train.classes().len()
        );

        let raw_pixels = sparse_vector_stats(train.samples());
        let scaling = ScalingParams::fit(train.samples(), self.config.scaling);
        let train_scaled = train.with_samples(scaling.transform_samples(train.samples()));
        let test_scaled = test.with_samples(scaling.transform_samples(test.samples()));

        Ok(PreparedData {
            summary: PreparationSummary {
                loaded_train,
                loaded_test,
                excluded_letters: self.config.excluded_letters(),
                train_class_counts: train.class_counts(),
                test_class_counts: test.class_counts(),
                raw_pixels,
            },
            train: train_scaled,
            test: test_scaled,
            scaling,
        })
    }

    /// Fit with the configured parameters
    pub fn train(&self, train: &ImageDataset) -> Result<TrainedSvc> {
        Svc::from_params(self.config.svm.clone()).fit(train)
    }

    pub fn evaluate(&self, model: &TrainedSvc, test: &ImageDataset) -> Result<EvaluationReport> {
        let report = EvaluationReport::from_confusion(model.confusion_matrix(test)?);
        info!(
            "Accuracy {:.4}, digit detection precision {:.4} recall {:.4}",
            report.accuracy,
            report.detection.precision(),
            report.detection.recall()
        );
        Ok(report)
    }

    /// Grid search as configured
    ///
    /// With the predefined split the search runs on training rows followed
    /// by test rows, validating on the test rows. K-fold uses training rows
    /// only. The search itself never refits; see [`Pipeline::run`].
    pub fn tune(&self, prepared: &PreparedData) -> Result<GridSearchResult> {
        let (dataset, cv) = match self.config.cv {
            CvConfig::Predefined => (
                prepared.train.concat(&prepared.test)?,
                CvStrategy::Predefined(PredefinedSplit::from_train_test(
                    prepared.train.len(),
                    prepared.test.len(),
                )?),
            ),
            CvConfig::StratifiedKFold { k, seed } => (
                prepared.train.clone(),
                CvStrategy::StratifiedKFold(StratifiedKFold::new(k, seed)),
            ),
        };

        GridSearch::new(self.config.svm.clone(), self.config.grid.clone(), cv)
            .with_refit(false)
            .fit(&dataset)
    }

    /// Execute every stage and write the configured outputs
    pub fn run(&self) -> Result<PipelineReport> {
        let prepared = self.prepare()?;

        let baseline_model = self.train(&prepared.train)?;
        let baseline = self.evaluate(&baseline_model, &prepared.test)?;
        info!("Baseline confusion matrix:\n{}", baseline.table());

        let mut search = None;
        let mut tuned = None;
        let mut final_model = baseline_model;

        if self.config.tune {
            let result = self.tune(&prepared)?;
            let report = result.report;

            if self.config.refit {
                let mut params: SvcParams = self.config.svm.clone();
                params.optimizer.c = report.best_c;
                params.gamma = report.best_gamma;
                let model = Svc::from_params(params).fit(&prepared.train)?;
                tuned = Some(self.evaluate(&model, &prepared.test)?);
                final_model = model;
            }
            search = Some(report);
        }

        if let Some(path) = &self.config.model_path {
            SerializableModel::from_trained_model(&final_model, Some(&prepared.scaling))
                .save_to_file(path)?;
            info!("Model saved to {}", path.display());
        }

        let report = PipelineReport {
            created_at: chrono::Utc::now().to_rfc3339(),
            config: self.config.clone(),
            preparation: prepared.summary,
            model: final_model.info(),
            baseline,
            search,
            tuned,
        };

        if let Some(path) = &self.config.report_path {
            report.save_to_file(path)?;
            info!("Report written to {}", path.display());
        }

        Ok(report)
    }
}
