//! Pipeline configuration
//!
//! Every field has a default, so a JSON file only needs the values that
//! differ. CLI flags override the file.

use crate::api::SvcParams;
use crate::core::{Result, SVMError};
use crate::data::{DataSource, EmnistSplit, IMAGE_PIXELS};
use crate::prep::SubsampleQuota;
use crate::search::ParamGrid;
use crate::utils::scaling::ScalingMethod;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Cross-validation used by the tuning step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CvConfig {
    /// Prepared training rows always train, prepared test rows validate
    Predefined,
    /// Stratified k-fold over the prepared training rows
    StratifiedKFold { k: usize, seed: u64 },
}

impl Default for CvConfig {
    fn default() -> Self {
        Self::Predefined
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory downloads are written to
    pub data_dir: PathBuf,
    pub train_url: Option<String>,
    pub test_url: Option<String>,
    pub train: DataSource,
    pub test: DataSource,
    pub split: EmnistSplit,
    /// Pixels per image
    pub n_features: usize,
    /// Transpose images to the upright orientation
    pub fix_orientation: bool,
    /// Letters removed before merging; the split's ambiguous letters when unset
    pub excluded_letters: Option<Vec<char>>,
    pub train_quota: SubsampleQuota,
    pub test_quota: SubsampleQuota,
    pub seed: u64,
    pub scaling: ScalingMethod,
    pub svm: SvcParams,
    pub grid: ParamGrid,
    pub cv: CvConfig,
    /// Run the grid search after the baseline fit
    pub tune: bool,
    /// Retrain the best grid candidate on all rows
    pub refit: bool,
    pub model_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let split = EmnistSplit::default();
        let data_dir = PathBuf::from("data");
        Self {
            train: DataSource::csv(data_dir.join(format!("emnist-{}-train.csv", split.name()))),
            test: DataSource::csv(data_dir.join(format!("emnist-{}-test.csv", split.name()))),
            data_dir,
            train_url: None,
            test_url: None,
            split,
            n_features: IMAGE_PIXELS,
            fix_orientation: false,
            excluded_letters: None,
            train_quota: SubsampleQuota::new(500, 500),
            test_quota: SubsampleQuota::new(100, 100),
            seed: 42,
            scaling: ScalingMethod::default(),
            svm: SvcParams::default(),
            grid: ParamGrid::default(),
            cv: CvConfig::default(),
            tune: false,
            refit: true,
            model_path: None,
            report_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(SVMError::IoError)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config, or the file at `path` when given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_features == 0 {
            return Err(SVMError::InvalidParameter(
                "n_features must be positive".to_string(),
            ));
        }
        if self.train_quota.per_digit == 0 && self.train_quota.non_digit_total == 0 {
            return Err(SVMError::InvalidParameter(
                "training quota selects no samples".to_string(),
            ));
        }
        if let CvConfig::StratifiedKFold { k, .. } = self.cv {
            if k < 2 {
                return Err(SVMError::InvalidParameter(format!(
                    "k-fold needs k >= 2, got {k}"
                )));
            }
        }
        self.scaling.validate()?;
        self.svm.validate()?;
        self.grid.validate()?;
        Ok(())
    }

    /// Letters to drop, resolved against the split
    pub fn excluded_letters(&self) -> Vec<char> {
        self.excluded_letters
            .clone()
            .unwrap_or_else(|| self.split.ambiguous_letters())
    }

    /// Configured download URLs, in train / test order
    pub fn download_urls(&self) -> Vec<String> {
        self.train_url
            .iter()
            .chain(self.test_url.iter())
            .cloned()
            .collect()
    }
}
