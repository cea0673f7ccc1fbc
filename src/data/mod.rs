//! Data loading for the EMNIST files
//!
//! Two on-disk layouts are supported: the CSV export (label then pixels)
//! and the original IDX binary pairs.

pub mod csv;
pub mod dataset;
pub mod emnist;
pub mod idx;

pub use self::csv::*;
pub use self::dataset::*;
pub use self::emnist::*;
pub use self::idx::load_idx_pair;

use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk layout of a dataset split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum DataSource {
    /// One CSV file with label and pixels per row
    Csv {
        path: std::path::PathBuf,
        #[serde(default)]
        label_column: LabelColumn,
    },
    /// IDX image file plus IDX label file
    Idx {
        images: std::path::PathBuf,
        labels: std::path::PathBuf,
    },
}

impl DataSource {
    /// CSV source with the label in the first column
    pub fn csv<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Csv {
            path: path.as_ref().to_path_buf(),
            label_column: LabelColumn::First,
        }
    }

    /// Load the split; `expected_dim` is enforced for CSV rows
    pub fn load(&self, expected_dim: Option<usize>) -> Result<ImageDataset> {
        match self {
            DataSource::Csv { path, label_column } => {
                CsvImageReader::new(*label_column, expected_dim).read_file(path)
            }
            DataSource::Idx { images, labels } => load_idx_pair(images, labels),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            DataSource::Csv { path, .. } => format!("csv {}", path.display()),
            DataSource::Idx { images, labels } => {
                format!("idx {} + {}", images.display(), labels.display())
            }
        }
    }
}

/// Load a split from a path, picking the layout by extension
///
/// `.csv` files use the CSV reader; anything else is not guessable.
pub fn detect_source(path: &Path) -> Option<DataSource> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Some(DataSource::csv(path)),
        _ => None,
    }
}
