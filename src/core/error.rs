//! Error types for the EMNIST SVM pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SVMError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(f64),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid file format: {0}")]
    FormatError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),
}

impl From<serde_json::Error> for SVMError {
    fn from(err: serde_json::Error) -> Self {
        SVMError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for SVMError {
    fn from(err: reqwest::Error) -> Self {
        SVMError::DownloadError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SVMError>;
