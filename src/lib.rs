//! Digit vs. non-digit detection on EMNIST with a pure Rust SVM
//!
//! The binary solver is Platt's SMO; multiclass problems are reduced
//! one-vs-one. Around it sit the EMNIST loaders, class filtering and
//! subsampling, pixel rescaling, metrics and a grid search.

pub mod api;
pub mod cache;
pub mod config;
pub mod core;
pub mod data;
pub mod download;
pub mod kernel;
pub mod metrics;
pub mod multiclass;
pub mod optimizer;
pub mod persistence;
pub mod pipeline;
pub mod prep;
pub mod search;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{ModelInfo, Svc, SvcParams, TrainedSvc};
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::config::PipelineConfig;
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{Result, SVMError};
pub use crate::data::{EmnistSplit, ImageDataset, IMAGE_PIXELS, NON_DIGIT_CLASS};
pub use crate::kernel::{Gamma, Kernel, KernelChoice, KernelFunction};
pub use crate::metrics::{ConfusionMatrix, EvaluationMetrics};
pub use crate::multiclass::OneVsOne;
pub use crate::optimizer::{SVMOptimizer, TrainedSVM};
pub use crate::pipeline::{Pipeline, PipelineReport};
pub use crate::search::{GridSearch, ParamGrid, PredefinedSplit};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
