//! SVM solver implementations
//!
//! Sequential Minimal Optimization (SMO) for the binary soft-margin dual.

pub mod smo;

pub use self::smo::*;
