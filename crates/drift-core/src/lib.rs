//! Core traits and types for drift detection
//!
//! This crate holds everything the detector crates share:
//!
//! - [`Error`] and [`Result`]
//! - the prediction shape ([`DriftPrediction`] = [`Meta`] + detector data)
//! - detector traits and preprocessing ([`DriftDetector`], [`Preprocessor`])
//! - reference storage and update policies ([`Reference`], [`ReferenceUpdate`])
//! - multivariate corrections ([`Correction`], [`DriftType`])
//! - permutation tests over sequential or rayon-backed engines
//! - JSON persistence of detector configs
//!
//! # Example
//!
//! ```rust
//! use drift_core::{decide, Correction, DriftType};
//!
//! // Three features, one of them clearly shifted
//! let p_vals = [0.001, 0.4, 0.8];
//! let decision = decide(&p_vals, 0.05, Correction::Bonferroni, DriftType::Batch);
//! assert!(decision.is_drift.any());
//! ```

pub mod config;
pub mod correction;
pub mod data;
pub mod error;
pub mod execution;
pub mod permutation;
pub mod reference;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

pub use correction::{check_p_value, decide, fdr, Correction, Decision, DriftType};
pub use execution::{DefaultEngine, ExecutionEngine, ExecutionStrategy, SequentialEngine};
#[cfg(feature = "parallel")]
pub use execution::ParallelEngine;
pub use permutation::{
    distance_threshold, permutation_p_value, random_permutation, rng_from_seed, PermutationTest,
};
pub use reference::{update_reference, Reference, ReferenceUpdate};
pub use traits::{DetectorProperties, DriftDetector, Preprocessor, SharedPreprocessor};
pub use types::{DriftFlag, DriftPrediction, Meta};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
