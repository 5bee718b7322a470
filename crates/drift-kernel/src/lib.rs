//! Kernel two-sample drift detectors
//!
//! - [`MmdDrift`]: maximum mean discrepancy with a permutation test
//! - [`ContextMmdDrift`]: MMD between conditional distributions given a
//!   context, with context-aware label redraws for the null
//!
//! Both default to a Gaussian RBF kernel whose bandwidth comes from the
//! median heuristic. Permutations run on the [`DefaultEngine`](drift_core::DefaultEngine),
//! which is rayon-backed with the `parallel` feature.
//!
//! # Example
//!
//! ```rust
//! use drift_core::DriftDetector;
//! use drift_kernel::{MmdConfig, MmdDrift};
//! use nalgebra::DMatrix;
//!
//! let x_ref = DMatrix::from_fn(50, 2, |i, j| ((i * 13 + j * 7) % 50) as f64 / 50.0);
//! let config = MmdConfig::default().with_seed(0).with_n_permutations(50);
//! let mut cd = MmdDrift::from_config(x_ref.clone(), config).unwrap();
//!
//! let pred = cd.predict(&x_ref.map(|v| v + 1.0)).unwrap();
//! assert!(pred.data.is_drift);
//! ```

pub mod config;
pub mod context;
pub mod kernel;
pub mod mmd;

pub use config::{ContextMmdConfig, MmdConfig};
pub use context::{
    conditional_mmd, select_lambda, ContextComponents, ContextMmdDrift, ContextMmdDriftData,
    ContextMmdScore, Couplings, DomainClassifier, KernelSmoother,
};
pub use kernel::{median_heuristic_sigma, squared_distances, GaussianRbf, Kernel};
pub use mmd::{mmd2_from_kernel_matrix, MmdDrift, MmdDriftData, MmdScore};
