//! Error types for drift detection
//!
//! Provides a unified error type for all drift-detect crates.

use thiserror::Error;

/// Core error type for drift detection
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter provided to a detector or test
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Insufficient data for the requested operation
    #[error("Insufficient data: expected at least {expected} samples, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    /// Numerical computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// A user-supplied model failed to produce predictions
    #[error("Model error: {0}")]
    Model(String),

    /// Threading or parallelization error
    #[error("Execution error: {0}")]
    Execution(String),

    /// Config (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (for config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error for empty input
    pub fn empty_input(operation: &str) -> Self {
        tracing::debug!("empty input passed to {operation}");
        Self::InsufficientData {
            expected: 1,
            actual: 0,
        }
    }

    /// Create an error for a significance level outside (0, 1)
    pub fn invalid_p_value(p: f64) -> Self {
        Self::InvalidParameter(format!("p-value threshold {p} must be in (0, 1)"))
    }

    /// Create an error for size mismatch
    pub fn size_mismatch(expected: usize, actual: usize, context: &str) -> Self {
        Self::InvalidInput(format!(
            "Size mismatch in {context}: expected {expected}, got {actual}"
        ))
    }

    /// Create an error for NaN/Inf values
    pub fn non_finite(context: &str) -> Self {
        Self::Computation(format!("{context} contains NaN or infinite values"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidParameter("n_permutations must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid parameter: n_permutations must be positive"
        );

        let err = Error::InsufficientData { expected: 2, actual: 1 };
        assert_eq!(
            err.to_string(),
            "Insufficient data: expected at least 2 samples, got 1"
        );

        let err = Error::Model("classifier returned 3 rows for 4 inputs".to_string());
        assert_eq!(
            err.to_string(),
            "Model error: classifier returned 3 rows for 4 inputs"
        );
    }

    #[test]
    fn test_error_helper_functions() {
        match Error::empty_input("ks test") {
            Error::InsufficientData { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 0);
            }
            _ => panic!("Wrong error type"),
        }

        assert_eq!(
            Error::invalid_p_value(1.5).to_string(),
            "Invalid parameter: p-value threshold 1.5 must be in (0, 1)"
        );
        assert_eq!(
            Error::size_mismatch(3, 2, "feature count").to_string(),
            "Invalid input: Size mismatch in feature count: expected 3, got 2"
        );
        assert_eq!(
            Error::non_finite("reference data").to_string(),
            "Computation error: reference data contains NaN or infinite values"
        );
    }

    #[test]
    fn test_error_from_serde_and_anyhow() {
        let parse_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));

        let err: Error = anyhow::anyhow!("custom failure").into();
        assert!(matches!(err, Error::Other(_)));
        assert!(err.to_string().contains("custom failure"));
    }
}
