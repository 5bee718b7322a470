//! Result types shared by every drift detector

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector metadata attached to every prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Detector name, e.g. `KsDrift`
    pub name: String,
    /// Always `drift` for the detectors in this workspace
    pub detector_type: String,
    /// Whether the detector processes one instance at a time
    pub online: bool,
    /// Optional user tag describing the input data (`tabular`, `image`, ...)
    pub data_type: Option<String>,
    /// Crate version that produced the prediction
    pub version: String,
    /// Compute backend
    pub backend: String,
}

impl Meta {
    /// Metadata for an offline drift detector
    pub fn new(name: impl Into<String>, data_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            detector_type: "drift".to_string(),
            online: false,
            data_type,
            version: crate::VERSION.to_string(),
            backend: "rust".to_string(),
        }
    }
}

/// Drift decision, either for the whole batch or per feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DriftFlag {
    /// One decision for the batch
    Batch(bool),
    /// One decision per feature
    Feature(Vec<bool>),
}

impl DriftFlag {
    /// True if drift was flagged anywhere
    pub fn any(&self) -> bool {
        match self {
            DriftFlag::Batch(flag) => *flag,
            DriftFlag::Feature(flags) => flags.iter().any(|&f| f),
        }
    }

    /// Per-feature flags, if this is a feature-level decision
    pub fn per_feature(&self) -> Option<&[bool]> {
        match self {
            DriftFlag::Batch(_) => None,
            DriftFlag::Feature(flags) => Some(flags),
        }
    }
}

impl fmt::Display for DriftFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftFlag::Batch(flag) => write!(f, "{}", if *flag { "drift" } else { "no drift" }),
            DriftFlag::Feature(flags) => {
                let drifted = flags.iter().filter(|&&x| x).count();
                write!(f, "{drifted}/{} features drifted", flags.len())
            }
        }
    }
}

/// A drift prediction: detector metadata plus detector-specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPrediction<D> {
    /// Detector metadata
    pub meta: Meta,
    /// Test outcome
    pub data: D,
}

impl<D> DriftPrediction<D> {
    pub fn new(meta: Meta, data: D) -> Self {
        Self { meta, data }
    }
}

impl<D: Serialize> DriftPrediction<D> {
    /// Serialize the prediction as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<D: fmt::Display> fmt::Display for DriftPrediction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Drift Prediction ({}):", self.meta.name)?;
        write!(f, "{}", self.data)
    }
}
