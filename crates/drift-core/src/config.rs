//! JSON persistence for detector configs
//!
//! Configs hold the numeric knobs of a detector. Reference data, models and
//! preprocessing closures are supplied again when a detector is rebuilt.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Serialize a config to a JSON string
pub fn to_json_string<C: Serialize>(config: &C) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// Parse a config from a JSON string
pub fn from_json_str<C: DeserializeOwned>(json: &str) -> Result<C> {
    Ok(serde_json::from_str(json)?)
}

/// Write a config to `path` as JSON
pub fn save_config<C: Serialize>(config: &C, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, to_json_string(config)?)?;
    debug!("Saved detector config to {}", path.display());
    Ok(())
}

/// Read a config from a JSON file
pub fn load_config<C: DeserializeOwned>(path: impl AsRef<Path>) -> Result<C> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    debug!("Loaded detector config from {}", path.display());
    from_json_str(&json)
}
