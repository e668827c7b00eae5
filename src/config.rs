//! Engine configuration

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the pipeline engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Evaluate independent terms of one layer on the rayon pool
    pub parallel: bool,
    /// Sessions per chunk for chunked runs
    pub chunk_size: Option<usize>,
    /// Upper bound on the lookback a compiled plan may require
    pub max_lookback: usize,
    /// Drop rows whose every output is missing
    pub drop_all_missing_rows: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            chunk_size: None,
            max_lookback: 2520,
            drop_all_missing_rows: true,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == Some(0) {
            return Err(PipelineError::ConfigError(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.max_lookback == 0 {
            return Err(PipelineError::ConfigError(
                "max_lookback must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
