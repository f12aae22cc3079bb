//! Indexer configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LogDataError, Result};

/// Default number of bytes read per scan chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default tab stop used when measuring and expanding lines.
pub const DEFAULT_TAB_STOP: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogDataConfig {
    /// Bytes read between progress reports and cancellation checks.
    pub chunk_size: usize,
    /// Column multiple a tab advances to.
    pub tab_stop: usize,
}

impl Default for LogDataConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tab_stop: DEFAULT_TAB_STOP,
        }
    }
}

impl LogDataConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|error| LogDataError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(LogDataError::Config("chunk_size must be > 0".to_string()));
        }
        if self.tab_stop == 0 {
            return Err(LogDataError::Config("tab_stop must be > 0".to_string()));
        }
        Ok(())
    }
}
