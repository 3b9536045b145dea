// SPDX-License-Identifier: Apache-2.0

use crate::watcher::duration::{DurationError, parse_duration};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Capacity of the published stream, large enough to absorb bursts
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Configuration of the kernel log watcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Pattern of the first line to watch from. Reserved, currently has no
    /// effect.
    pub start_pattern: String,

    /// Maximum age of a message that is still forwarded, e.g. `"5m"` or
    /// `"1h30m"`. Empty means zero.
    pub lookback: String,
}

#[derive(Error, Debug)]
pub enum WatcherConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

impl WatcherConfig {
    pub fn new(lookback: impl Into<String>) -> Self {
        Self {
            start_pattern: String::new(),
            lookback: lookback.into(),
        }
    }

    pub fn with_start_pattern(mut self, start_pattern: impl Into<String>) -> Self {
        self.start_pattern = start_pattern.into();
        self
    }

    /// Load a JSON config file with `startPattern` and `lookback` keys.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WatcherConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| WatcherConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        serde_json::from_str(&contents).map_err(|e| WatcherConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Resolve the lookback text. An unset lookback is a zero duration.
    pub fn lookback(&self) -> Result<TimeDelta, DurationError> {
        if self.lookback.is_empty() {
            return Ok(TimeDelta::zero());
        }
        parse_duration(&self.lookback)
    }
}
