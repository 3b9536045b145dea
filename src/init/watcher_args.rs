// SPDX-License-Identifier: Apache-2.0

use crate::init::parse::deser_into_string_opt;
use crate::kmsg::KMSG_DEVICE_PATH;
use crate::watcher::{DEFAULT_QUEUE_SIZE, KernelLogWatcher, WatcherConfig, WatcherConfigError};
use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherArgs {
    /// JSON watcher config file with `startPattern` and `lookback` keys
    #[arg(long = "config", env = "KMSG_WATCHER_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Maximum age of forwarded kernel messages, e.g. 5m or 1h30m.
    /// Overrides the config file. Unset means messages must not be older than now.
    #[arg(long, env = "KMSG_WATCHER_LOOKBACK")]
    #[serde(deserialize_with = "deser_into_string_opt")]
    pub lookback: Option<String>,

    /// Pattern of the first kernel line to watch from (reserved, no effect)
    #[arg(long, env = "KMSG_WATCHER_START_PATTERN")]
    pub start_pattern: Option<String>,

    /// Capacity of the kernel log stream
    #[arg(long, env = "KMSG_WATCHER_QUEUE_SIZE", default_value_t = DEFAULT_QUEUE_SIZE)]
    pub queue_size: usize,

    /// Kernel message device
    #[arg(long, env = "KMSG_WATCHER_DEVICE_PATH", default_value = KMSG_DEVICE_PATH)]
    pub device_path: PathBuf,
}

impl Default for WatcherArgs {
    fn default() -> Self {
        Self {
            config_file: None,
            lookback: None,
            start_pattern: None,
            queue_size: DEFAULT_QUEUE_SIZE,
            device_path: PathBuf::from(KMSG_DEVICE_PATH),
        }
    }
}

impl WatcherArgs {
    /// Config file values, with command line and environment overrides applied.
    pub fn build_config(&self) -> Result<WatcherConfig, WatcherConfigError> {
        let mut config = match &self.config_file {
            Some(path) => WatcherConfig::from_file(path)?,
            None => WatcherConfig::default(),
        };

        if let Some(lookback) = &self.lookback {
            config.lookback = lookback.clone();
        }
        if let Some(start_pattern) = &self.start_pattern {
            config.start_pattern = start_pattern.clone();
        }

        Ok(config)
    }

    pub fn build_watcher(&self) -> Result<KernelLogWatcher, WatcherConfigError> {
        Ok(KernelLogWatcher::new(self.build_config()?)
            .with_queue_size(self.queue_size)
            .with_device_path(self.device_path.clone()))
    }
}
