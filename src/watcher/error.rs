// SPDX-License-Identifier: Apache-2.0

use crate::kmsg::KmsgError;
use crate::watcher::duration::DurationError;
use thiserror::Error;

/// Startup failures of the watcher. None of these are retried; the embedding
/// process decides whether to exit.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("failed to parse lookback {lookback:?}: {source}")]
    InvalidLookback {
        lookback: String,
        source: DurationError,
    },

    #[error("failed to create kmsg source: {0}")]
    SourceCreate(KmsgError),

    #[error("failed to read from kmsg source: {0}")]
    SourceRead(KmsgError),

    #[error("kernel log watcher is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, WatcherError>;
