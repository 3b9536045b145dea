// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A kernel log entry that passed the watcher's filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelLog {
    /// Message text with surrounding whitespace removed
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
