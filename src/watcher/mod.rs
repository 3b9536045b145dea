// SPDX-License-Identifier: Apache-2.0

//! Kernel log watcher
//!
//! Consumes raw kernel messages from a [`KmsgSource`](crate::kmsg::KmsgSource),
//! discards empty and stale entries, and republishes the remaining ones as
//! [`KernelLog`] records on a bounded stream.

pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod record;
pub mod stop;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{DEFAULT_QUEUE_SIZE, WatcherConfig, WatcherConfigError};
pub use duration::{DurationError, parse_duration};
pub use error::{Result, WatcherError};
pub use record::KernelLog;
pub use stop::{StopCoordinator, StopState};
pub use watcher::{KernelLogWatcher, filter_message};
