// SPDX-License-Identifier: Apache-2.0

//! Linux kernel message (kmsg) sources
//!
//! A source turns the kernel ring buffer into a stream of raw
//! `{message, timestamp}` pairs. The device-backed source reads `/dev/kmsg`
//! and is only available on Linux.

#[cfg(target_os = "linux")]
pub mod device;
pub mod error;
pub mod parser;
pub mod source;

#[cfg(target_os = "linux")]
pub use device::DeviceKmsgSource;
pub use error::{KmsgError, Result};
pub use source::{ChannelKmsgSource, KmsgSource, RawKmsg};

/// Path to the kernel message device
pub const KMSG_DEVICE_PATH: &str = "/dev/kmsg";
