// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum KmsgError {
    /// A line read from the device did not match the kmsg record layout
    Parse(String),
    /// The boot time needed to place kernel timestamps on the wall clock
    /// could not be determined
    BootTime(String),
    /// The source was asked to start reading a second time
    AlreadyParsing,
    /// The source was closed before it was read
    Closed,
    Io(io::Error),
}

impl fmt::Display for KmsgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KmsgError::Parse(s) => write!(f, "Parse error: {}", s),
            KmsgError::BootTime(s) => write!(f, "Boot time error: {}", s),
            KmsgError::AlreadyParsing => write!(f, "kmsg source is already being read"),
            KmsgError::Closed => write!(f, "kmsg source is closed"),
            KmsgError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for KmsgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KmsgError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for KmsgError {
    fn from(err: io::Error) -> Self {
        KmsgError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, KmsgError>;
