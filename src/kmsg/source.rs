// SPDX-License-Identifier: Apache-2.0

//! The source abstraction the watcher reads raw kernel messages from.

use crate::bounded_channel::{BoundedReceiver, BoundedSender, SendError, bounded};
use crate::kmsg::error::{KmsgError, Result};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

/// A raw kernel message as produced by a source, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKmsg {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RawKmsg {
    pub fn new(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }
}

/// Producer of a live sequence of kernel messages.
///
/// `parse` starts the continuous read and hands back the stream; it may be
/// called once per source. `close` ends the stream (after any buffered
/// messages) and releases the underlying resource. `close` must be safe to call
/// more than once and from a different task than the one reading the stream.
pub trait KmsgSource: Send + Sync {
    fn parse(&self) -> Result<BoundedReceiver<RawKmsg>>;

    fn close(&self) -> Result<()>;
}

/// In-memory source fed through [`ChannelKmsgSource::push`]. Used to replay
/// captured messages and to drive the watcher in tests.
pub struct ChannelKmsgSource {
    state: Mutex<ChannelState>,
}

struct ChannelState {
    tx: Option<BoundedSender<RawKmsg>>,
    rx: Option<BoundedReceiver<RawKmsg>>,
    close_calls: usize,
}

impl ChannelKmsgSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            state: Mutex::new(ChannelState {
                tx: Some(tx),
                rx: Some(rx),
                close_calls: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        // state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a message. Waits while the stream is full and fails once the
    /// source has been closed or the reader is gone.
    pub async fn push(&self, msg: RawKmsg) -> std::result::Result<(), SendError> {
        let tx = self.lock().tx.clone();
        match tx {
            Some(tx) => tx.send(msg).await,
            None => Err(SendError::Disconnected),
        }
    }

    /// Messages pushed but not yet taken by the reader.
    pub fn pending(&self) -> usize {
        self.lock().tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().tx.is_none()
    }

    /// Number of times `close` has been invoked.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

impl KmsgSource for ChannelKmsgSource {
    fn parse(&self) -> Result<BoundedReceiver<RawKmsg>> {
        self.lock().rx.take().ok_or(KmsgError::AlreadyParsing)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.close_calls += 1;
        state.tx = None;
        Ok(())
    }
}
