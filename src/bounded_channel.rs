// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity channel used to hand records between the kmsg reader, the
//! watcher worker and downstream consumers.
//!
//! A full channel parks the sender until a consumer makes room. The receiving
//! side observes the channel as closed once every sender has been dropped.

use flume::{Receiver, Sender};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    /// Every receiver has been dropped
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Waits for capacity, then enqueues the item.
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        self.tx
            .send_async(item)
            .await
            .map_err(|_| SendError::Disconnected)
    }

    pub fn is_disconnected(&self) -> bool {
        self.tx.is_disconnected()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Read side of the channel. Clones share the same queue, so each item is
/// delivered to exactly one of them.
#[derive(Clone, Debug)]
pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    /// Returns `None` once the channel is drained and all senders are gone.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// True when all senders have been dropped. Buffered items may still be
    /// pending.
    pub fn is_disconnected(&self) -> bool {
        self.rx.is_disconnected()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    (BoundedSender { tx }, BoundedReceiver { rx })
}
