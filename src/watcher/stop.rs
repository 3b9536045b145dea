// SPDX-License-Identifier: Apache-2.0

//! Two-signal shutdown handshake between the watcher and its worker.
//!
//! The owner requests a stop, the worker observes it at its next wait point,
//! and once the worker has released everything it marks itself done. The
//! owner waits on that second signal.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Running,
    Stopping,
    Done,
}

/// Cloneable handle; all clones observe the same signals.
#[derive(Debug, Clone, Default)]
pub struct StopCoordinator {
    stopping: CancellationToken,
    done: CancellationToken,
}

impl StopCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop. Idempotent.
    pub fn request_stop(&self) {
        self.stopping.cancel();
    }

    /// Resolves once a stop has been requested.
    pub fn stopping(&self) -> WaitForCancellationFuture<'_> {
        self.stopping.cancelled()
    }

    /// Called by the worker after it has released its resources. Also unblocks
    /// waiters when the worker exits without a stop request.
    pub fn mark_done(&self) {
        self.done.cancel();
    }

    pub async fn wait_done(&self) {
        self.done.cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn state(&self) -> StopState {
        if self.done.is_cancelled() {
            StopState::Done
        } else if self.stopping.is_cancelled() {
            StopState::Stopping
        } else {
            StopState::Running
        }
    }
}
