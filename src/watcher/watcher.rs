// SPDX-License-Identifier: Apache-2.0

//! Kernel log watcher
//!
//! Reads raw messages from a kmsg source on a background task, drops empty and
//! stale ones, and publishes the rest on a bounded stream.

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::kmsg::{KMSG_DEVICE_PATH, KmsgSource, RawKmsg};
use crate::watcher::clock::{Clock, SystemClock};
use crate::watcher::config::{DEFAULT_QUEUE_SIZE, WatcherConfig};
use crate::watcher::error::{Result, WatcherError};
use crate::watcher::record::KernelLog;
use crate::watcher::stop::StopCoordinator;
use chrono::TimeDelta;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on waiting for a closed source to wind down during stop
const SOURCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct KernelLogWatcher {
    config: WatcherConfig,
    queue_size: usize,
    device_path: PathBuf,
    // injected source; when absent the kmsg device is opened on watch()
    source: Option<Arc<dyn KmsgSource>>,
    clock: Arc<dyn Clock>,
    running: Option<RunningWorker>,
}

struct RunningWorker {
    source: Arc<dyn KmsgSource>,
    stop: StopCoordinator,
    handle: JoinHandle<()>,
}

impl KernelLogWatcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            queue_size: DEFAULT_QUEUE_SIZE,
            device_path: PathBuf::from(KMSG_DEVICE_PATH),
            source: None,
            clock: Arc::new(SystemClock),
            running: None,
        }
    }

    /// Read from `source` instead of the kmsg device. Skips the device
    /// presence check.
    pub fn with_source(mut self, source: Arc<dyn KmsgSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Capacity of the published stream (minimum 1)
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Device checked for, and opened, when no source was injected
    pub fn with_device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.device_path = path.into();
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.stop.is_done())
    }

    /// Start watching and return the stream of kernel logs.
    ///
    /// Returns `Ok(None)` without spawning anything when no source was
    /// injected and the kmsg device does not exist on this host, whatever the
    /// configuration holds. Startup failures (bad lookback, source cannot be
    /// created or read) are returned before any record is published. Must be
    /// called within a tokio runtime; it never waits on the worker.
    pub fn watch(&mut self) -> Result<Option<BoundedReceiver<KernelLog>>> {
        if let Some(running) = &self.running {
            if !running.stop.is_done() {
                return Err(WatcherError::AlreadyRunning);
            }
            // previous worker ended on its own
            self.running = None;
        }

        if self.source.is_none() && device_missing(&self.device_path) {
            info!(
                device_path = %self.device_path.display(),
                "kmsg device not found, kernel log watcher is not supported on this host"
            );
            return Ok(None);
        }

        let lookback = self
            .config
            .lookback()
            .map_err(|e| WatcherError::InvalidLookback {
                lookback: self.config.lookback.clone(),
                source: e,
            })?;

        let source = match &self.source {
            Some(source) => source.clone(),
            None => open_device_source(&self.device_path)?,
        };

        let raw = source.parse().map_err(WatcherError::SourceRead)?;

        let (logs_tx, logs_rx) = bounded(self.queue_size);
        let stop = StopCoordinator::new();
        let worker = Worker {
            source: source.clone(),
            raw,
            logs: logs_tx,
            lookback,
            clock: self.clock.clone(),
            stop: stop.clone(),
        };

        info!(
            lookback = %self.config.lookback,
            queue_size = self.queue_size,
            "Kernel log watcher starting"
        );
        let handle = tokio::spawn(worker.run());

        self.running = Some(RunningWorker {
            source,
            stop,
            handle,
        });

        Ok(Some(logs_rx))
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// On return the published stream is closed and the source released. A
    /// worker blocked on a full stream only observes the stop once a consumer
    /// makes room. Does nothing when the watcher is not running. If the returned
    /// future is dropped early, the stop is already requested and a later call
    /// resumes waiting.
    pub async fn stop(&mut self) {
        let Some(running) = &mut self.running else {
            debug!("Kernel log watcher is not running");
            return;
        };

        if let Err(e) = running.source.close() {
            warn!(error = %e, "Failed to close kmsg source");
        }
        running.stop.request_stop();
        running.stop.wait_done().await;

        if let Err(e) = (&mut running.handle).await {
            error!(error = %e, "Kernel log watcher task failed");
        }
        self.running = None;
        info!("Kernel log watcher stopped");
    }
}

impl Drop for KernelLogWatcher {
    fn drop(&mut self) {
        // Cannot wait here; let the worker wind down on its own
        if let Some(running) = self.running.take() {
            if let Err(e) = running.source.close() {
                warn!(error = %e, "Failed to close kmsg source");
            }
            running.stop.request_stop();
        }
    }
}

fn device_missing(path: &Path) -> bool {
    // Other stat errors (e.g. permissions) surface when the device is opened
    matches!(std::fs::metadata(path), Err(e) if e.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(target_os = "linux")]
fn open_device_source(path: &Path) -> Result<Arc<dyn KmsgSource>> {
    let source = crate::kmsg::DeviceKmsgSource::open_path(path)
        .map_err(WatcherError::SourceCreate)?;
    Ok(Arc::new(source))
}

#[cfg(not(target_os = "linux"))]
fn open_device_source(path: &Path) -> Result<Arc<dyn KmsgSource>> {
    Err(WatcherError::SourceCreate(crate::kmsg::KmsgError::Io(
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("reading {} is only supported on Linux", path.display()),
        ),
    )))
}

/// Apply the emptiness and age filters to a raw message.
///
/// Age is measured on the untrimmed message; a message exactly `lookback` old
/// is kept.
pub fn filter_message(msg: RawKmsg, lookback: TimeDelta, clock: &dyn Clock) -> Option<KernelLog> {
    if msg.message.is_empty() {
        return None;
    }

    let age = clock.since(msg.timestamp);
    if age > lookback {
        debug!(
            text = %msg.message,
            timestamp = %msg.timestamp,
            age = %age,
            lookback = %lookback,
            "Discarding kernel message for being too old"
        );
        return None;
    }

    Some(KernelLog {
        message: msg.message.trim().to_string(),
        timestamp: msg.timestamp,
    })
}

/// Marks the coordinator done when the worker exits, including on panic.
struct DoneOnDrop(StopCoordinator);

impl Drop for DoneOnDrop {
    fn drop(&mut self) {
        self.0.mark_done();
    }
}

struct Worker {
    source: Arc<dyn KmsgSource>,
    raw: BoundedReceiver<RawKmsg>,
    logs: BoundedSender<KernelLog>,
    lookback: TimeDelta,
    clock: Arc<dyn Clock>,
    stop: StopCoordinator,
}

impl Worker {
    async fn run(self) {
        // Declared first so it fires after the stream below has been closed
        let done = DoneOnDrop(self.stop.clone());
        let Worker {
            source,
            mut raw,
            logs,
            lookback,
            clock,
            stop,
        } = self;

        loop {
            select! {
                biased;

                _ = stop.stopping() => {
                    info!("Stop watching kernel log");
                    close_and_drain(source.as_ref(), &mut raw).await;
                    break;
                }

                msg = raw.next() => {
                    let Some(msg) = msg else {
                        info!("Kmsg source ended, stop watching kernel log");
                        break;
                    };
                    trace!(text = %msg.message, timestamp = %msg.timestamp, "Got kernel message");

                    let Some(log) = filter_message(msg, lookback, clock.as_ref()) else {
                        continue;
                    };

                    // Blocks while the stream is full
                    if logs.send(log).await.is_err() {
                        info!("Kernel log stream has no consumers, stop watching kernel log");
                        close_and_drain(source.as_ref(), &mut raw).await;
                        break;
                    }
                }
            }
        }

        drop(logs);
        drop(done);
    }
}

async fn close_and_drain(source: &dyn KmsgSource, raw: &mut BoundedReceiver<RawKmsg>) {
    if let Err(e) = source.close() {
        warn!(error = %e, "Failed to close kmsg source");
    }

    let drained = tokio::time::timeout(SOURCE_DRAIN_TIMEOUT, async {
        while raw.next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for kmsg source to close");
    }
}
