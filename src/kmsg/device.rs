// SPDX-License-Identifier: Apache-2.0

//! Kmsg source backed by the `/dev/kmsg` character device.
//!
//! The device is read from the start of the ring buffer; the watcher's
//! lookback decides how much history is forwarded.

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::kmsg::KMSG_DEVICE_PATH;
use crate::kmsg::error::{KmsgError, Result};
use crate::kmsg::parser::{get_boot_time, parse_kmsg_line};
use crate::kmsg::source::{KmsgSource, RawKmsg};
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// A single record is bounded by CONSOLE_EXT_LOG_MAX (8KB) including
/// dictionary lines. A smaller buffer makes the read fail with EINVAL.
const READ_BUF_SIZE: usize = 8192;

/// Raw records buffered between the device reader and the watcher
const RAW_QUEUE_SIZE: usize = 1000;

pub struct DeviceKmsgSource {
    path: PathBuf,
    boot_time: DateTime<Utc>,
    // taken by `parse`, or dropped by `close` if never read
    file: Mutex<Option<File>>,
    cancel: CancellationToken,
}

impl DeviceKmsgSource {
    /// Open [`KMSG_DEVICE_PATH`].
    pub fn open() -> Result<Self> {
        Self::open_path(KMSG_DEVICE_PATH)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;

        // Computed once so that every record of this session shares one origin
        let boot_time = get_boot_time()?;

        info!(
            device_path = %path.display(),
            boot_time = %boot_time,
            "Opened kmsg device"
        );

        Ok(Self {
            path,
            boot_time,
            file: Mutex::new(Some(file)),
            cancel: CancellationToken::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn boot_time(&self) -> DateTime<Utc> {
        self.boot_time
    }

    fn file(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KmsgSource for DeviceKmsgSource {
    /// Must be called from within a tokio runtime.
    fn parse(&self) -> Result<BoundedReceiver<RawKmsg>> {
        if self.cancel.is_cancelled() {
            return Err(KmsgError::Closed);
        }
        let file = self.file().take().ok_or(KmsgError::AlreadyParsing)?;
        let async_fd = AsyncFd::with_interest(file, Interest::READABLE)?;

        let (tx, rx) = bounded(RAW_QUEUE_SIZE);
        tokio::spawn(read_device(
            async_fd,
            self.boot_time,
            tx,
            self.cancel.clone(),
        ));

        Ok(rx)
    }

    fn close(&self) -> Result<()> {
        self.cancel.cancel();
        // Not yet handed to a reader, release it here
        self.file().take();
        Ok(())
    }
}

/// Result of attempting to read from kmsg
enum ReadResult {
    Record(RawKmsg),
    /// No more data available (EAGAIN)
    WouldBlock,
    /// EINTR, retry
    Interrupted,
    /// Ring buffer overrun (EPIPE), the next read resumes at the oldest
    /// record still available
    Overflow,
    Eof,
    Error(std::io::Error),
    /// Parse or UTF-8 error, logged and skipped
    Skipped,
}

fn read_one_record(fd: i32, buf: &mut [u8], boot_time: DateTime<Utc>) -> ReadResult {
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };

    if n < 0 {
        let err = std::io::Error::last_os_error();
        return match err.kind() {
            std::io::ErrorKind::WouldBlock => ReadResult::WouldBlock,
            std::io::ErrorKind::Interrupted => ReadResult::Interrupted,
            std::io::ErrorKind::BrokenPipe => {
                warn!("Kernel ring buffer overrun, some kernel messages were lost");
                ReadResult::Overflow
            }
            _ => ReadResult::Error(err),
        };
    }

    if n == 0 {
        return ReadResult::Eof;
    }

    let record = match std::str::from_utf8(&buf[..n as usize]) {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in kmsg: {}", e);
            return ReadResult::Skipped;
        }
    };

    let parsed = parse_kmsg_line(record)
        .and_then(|line| line.wall_clock(boot_time).map(|timestamp| (line, timestamp)));
    match parsed {
        Ok((line, timestamp)) => {
            trace!(
                sequence = line.sequence,
                level = line.level(),
                text = %line.message,
                "Read kmsg record"
            );
            ReadResult::Record(RawKmsg::new(line.message, timestamp))
        }
        Err(e) => {
            warn!("Failed to parse kmsg record: {}", e);
            ReadResult::Skipped
        }
    }
}

/// Push one record, giving up if the source is closed while waiting for room.
/// Returns false when reading should stop.
async fn forward(
    tx: &BoundedSender<RawKmsg>,
    cancel: &CancellationToken,
    record: RawKmsg,
) -> bool {
    select! {
        biased;

        _ = cancel.cancelled() => false,
        res = tx.send(record) => match res {
            Ok(()) => true,
            Err(_) => {
                debug!("Kmsg stream has no reader, stopping device read");
                false
            }
        },
    }
}

async fn read_device(
    async_fd: AsyncFd<File>,
    boot_time: DateTime<Utc>,
    tx: BoundedSender<RawKmsg>,
    cancel: CancellationToken,
) {
    let mut read_buf = vec![0u8; READ_BUF_SIZE];

    'read: loop {
        select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Kmsg device source closed");
                break;
            }

            ready_result = async_fd.readable() => {
                let mut guard = match ready_result {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!("AsyncFd readable error: {}", e);
                        break;
                    }
                };

                let fd = guard.get_inner().as_raw_fd();
                loop {
                    match read_one_record(fd, &mut read_buf, boot_time) {
                        ReadResult::Record(record) => {
                            if !forward(&tx, &cancel, record).await {
                                break 'read;
                            }
                        }
                        ReadResult::Interrupted
                        | ReadResult::Skipped
                        | ReadResult::Overflow => continue,
                        ReadResult::WouldBlock | ReadResult::Eof => {
                            guard.clear_ready();
                            break;
                        }
                        ReadResult::Error(e) => {
                            error!("Error reading from kmsg: {}", e);
                            break 'read;
                        }
                    }
                }
            }
        }
    }

    // Release the device before the stream reports closed
    drop(async_fd);
    drop(tx);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let result = DeviceKmsgSource::open_path("/nonexistent/kmsg");
        assert!(matches!(result, Err(KmsgError::Io(_))));
    }

    #[tokio::test]
    async fn test_close_before_parse() {
        // Any readable file works for exercising the lifecycle
        let file = tempfile::NamedTempFile::new().unwrap();
        let source = match DeviceKmsgSource::open_path(file.path()) {
            Ok(source) => source,
            // no /proc/uptime on this host
            Err(KmsgError::BootTime(_)) => return,
            Err(e) => panic!("unexpected error: {}", e),
        };

        assert_eq!(source.path(), file.path());

        source.close().unwrap();
        source.close().unwrap();
        assert!(matches!(source.parse(), Err(KmsgError::Closed)));
    }
}
