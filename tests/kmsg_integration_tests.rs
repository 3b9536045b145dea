// SPDX-License-Identifier: Apache-2.0

//! Kmsg device integration tests
//!
//! These tests require Linux with read access to /dev/kmsg (root or
//! CAP_SYSLOG) and exercise the watcher against the real kernel ring buffer.
//!
//! To run: cargo test --test kmsg_integration_tests --features integration-tests

#![cfg(all(target_os = "linux", feature = "integration-tests"))]

use chrono::Utc;
use kmsg_watcher::kmsg::parser::get_boot_time;
use kmsg_watcher::kmsg::{DeviceKmsgSource, KMSG_DEVICE_PATH, KmsgSource};
use kmsg_watcher::watcher::{KernelLogWatcher, WatcherConfig};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn can_read_kmsg() -> bool {
    File::open(KMSG_DEVICE_PATH).is_ok()
}

macro_rules! skip_if_no_kmsg {
    () => {
        if !can_read_kmsg() {
            eprintln!("Skipping test: cannot read /dev/kmsg (need root or CAP_SYSLOG)");
            return;
        }
    };
}

#[test]
fn test_boot_time_is_in_the_past() {
    let boot_time = get_boot_time().expect("boot time from /proc/uptime");
    assert!(boot_time < Utc::now());
}

#[tokio::test]
async fn test_device_source_replays_ring_buffer() {
    skip_if_no_kmsg!();

    let source = DeviceKmsgSource::open().expect("open /dev/kmsg");
    let mut raw = source.parse().expect("start reading");

    // the ring buffer always holds the boot messages
    let first = timeout(TEST_TIMEOUT, raw.next())
        .await
        .expect("timed out reading /dev/kmsg")
        .expect("stream ended early");
    assert!(first.timestamp >= source.boot_time());
    assert!(first.timestamp <= Utc::now());

    source.close().unwrap();
    timeout(TEST_TIMEOUT, async { while raw.next().await.is_some() {} })
        .await
        .expect("stream did not end after close");
}

#[tokio::test]
async fn test_watcher_with_large_lookback_forwards_history() {
    skip_if_no_kmsg!();

    let mut watcher = KernelLogWatcher::new(WatcherConfig::new("87600h"));
    let mut logs = watcher.watch().unwrap().expect("kmsg device is present");

    let log = timeout(TEST_TIMEOUT, logs.next())
        .await
        .expect("timed out waiting for kernel log")
        .expect("stream ended early");
    assert_eq!(log.message, log.message.trim());

    // keep draining, the ring buffer may hold more than the stream capacity
    let drain = tokio::spawn(async move { while logs.next().await.is_some() {} });

    timeout(TEST_TIMEOUT, watcher.stop())
        .await
        .expect("stop did not complete");
    timeout(TEST_TIMEOUT, drain)
        .await
        .expect("stream did not close")
        .unwrap();
}

#[tokio::test]
async fn test_injected_device_source() {
    skip_if_no_kmsg!();

    let source = Arc::new(DeviceKmsgSource::open().expect("open /dev/kmsg"));
    let mut watcher = KernelLogWatcher::new(WatcherConfig::default()).with_source(source);

    let _logs = watcher.watch().unwrap().expect("stream");
    assert!(watcher.is_running());

    timeout(TEST_TIMEOUT, watcher.stop())
        .await
        .expect("stop did not complete");
    assert!(!watcher.is_running());
}
