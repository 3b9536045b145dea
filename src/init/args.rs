// SPDX-License-Identifier: Apache-2.0

use crate::init::parse;
use crate::init::watcher_args::WatcherArgs;
use clap::Args;
use std::time::Duration;

#[derive(Debug, Args, Clone)]
pub struct WatchRun {
    #[command(flatten)]
    pub watcher: WatcherArgs,

    /// How long to wait for the watcher to stop after a shutdown signal
    #[arg(
        long,
        env = "KMSG_WATCHER_SHUTDOWN_TIMEOUT",
        default_value = "10s",
        value_parser = parse::parse_std_duration
    )]
    pub shutdown_timeout: Duration,
}
