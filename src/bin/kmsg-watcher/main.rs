// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use kmsg_watcher::init::args::WatchRun;
use kmsg_watcher::watcher::KernelLog;
use std::io::Write;
use std::process::ExitCode;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::timeout;
use tower::BoxError;
use tracing::metadata::LevelFilter;
use tracing::{error, info, warn};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Watch the kernel log and write fresh entries to stdout as JSON lines
    Start(Box<WatchRun>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "kmsg-watcher")]
#[command(bin_name = "kmsg-watcher")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "KMSG_WATCHER_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(run)) => {
            let _guard = match setup_logging(&opt.log_format) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("ERROR: failed to setup logging: {}", e);
                    return ExitCode::from(1);
                }
            };

            if let Err(e) = run_watcher(run) {
                error!(error = %e, "Failed to run kernel log watcher.");
                return ExitCode::from(1);
            }
        }
        None => {
            // it shouldn't be possible to get here since we mark a subcommand as
            // required
            eprintln!("ERROR: must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_watcher(run: Box<WatchRun>) -> Result<(), BoxError> {
    let mut watcher = run.watcher.build_watcher()?;

    let Some(mut logs) = watcher.watch()? else {
        info!("Nothing to watch, exiting.");
        return Ok(());
    };

    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;
    let mut out = std::io::LineWriter::new(std::io::stdout());

    loop {
        select! {
            _ = sig_term.recv() => {
                info!("Shutdown signal received.");
                break;
            }
            _ = sig_int.recv() => {
                info!("Shutdown signal received.");
                break;
            }
            log = logs.next() => {
                match log {
                    Some(log) => write_log(&mut out, &log)?,
                    None => {
                        warn!("Kernel log stream closed unexpectedly.");
                        break;
                    }
                }
            }
        }
    }

    // Drain concurrently so a full stream cannot hold up the stop
    let drain = tokio::spawn(async move {
        while logs.next().await.is_some() {}
    });

    timeout(run.shutdown_timeout, watcher.stop())
        .await
        .map_err(|_| "timed out waiting for kernel log watcher to stop")?;
    let _ = drain.await;

    Ok(())
}

fn write_log(out: &mut impl Write, log: &KernelLog) -> Result<(), BoxError> {
    serde_json::to_writer(&mut *out, log)?;
    out.write_all(b"\n")?;
    Ok(())
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    // stdout carries the kernel log records
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), get_version());
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io::IsTerminal;
        let use_ansi = std::io::stderr().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_write_log_json_line() {
        let log = KernelLog {
            message: "EXT4-fs error (device sda1)".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap(),
        };
        let mut out = Vec::new();

        write_log(&mut out, &log).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"message\":\"EXT4-fs error (device sda1)\",\"timestamp\":\"2024-02-03T04:05:06Z\"}\n"
        );
    }

    #[test]
    fn test_parse_start_args() {
        let args = Arguments::try_parse_from([
            "kmsg-watcher",
            "--log-format",
            "json",
            "start",
            "--lookback",
            "5m",
        ])
        .unwrap();

        assert_eq!(args.log_format, LogFormatArg::Json);
        match args.command {
            Some(Commands::Start(run)) => {
                assert_eq!(run.watcher.lookback.as_deref(), Some("5m"));
                assert_eq!(run.shutdown_timeout, std::time::Duration::from_secs(10));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
