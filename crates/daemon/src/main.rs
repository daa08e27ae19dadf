// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rbd fencing daemon (rbd-fenced)
//!
//! Watches instance lifecycle in one cloud region and releases the rbd
//! image locks of instances that stop or terminate.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use fence_daemon::config::DaemonConfig;
use fence_daemon::{lifecycle, parse_tag, Config, LifecycleError, Overrides};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "rbd-fenced",
    version,
    about = "Release rbd image locks held by stopped or terminated instances"
)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Cloud region to watch
    #[arg(long)]
    region: Option<String>,

    /// AWS CLI profile
    #[arg(long)]
    profile: Option<String>,

    /// Only watch instances carrying this tag (repeatable)
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// Polling interval, e.g. "20s"
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Only release locks in this pool
    #[arg(long)]
    pool: Option<String>,

    /// Exclusive PID lock file
    #[arg(long, value_name = "PATH")]
    lock_path: Option<PathBuf>,

    /// Log file (stderr when absent)
    #[arg(long, value_name = "PATH")]
    log_path: Option<PathBuf>,

    /// Log filter, e.g. "info" or "fence_engine=debug"
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            region: self.region.clone(),
            profile: self.profile.clone(),
            tags: self.tags.clone(),
            interval: self.interval,
            pool: self.pool.clone(),
            lock_path: self.lock_path.clone(),
            log_path: self.log_path.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?.with_overrides(args.overrides())?;

    // Set up logging
    let log_guard = setup_logging(&config.daemon)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "starting rbd-fenced"
    );

    // Start daemon
    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to start daemon");
            drop(log_guard);
            return Err(e.into());
        }
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("daemon ready");

    let failure = tokio::select! {
        e = daemon.wait() => {
            error!(error = %e, "background task stopped, shutting down");
            Some(e)
        }

        // Graceful shutdown on SIGTERM
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
            None
        }

        // Graceful shutdown on SIGINT
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
            None
        }
    };

    daemon.shutdown().await?;
    info!("daemon stopped");
    drop(log_guard);

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let writer: Box<dyn Write + Send> = match &config.log_path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| LifecycleError::LogPath(path.clone()))?;
            // Create log directory if needed
            std::fs::create_dir_all(dir)?;
            Box::new(tracing_appender::rolling::never(dir, file_name))
        }
        None => Box::new(std::io::stderr()),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(config.log_path.is_none()),
        )
        .init();

    Ok(guard)
}
