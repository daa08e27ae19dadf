// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rbd-unlock - release every rbd image lock held by one client address

use anyhow::{Context, Result};
use clap::Parser;
use fence_adapters::{LockInventory, ProcessRunner, RbdCli, StorageTools, TracedLockInventory};
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "rbd-unlock",
    version,
    about = "Release every rbd image lock held by one client address"
)]
struct Cli {
    /// Address of the client whose locks are released
    #[arg(short, long)]
    address: Ipv4Addr,

    /// Only scan this pool
    #[arg(long)]
    pool: Option<String>,

    /// Path to the rbd tool
    #[arg(long, default_value = "rbd")]
    rbd_path: String,

    /// Path to the ceph tool
    #[arg(long, default_value = "ceph")]
    ceph_path: String,

    /// Per-command timeout, e.g. "10s"
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let tools = StorageTools {
        ceph: cli.ceph_path,
        rbd: cli.rbd_path,
        timeout: cli.timeout,
        pool: cli.pool,
    };
    let inventory = TracedLockInventory::new(RbdCli::new(ProcessRunner::new(), tools));

    let report = inventory
        .unlock_client(cli.address)
        .await
        .with_context(|| format!("failed to release locks held by {}", cli.address))?;

    println!(
        "unlocked {} image(s) held by {}",
        report.unlocked.len(),
        cli.address
    );
    for image in &report.unlocked {
        println!("  {}", image);
    }
    if report.failures > 0 {
        tracing::warn!(
            address = %cli.address,
            failures = report.failures,
            "some pools or images could not be checked"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
