// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, supervision, shutdown.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fence_adapters::{
    AwsCliDirectory, InstanceDirectory, LockInventory, ProcessRunner, RbdCli,
    TracedInstanceDirectory, TracedLockInventory,
};
use fence_core::{EventBus, HostDirectory, SubscriberId};
use fence_engine::{AddressTracker, EngineError, FencingCoordinator, InstancePoller};
use fs2::FileExt;
use thiserror::Error;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{error, info, warn};

use crate::config::{Config, ConfigError};

/// Cloud directory used in production (wrapped with tracing)
pub type DaemonDirectory = TracedInstanceDirectory<AwsCliDirectory<ProcessRunner>>;

/// Lock inventory used in production (wrapped with tracing)
pub type DaemonInventory = TracedLockInventory<RbdCli<ProcessRunner>>;

/// How long shutdown waits for in-flight fencing sequences
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to acquire lock {0}: another agent already running?")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("invalid log path: {0}")]
    LogPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0} task exited unexpectedly")]
    TaskExited(&'static str),

    #[error("{task} task failed: {source}")]
    TaskFailed {
        task: &'static str,
        source: tokio::task::JoinError,
    },
}

/// What a background task returned
enum TaskExit {
    Poller,
    Tracker,
    Fencing(Result<(), EngineError>),
}

impl TaskExit {
    fn name(&self) -> &'static str {
        match self {
            TaskExit::Poller => "poller",
            TaskExit::Tracker => "address tracker",
            TaskExit::Fencing(_) => "fencing",
        }
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    lock_file: Option<File>,
    pub bus: EventBus,
    pub hosts: HostDirectory,
    tasks: JoinSet<TaskExit>,
    poller: AbortHandle,
    subscriptions: Vec<SubscriberId>,
    pub start_time: Instant,
}

impl DaemonState {
    /// Wait for a background task to stop. A healthy daemon never returns
    /// from this; any return is a reason to exit non-zero.
    pub async fn wait(&mut self) -> LifecycleError {
        match self.tasks.join_next().await {
            Some(Ok(TaskExit::Fencing(Err(e)))) => LifecycleError::Engine(e),
            Some(Ok(exit)) => LifecycleError::TaskExited(exit.name()),
            Some(Err(source)) => LifecycleError::TaskFailed {
                task: "background",
                source,
            },
            None => LifecycleError::TaskExited("every"),
        }
    }

    /// Shutdown the daemon gracefully
    ///
    /// Polling stops at once; fencing sequences already running are given
    /// `SHUTDOWN_GRACE` to finish.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");

        // 1. Stop producing events
        self.poller.abort();

        // 2. Close subscriptions so the consumers drain and exit
        for id in &self.subscriptions {
            self.bus.unsubscribe(id);
        }

        // 3. Wait for in-flight fencing
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(TaskExit::Fencing(Err(e))) => {
                        error!(error = %e, "fencing stopped with error")
                    }
                    Ok(exit) => info!(task = exit.name(), "task stopped"),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "task failed during shutdown"),
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!("fencing still in flight after grace period, aborting");
            self.tasks.shutdown().await;
        }

        // 4. Remove PID file; the lock is released when the file is dropped
        if let Some(path) = &self.config.daemon.lock_path {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove lock file");
            }
        }
        self.lock_file.take();

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "daemon shutdown complete"
        );
        Ok(())
    }
}

/// Start the daemon against the real cloud and storage tools
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    let runner = ProcessRunner::new();
    let directory: DaemonDirectory =
        TracedInstanceDirectory::new(AwsCliDirectory::new(runner.clone(), config.aws()));
    let inventory: DaemonInventory =
        TracedLockInventory::new(RbdCli::new(runner, config.storage_tools()));
    startup_with(config, directory, inventory).await
}

/// Start the daemon with the given adapters
pub async fn startup_with<D, L>(
    config: &Config,
    directory: D,
    inventory: L,
) -> Result<DaemonState, LifecycleError>
where
    D: InstanceDirectory,
    L: LockInventory,
{
    // 1. Acquire lock file FIRST - prevents two agents fencing the same hosts
    let lock_file = match &config.daemon.lock_path {
        Some(path) => Some(acquire_lock(path)?),
        None => None,
    };

    match startup_inner(config, directory, inventory).await {
        Ok(mut state) => {
            state.lock_file = lock_file;
            Ok(state)
        }
        Err(e) => {
            // Clean up the PID file we created
            if let Some(path) = &config.daemon.lock_path {
                let _ = std::fs::remove_file(path);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - the lock file is removed if this fails
async fn startup_inner<D, L>(
    config: &Config,
    directory: D,
    inventory: L,
) -> Result<DaemonState, LifecycleError>
where
    D: InstanceDirectory,
    L: LockInventory,
{
    let bus = EventBus::with_capacity(config.bus.queue_capacity);
    let hosts = HostDirectory::new();

    // 2. Bootstrap the instance cache; running fenceless is not an option
    let mut poller = InstancePoller::new(directory, bus.clone());
    poller
        .bootstrap(
            config.poller.bootstrap_attempts,
            config.poller.bootstrap_delay,
        )
        .await?;

    // 3. Seed addresses of instances already running before we started
    for (id, address) in poller.running_hosts() {
        hosts.learn(id, address);
    }
    info!(instances = poller.len(), hosts = hosts.len(), "seeded host directory");

    // 4. Subscribe consumers before any event can be published
    let tracker_rx = bus.subscribe(AddressTracker::subscription());
    let fencing_rx = bus.subscribe(FencingCoordinator::<L>::subscription());
    let subscriptions = vec![tracker_rx.id().clone(), fencing_rx.id().clone()];

    // 5. Spawn the background tasks
    let mut tasks = JoinSet::new();
    let tracker = AddressTracker::new(hosts.clone());
    tasks.spawn(async move {
        tracker.run(tracker_rx).await;
        TaskExit::Tracker
    });
    let coordinator = FencingCoordinator::new(inventory, hosts.clone(), config.retry_policy());
    tasks.spawn(async move { TaskExit::Fencing(coordinator.run(fencing_rx).await) });
    let interval = config.poller.interval;
    let poller = tasks.spawn(async move {
        poller.run(interval).await;
        TaskExit::Poller
    });

    info!(
        region = %config.cloud.region,
        interval_secs = interval.as_secs_f64(),
        pool = config.storage.pool.as_deref().unwrap_or("*"),
        "daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file: None,
        bus,
        hosts,
        tasks,
        poller,
        subscriptions,
        start_time: Instant::now(),
    })
}

/// Open (without truncating) and exclusively lock the PID file
fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|e| LifecycleError::LockFailed(path.to_path_buf(), e))?;

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
