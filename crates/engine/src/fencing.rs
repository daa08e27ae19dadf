// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing coordinator: revokes storage locks held by instances that are
//! stopping or gone

use crate::error::{EngineError, FenceError};
use fence_adapters::{LockInventory, UnlockReport};
use fence_core::{
    EventReceiver, HostDirectory, InstanceId, StateMask, StateTransitionEvent, Subscription,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};

/// Bounded retry schedule for one fencing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed delay between failed attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// A completed fencing sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOutcome {
    pub instance: InstanceId,
    pub address: Ipv4Addr,
    /// Attempt that succeeded, starting at 1
    pub attempts: u32,
    pub report: UnlockReport,
}

/// Subscribes to at-risk states and unlocks everything the instance's last
/// known address holds.
///
/// Each event is fenced on its own task; sequences for different instances
/// run concurrently. At most one sequence runs per instance at a time.
#[derive(Clone)]
pub struct FencingCoordinator<L> {
    inventory: L,
    hosts: HostDirectory,
    policy: RetryPolicy,
    in_flight: Arc<Mutex<HashSet<InstanceId>>>,
}

/// Claim on an instance for the length of one sequence; released on drop
struct InFlight {
    set: Arc<Mutex<HashSet<InstanceId>>>,
    instance: InstanceId,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<InstanceId>>>, instance: &InstanceId) -> Option<Self> {
        let claimed = set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(instance.clone());
        claimed.then(|| Self {
            set: Arc::clone(set),
            instance: instance.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.instance);
    }
}

impl<L: LockInventory> FencingCoordinator<L> {
    pub fn new(inventory: L, hosts: HostDirectory, policy: RetryPolicy) -> Self {
        Self {
            inventory,
            hosts,
            policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn subscription() -> Subscription {
        Subscription::new(StateMask::AT_RISK, "fencing coordinator")
    }

    /// Run one fencing sequence for `event`.
    ///
    /// The instance is forgotten once the sequence concludes, whatever the
    /// outcome, so it is only fenced again after a fresh running event. An
    /// address relearned while the sequence ran is kept.
    pub async fn fence(&self, event: &StateTransitionEvent) -> Result<FenceOutcome, FenceError> {
        let Some(_claim) = InFlight::claim(&self.in_flight, event.instance_id()) else {
            return Err(FenceError::InProgress(event.instance_id().clone()));
        };
        self.sequence(event).await
    }

    /// Fence an instance the caller has already claimed
    async fn sequence(&self, event: &StateTransitionEvent) -> Result<FenceOutcome, FenceError> {
        let instance = event.instance_id().clone();
        let Some(entry) = self.hosts.entry(&instance) else {
            return Err(FenceError::AddressUnknown(instance));
        };
        let address = entry.address;

        tracing::info!(%instance, %address, state = %event.current(), "fencing instance");
        let result = self.unlock_with_retry(address).await;
        if !self.hosts.forget_if(&instance, entry.generation) {
            tracing::info!(%instance, "address relearned during fencing, keeping it");
        }

        let (attempts, report) = result?;
        Ok(FenceOutcome {
            instance,
            address,
            attempts,
            report,
        })
    }

    /// Succeeds only when an attempt returns without error
    async fn unlock_with_retry(
        &self,
        address: Ipv4Addr,
    ) -> Result<(u32, UnlockReport), FenceError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inventory.unlock_client(address).await {
                Ok(report) => return Ok((attempt, report)),
                Err(e) if e.is_fatal() => return Err(FenceError::Fatal(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(FenceError::Exhausted {
                        address,
                        attempts: attempt,
                        last_error: e,
                    })
                }
                Err(e) => {
                    tracing::warn!(
                        %address,
                        attempt,
                        max_attempts,
                        error = %e,
                        "unlock attempt failed, backing off"
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }
    }

    /// Fence every event received until the subscription closes.
    ///
    /// Returns early with `EngineError::Fatal` when a sequence hits a fatal
    /// storage failure; sequences still in flight are aborted.
    pub async fn run(self, mut events: EventReceiver) -> Result<(), EngineError> {
        let mut tasks: JoinSet<Finished> = JoinSet::new();

        loop {
            tokio::select! {
                received = events.recv() => {
                    let Some(event) = received else { break };
                    let Some(claim) = InFlight::claim(&self.in_flight, event.instance_id()) else {
                        tracing::debug!(
                            instance = %event.instance_id(),
                            state = %event.current(),
                            "fencing already in progress"
                        );
                        continue;
                    };
                    let coordinator = self.clone();
                    tasks.spawn(async move {
                        let result = coordinator.sequence(&event).await;
                        drop(claim);
                        (event, result)
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    settle(joined)?;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            settle(joined)?;
        }
        tracing::debug!("fencing coordinator stopped");
        Ok(())
    }
}

type Finished = (StateTransitionEvent, Result<FenceOutcome, FenceError>);

/// Log a finished sequence; only fatal failures propagate
fn settle(joined: Result<Finished, JoinError>) -> Result<(), EngineError> {
    let (event, result) = match joined {
        Ok(finished) => finished,
        Err(e) => {
            tracing::error!(error = %e, "fencing task failed");
            return Ok(());
        }
    };

    match result {
        Ok(outcome) => tracing::info!(
            instance = %outcome.instance,
            address = %outcome.address,
            attempts = outcome.attempts,
            unlocked = outcome.report.unlocked.len(),
            failures = outcome.report.failures,
            "instance fenced"
        ),
        Err(FenceError::InProgress(instance)) => {
            tracing::debug!(%instance, state = %event.current(), "fencing already in progress");
        }
        Err(FenceError::AddressUnknown(instance)) => {
            // An earlier at-risk transition already fenced and forgot it
            if event.previous().is_some_and(|p| StateMask::AT_RISK.accepts(p)) {
                tracing::debug!(%instance, state = %event.current(), "already fenced");
            } else {
                tracing::warn!(
                    %instance,
                    state = %event.current(),
                    "no address known, cannot fence"
                );
            }
        }
        Err(FenceError::Fatal(source)) => {
            tracing::error!(
                instance = %event.instance_id(),
                error = %source,
                "fatal fencing failure"
            );
            return Err(EngineError::Fatal {
                instance: event.instance_id().clone(),
                source,
            });
        }
        Err(e) => tracing::error!(instance = %event.instance_id(), error = %e, "fencing failed"),
    }
    Ok(())
}

#[cfg(test)]
#[path = "fencing_tests.rs"]
mod tests;
