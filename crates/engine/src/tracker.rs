// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Learns instance addresses from running-state events

use fence_core::{EventReceiver, HostDirectory, StateMask, StateTransitionEvent, Subscription};

/// Running-state subscriber that keeps the host directory current.
///
/// Runs independently of fencing so that learning an address never waits
/// on an unlock in progress.
#[derive(Clone, Debug)]
pub struct AddressTracker {
    hosts: HostDirectory,
}

impl AddressTracker {
    pub fn new(hosts: HostDirectory) -> Self {
        Self { hosts }
    }

    pub fn subscription() -> Subscription {
        Subscription::new(StateMask::RUNNING, "address tracker")
    }

    /// Record the address carried by a running-state event.
    ///
    /// Returns whether the directory was updated.
    pub fn observe(&self, event: &StateTransitionEvent) -> bool {
        let record = event.record();
        let Some(address) = record.address else {
            tracing::warn!(instance = %record.id, "running instance has no private address");
            return false;
        };
        match self.hosts.learn(record.id.clone(), address) {
            Some(old) if old == address => {
                tracing::debug!(instance = %record.id, %address, "address already known")
            }
            Some(old) => {
                tracing::info!(instance = %record.id, %old, %address, "address changed")
            }
            None => tracing::info!(instance = %record.id, %address, "learned address"),
        }
        true
    }

    /// Consume events until the subscription closes
    pub async fn run(self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.observe(&event);
        }
        tracing::debug!("address tracker stopped");
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
