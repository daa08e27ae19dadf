// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance poller: reconciles the cloud listing against a cached view and
//! publishes every lifecycle transition it detects

use crate::error::EngineError;
use fence_adapters::{CloudError, InstanceDirectory};
use fence_core::{EventBus, InstanceId, InstanceRecord, InstanceState, StateTransitionEvent};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Counts from one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub vanished: usize,
    /// Vanished instances whose last known state was not terminated
    pub anomalies: usize,
}

impl CycleReport {
    /// Number of events published
    pub fn events(&self) -> usize {
        self.new + self.changed
    }
}

/// Owns the cache of last-known instance records.
///
/// Only the poller mutates the cache; consumers learn about it through the
/// events published on the bus.
pub struct InstancePoller<D> {
    directory: D,
    bus: EventBus,
    cache: HashMap<InstanceId, InstanceRecord>,
}

impl<D: InstanceDirectory> InstancePoller<D> {
    pub fn new(directory: D, bus: EventBus) -> Self {
        Self {
            directory,
            bus,
            cache: HashMap::new(),
        }
    }

    /// Fill the cache from an initial full listing without publishing.
    ///
    /// Tries up to `attempts` times, sleeping `delay` between failures.
    /// Returns the number of cached instances.
    pub async fn bootstrap(
        &mut self,
        attempts: u32,
        delay: Duration,
    ) -> Result<usize, EngineError> {
        let attempts = attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.directory.list_all().await {
                Ok(listing) => {
                    self.cache.clear();
                    for record in listing {
                        if self.cache.contains_key(&record.id) {
                            tracing::warn!(
                                instance = %record.id,
                                "duplicate instance in listing, keeping first"
                            );
                            continue;
                        }
                        self.cache.insert(record.id.clone(), record);
                    }
                    tracing::info!(
                        instances = self.cache.len(),
                        attempt,
                        "bootstrapped instance cache"
                    );
                    return Ok(self.cache.len());
                }
                Err(e) if attempt >= attempts => {
                    tracing::error!(attempt, error = %e, "bootstrap listing failed, giving up");
                    return Err(EngineError::Bootstrap {
                        attempts,
                        last_error: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        attempts,
                        error = %e,
                        "bootstrap listing failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Fetch the current listing and reconcile it. A failed listing leaves
    /// the cache untouched.
    pub async fn poll_once(&mut self) -> Result<CycleReport, CloudError> {
        let listing = self.directory.list_all().await?;
        Ok(self.reconcile(listing))
    }

    /// Diff `listing` against the cache, update the cache and publish one
    /// event per new or changed instance, in listing order.
    pub fn reconcile(&mut self, listing: Vec<InstanceRecord>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut seen: HashSet<InstanceId> = HashSet::with_capacity(listing.len());

        for record in listing {
            if !seen.insert(record.id.clone()) {
                tracing::warn!(
                    instance = %record.id,
                    "duplicate instance in listing, keeping first"
                );
                continue;
            }

            let event = match self.cache.get_mut(&record.id) {
                None => {
                    report.new += 1;
                    self.cache.insert(record.id.clone(), record.clone());
                    StateTransitionEvent::observed(record)
                }
                Some(cached) if cached.state != record.state => {
                    report.changed += 1;
                    let previous = cached.state;
                    *cached = record.clone();
                    StateTransitionEvent::changed(previous, record)
                }
                Some(cached) => {
                    report.unchanged += 1;
                    if cached.address != record.address {
                        tracing::debug!(
                            instance = %record.id,
                            old = ?cached.address,
                            new = ?record.address,
                            "address changed without a state change"
                        );
                        cached.address = record.address;
                    }
                    tracing::trace!(instance = %record.id, state = %record.state, "unchanged");
                    continue;
                }
            };

            tracing::info!(%event, "instance transition");
            self.bus.publish(&event);
        }

        let vanished: Vec<InstanceId> = self
            .cache
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in vanished {
            let Some(last) = self.cache.remove(&id) else {
                continue;
            };
            report.vanished += 1;
            if last.state == InstanceState::Terminated {
                tracing::info!(instance = %id, "instance finally removed");
            } else {
                report.anomalies += 1;
                tracing::error!(
                    instance = %id,
                    last_state = %last.state,
                    "instance vanished without being observed terminated"
                );
            }
        }

        report
    }

    /// Cached instances that are running and have an address
    pub fn running_hosts(&self) -> Vec<(InstanceId, Ipv4Addr)> {
        self.cache
            .values()
            .filter(|r| r.state == InstanceState::Running)
            .filter_map(|r| r.address.map(|addr| (r.id.clone(), addr)))
            .collect()
    }

    pub fn cached(&self, id: &InstanceId) -> Option<&InstanceRecord> {
        self.cache.get(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Poll every `interval` until the task is aborted. Listing failures
    /// are logged and retried on the next tick.
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(report) => tracing::debug!(
                    new = report.new,
                    changed = report.changed,
                    unchanged = report.unchanged,
                    vanished = report.vanished,
                    anomalies = report.anomalies,
                    "poll cycle complete"
                ),
                Err(e) => tracing::warn!(error = %e, "instance listing failed, retrying next tick"),
            }
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
