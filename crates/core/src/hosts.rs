// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory of last known instance addresses

use crate::instance::InstanceId;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Address of an instance together with the write that recorded it.
///
/// Every `learn` stamps a fresh generation, so a relearned address can be
/// told apart from the entry it replaced even when the address is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEntry {
    pub address: Ipv4Addr,
    pub generation: u64,
}

#[derive(Default)]
struct Hosts {
    entries: HashMap<InstanceId, HostEntry>,
    next_generation: u64,
}

/// Maps instance ids to the address they were last seen running with.
///
/// Entries are written when an instance is seen running and removed once a
/// fencing sequence for it has finished. Clones share the same map.
#[derive(Clone, Default)]
pub struct HostDirectory {
    hosts: Arc<Mutex<Hosts>>,
}

impl HostDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Hosts> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the address of a running instance, returning the address it
    /// replaced (if any)
    pub fn learn(&self, id: InstanceId, address: Ipv4Addr) -> Option<Ipv4Addr> {
        let mut hosts = self.lock();
        hosts.next_generation += 1;
        let entry = HostEntry {
            address,
            generation: hosts.next_generation,
        };
        hosts.entries.insert(id, entry).map(|old| old.address)
    }

    pub fn lookup(&self, id: &InstanceId) -> Option<Ipv4Addr> {
        self.entry(id).map(|e| e.address)
    }

    /// Current entry for an instance, including its generation
    pub fn entry(&self, id: &InstanceId) -> Option<HostEntry> {
        self.lock().entries.get(id).copied()
    }

    /// Drop an instance; it only comes back through `learn`
    pub fn forget(&self, id: &InstanceId) -> Option<Ipv4Addr> {
        self.lock().entries.remove(id).map(|e| e.address)
    }

    /// Drop an instance only if its entry is still the one stamped with
    /// `generation`. Returns whether it was removed.
    pub fn forget_if(&self, id: &InstanceId, generation: u64) -> bool {
        let mut hosts = self.lock();
        match hosts.entries.get(id) {
            Some(entry) if entry.generation == generation => {
                hosts.entries.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.lock().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current mapping
    pub fn snapshot(&self) -> HashMap<InstanceId, Ipv4Addr> {
        self.lock()
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.address))
            .collect()
    }
}

impl std::fmt::Debug for HostDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostDirectory")
            .field("hosts", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "hosts_tests.rs"]
mod tests;
