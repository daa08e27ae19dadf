// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compute instance identity and lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Opaque cloud instance identifier (e.g. `i-0abc123`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state reported by the cloud provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Unknown,
}

impl InstanceState {
    pub const ALL: [InstanceState; 7] = [
        InstanceState::Running,
        InstanceState::Stopping,
        InstanceState::Stopped,
        InstanceState::ShuttingDown,
        InstanceState::Terminated,
        InstanceState::Pending,
        InstanceState::Unknown,
    ];

    /// Map a cloud state name onto the lifecycle enum.
    ///
    /// Unrecognised names map to `Unknown` rather than failing.
    pub fn from_cloud_name(name: &str) -> Self {
        match name {
            "running" => InstanceState::Running,
            "stopped" => InstanceState::Stopped,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "pending" => InstanceState::Pending,
            "shutting-down" => InstanceState::ShuttingDown,
            _ => InstanceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Unknown => "unknown",
        }
    }

    /// The single interest flag for this state
    pub fn flag(&self) -> StateMask {
        match self {
            InstanceState::Running => StateMask::RUNNING,
            InstanceState::Stopping => StateMask::STOPPING,
            InstanceState::Stopped => StateMask::STOPPED,
            InstanceState::ShuttingDown => StateMask::SHUTTING_DOWN,
            InstanceState::Terminated => StateMask::TERMINATED,
            InstanceState::Pending => StateMask::PENDING,
            InstanceState::Unknown => StateMask::UNKNOWN,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags::bitflags! {
    /// Set of lifecycle states a subscriber is interested in.
    ///
    /// The bit layout matches the historic integer filter encoding
    /// (running = 1, stopping = 2, ... unknown = 64).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateMask: u8 {
        const RUNNING = 1 << 0;
        const STOPPING = 1 << 1;
        const STOPPED = 1 << 2;
        const SHUTTING_DOWN = 1 << 3;
        const TERMINATED = 1 << 4;
        const PENDING = 1 << 5;
        const UNKNOWN = 1 << 6;

        /// States in which an instance may have lost its storage session
        const AT_RISK = Self::STOPPING.bits()
            | Self::STOPPED.bits()
            | Self::SHUTTING_DOWN.bits()
            | Self::TERMINATED.bits();
    }
}

impl StateMask {
    /// Whether an event in `state` should be delivered to this mask
    pub fn accepts(&self, state: InstanceState) -> bool {
        self.intersects(state.flag())
    }

    /// States contained in this mask, in flag order
    pub fn states(&self) -> impl Iterator<Item = InstanceState> + '_ {
        InstanceState::ALL
            .into_iter()
            .filter(move |s| self.contains(s.flag()))
    }
}

impl From<InstanceState> for StateMask {
    fn from(state: InstanceState) -> Self {
        state.flag()
    }
}

impl FromIterator<InstanceState> for StateMask {
    fn from_iter<I: IntoIterator<Item = InstanceState>>(iter: I) -> Self {
        iter.into_iter()
            .fold(StateMask::empty(), |mask, s| mask | s.flag())
    }
}

impl fmt::Display for StateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.states().map(|s| s.as_str()).collect();
        f.write_str(&names.join(","))
    }
}

/// Last known view of one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    /// Private network address, absent while pending or after termination
    pub address: Option<Ipv4Addr>,
    pub state: InstanceState,
}

impl InstanceRecord {
    pub fn new(id: impl Into<InstanceId>, address: Option<Ipv4Addr>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            address,
            state,
        }
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
