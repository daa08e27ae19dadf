// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance state transition events

use crate::instance::{InstanceId, InstanceRecord, InstanceState, StateMask};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A lifecycle transition observed by the poller.
///
/// Immutable once built; subscribers receive clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransitionEvent {
    previous: Option<InstanceState>,
    record: InstanceRecord,
    observed_at: DateTime<Utc>,
}

impl StateTransitionEvent {
    /// First sighting of an instance
    pub fn observed(record: InstanceRecord) -> Self {
        Self {
            previous: None,
            record,
            observed_at: Utc::now(),
        }
    }

    /// A known instance moved from `previous` to `record.state`
    pub fn changed(previous: InstanceState, record: InstanceRecord) -> Self {
        Self {
            previous: Some(previous),
            record,
            observed_at: Utc::now(),
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.record.id
    }

    /// State before the transition, `None` for a newly observed instance
    pub fn previous(&self) -> Option<InstanceState> {
        self.previous
    }

    pub fn current(&self) -> InstanceState {
        self.record.state
    }

    /// Snapshot of the instance as of the new state
    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Flag used for subscriber matching (always the new state's flag)
    pub fn flag(&self) -> StateMask {
        self.record.state.flag()
    }
}

impl fmt::Display for StateTransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.previous {
            Some(previous) => write!(
                f,
                "{}: {} -> {}",
                self.record.id, previous, self.record.state
            ),
            None => write!(f, "{}: new ({})", self.record.id, self.record.state),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
