// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted instance directory for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CloudError, InstanceDirectory};
use crate::command::CommandError;
use async_trait::async_trait;
use fence_core::{InstanceId, InstanceRecord, InstanceState};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Recorded directory call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    ListAll,
    ListRunning,
    ListTerminated,
    Exists(InstanceId),
    Terminate(InstanceId),
}

enum Listing {
    Instances(Vec<InstanceRecord>),
    Fail(String),
}

#[derive(Default)]
struct DirectoryState {
    /// Successive listings; the last one repeats once the rest are consumed
    listings: VecDeque<Listing>,
    calls: Vec<DirectoryCall>,
}

/// Fake directory that serves a queue of listings
#[derive(Clone, Default)]
pub struct FakeInstanceDirectory {
    inner: Arc<Mutex<DirectoryState>>,
}

impl FakeInstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the next listing
    pub fn push_listing(&self, instances: Vec<InstanceRecord>) -> &Self {
        self.lock().listings.push_back(Listing::Instances(instances));
        self
    }

    /// Queue a failed listing
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.lock().listings.push_back(Listing::Fail(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.lock().calls.clone()
    }

    /// Number of listing requests of any kind
    pub fn listing_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    DirectoryCall::ListAll
                        | DirectoryCall::ListRunning
                        | DirectoryCall::ListTerminated
                )
            })
            .count()
    }

    fn next_listing(&self, call: DirectoryCall) -> Result<Vec<InstanceRecord>, CloudError> {
        let mut state = self.lock();
        state.calls.push(call);
        let popped = if state.listings.len() > 1 {
            state.listings.pop_front()
        } else {
            None
        };
        let listing = popped.as_ref().or(state.listings.front());
        match listing {
            Some(Listing::Instances(instances)) => Ok(instances.clone()),
            Some(Listing::Fail(message)) => Err(CloudError::Command(CommandError::Exited {
                program: "aws".to_string(),
                code: Some(255),
                output: message.clone(),
            })),
            None => Ok(Vec::new()),
        }
    }

    /// The listing the next request will be served from
    fn current(&self) -> Vec<InstanceRecord> {
        match self.lock().listings.front() {
            Some(Listing::Instances(instances)) => instances.clone(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl InstanceDirectory for FakeInstanceDirectory {
    async fn list_all(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        self.next_listing(DirectoryCall::ListAll)
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        let all = self.next_listing(DirectoryCall::ListRunning)?;
        Ok(all
            .into_iter()
            .filter(|i| i.state == InstanceState::Running)
            .collect())
    }

    async fn list_terminated(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        let all = self.next_listing(DirectoryCall::ListTerminated)?;
        Ok(all
            .into_iter()
            .filter(|i| i.state == InstanceState::Terminated)
            .collect())
    }

    async fn exists(&self, id: &InstanceId) -> Result<bool, CloudError> {
        self.lock().calls.push(DirectoryCall::Exists(id.clone()));
        Ok(self.current().iter().any(|i| &i.id == id))
    }

    async fn terminate(&self, id: &InstanceId) -> Result<(), CloudError> {
        self.lock().calls.push(DirectoryCall::Terminate(id.clone()));
        let mut state = self.lock();
        let Some(Listing::Instances(instances)) = state.listings.front_mut() else {
            return Err(CloudError::NotFound(id.clone()));
        };
        match instances.iter_mut().find(|i| &i.id == id) {
            Some(instance) => {
                instance.state = InstanceState::Terminated;
                Ok(())
            }
            None => Err(CloudError::NotFound(id.clone())),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
