// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud instance directory

mod aws;

pub use aws::{AwsCliConfig, AwsCliDirectory};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DirectoryCall, FakeInstanceDirectory};

use crate::command::CommandError;
use async_trait::async_trait;
use fence_core::{InstanceId, InstanceRecord};
use thiserror::Error;

/// Errors from cloud directory operations
#[derive(Debug, Error)]
pub enum CloudError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unparseable instance listing: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("instance {0} does not exist in the region")]
    NotFound(InstanceId),
}

/// Request/response view of the cloud provider's instances
#[async_trait]
pub trait InstanceDirectory: Clone + Send + Sync + 'static {
    /// Every instance visible to this agent, in any state
    async fn list_all(&self) -> Result<Vec<InstanceRecord>, CloudError>;

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, CloudError>;

    async fn list_terminated(&self) -> Result<Vec<InstanceRecord>, CloudError>;

    async fn exists(&self, id: &InstanceId) -> Result<bool, CloudError>;

    /// Terminate an instance; fails with `NotFound` for unknown ids
    async fn terminate(&self, id: &InstanceId) -> Result<(), CloudError>;
}
