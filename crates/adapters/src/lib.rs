// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the external tools the agent drives: the cloud API and the
//! storage cluster's command line tools

pub mod cloud;
pub mod command;
pub mod storage;
pub mod traced;

pub use cloud::{AwsCliConfig, AwsCliDirectory, CloudError, InstanceDirectory};
pub use command::{CommandError, CommandRunner, ProcessRunner, DEFAULT_COMMAND_TIMEOUT};
pub use storage::{
    LockError, LockInventory, LockOwner, LockType, RbdCli, StorageImage, StoragePool,
    StorageTools, UnlockReport,
};
pub use traced::{TracedInstanceDirectory, TracedLockInventory};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use cloud::{DirectoryCall, FakeInstanceDirectory};
#[cfg(any(test, feature = "test-support"))]
pub use command::{FakeCommandRunner, FakeResponse};
#[cfg(any(test, feature = "test-support"))]
pub use storage::{FakeLockInventory, LockCall};
