// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the fencing engine

use fence_adapters::{CloudError, LockError};
use fence_core::InstanceId;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors from a single fencing sequence
#[derive(Debug, Error)]
pub enum FenceError {
    #[error("instance {0} is already being fenced")]
    InProgress(InstanceId),
    #[error("no address known for instance {0}")]
    AddressUnknown(InstanceId),
    #[error("unlocking {address} failed after {attempts} attempt(s): {last_error}")]
    Exhausted {
        address: Ipv4Addr,
        attempts: u32,
        last_error: LockError,
    },
    #[error("fatal storage failure: {0}")]
    Fatal(LockError),
}

impl FenceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FenceError::Fatal(_))
    }
}

/// Errors that stop the engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("initial instance listing failed after {attempts} attempt(s): {last_error}")]
    Bootstrap {
        attempts: u32,
        last_error: CloudError,
    },
    #[error("fencing {instance} hit a fatal failure: {source}")]
    Fatal {
        instance: InstanceId,
        source: LockError,
    },
}
