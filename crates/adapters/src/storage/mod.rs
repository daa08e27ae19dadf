// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage cluster lock inventory (ceph pools, rbd images, image locks)

mod parse;
mod rbd;

pub use parse::{parse_images, parse_lock_owner, parse_pools};
pub use rbd::{RbdCli, StorageTools};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLockInventory, LockCall};

use crate::command::CommandError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A storage pool as reported by the cluster admin tool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoragePool {
    #[serde(rename = "poolnum")]
    pub id: i64,
    #[serde(rename = "poolname")]
    pub name: String,
}

impl StoragePool {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Lock state of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockType {
    #[default]
    Unlocked,
    Exclusive,
}

impl<'de> Deserialize<'de> for LockType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("exclusive") => LockType::Exclusive,
            // shared locks are not fencing targets
            _ => LockType::Unlocked,
        })
    }
}

/// A block device image within a pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageImage {
    #[serde(rename = "image")]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub format: u32,
    #[serde(default)]
    pub lock_type: LockType,
    /// Set when the listing row describes a snapshot of the image
    #[serde(default)]
    pub snapshot: Option<String>,
}

impl StorageImage {
    pub fn new(name: impl Into<String>, lock_type: LockType) -> Self {
        Self {
            name: name.into(),
            size: 0,
            format: 2,
            lock_type,
            snapshot: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_type == LockType::Exclusive
    }
}

/// Holder of an exclusive image lock.
///
/// Only ever built from a fully matched lock listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub lock_id: String,
    /// Locker name including its prefix, e.g. `client.4123`
    pub client_id: String,
    pub address: Ipv4Addr,
    pub session: String,
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock '{}' held by {} at {} (session {})",
            self.lock_id, self.client_id, self.address, self.session
        )
    }
}

/// Errors from lock inventory operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unparseable {context} output: {source}")]
    Parse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("no lock owner found for {pool}/{image}")]
    NoLockOwner { pool: String, image: String },
}

impl LockError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LockError::Command(e) if e.is_fatal())
    }
}

/// Result of a best-effort unlock scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockReport {
    pub pools_scanned: usize,
    pub images_checked: usize,
    /// `pool/image` of every lock removed
    pub unlocked: Vec<String>,
    /// Pools or images skipped because of an error
    pub failures: usize,
}

/// Discovers and removes exclusive locks on storage images
#[async_trait]
pub trait LockInventory: Clone + Send + Sync + 'static {
    /// List all pools in the cluster
    async fn list_pools(&self) -> Result<Vec<StoragePool>, LockError>;

    /// List the images in a pool
    async fn list_images(&self, pool: &StoragePool) -> Result<Vec<StorageImage>, LockError>;

    /// Current lock holder of an image, if any line of the lock listing
    /// names one. With several holders listed only the last is returned.
    async fn lock_owner(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<Option<LockOwner>, LockError>;

    /// Remove the current lock on an image
    async fn unlock_image(&self, image: &StorageImage, pool: &StoragePool)
        -> Result<(), LockError>;

    /// Remove every exclusive lock held by `address`.
    ///
    /// Best effort: per-pool and per-image failures are logged and counted,
    /// and succeeding means the scan finished, not that every matching
    /// lock was removed.
    async fn unlock_client(&self, address: Ipv4Addr) -> Result<UnlockReport, LockError>;
}
