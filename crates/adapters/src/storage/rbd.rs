// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock inventory backed by the `ceph` and `rbd` command line tools

use super::parse::{parse_images, parse_lock_owner, parse_pools};
use super::{LockError, LockInventory, LockOwner, StorageImage, StoragePool, UnlockReport};
use crate::command::{CommandRunner, DEFAULT_COMMAND_TIMEOUT};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Locations and limits for the storage tools
#[derive(Debug, Clone)]
pub struct StorageTools {
    pub ceph: String,
    pub rbd: String,
    pub timeout: Duration,
    /// Restrict unlock scans to this pool; `None` scans every pool
    pub pool: Option<String>,
}

impl Default for StorageTools {
    fn default() -> Self {
        Self {
            ceph: "ceph".to_string(),
            rbd: "rbd".to_string(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            pool: None,
        }
    }
}

/// rbd/ceph CLI lock inventory
#[derive(Clone)]
pub struct RbdCli<R> {
    runner: R,
    tools: StorageTools,
}

impl<R: CommandRunner> RbdCli<R> {
    pub fn new(runner: R, tools: StorageTools) -> Self {
        Self { runner, tools }
    }

    async fn rbd(&self, args: &[&str]) -> Result<String, LockError> {
        Ok(self
            .runner
            .execute(self.tools.timeout, &self.tools.rbd, args)
            .await?)
    }

    fn in_scope(&self, pool: &StoragePool) -> bool {
        match self.tools.pool.as_deref() {
            None | Some("") => true,
            Some(name) => pool.name == name,
        }
    }

    /// Check one image and remove its lock if `address` holds it.
    ///
    /// Returns whether a lock was removed.
    async fn release_if_held(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
        address: Ipv4Addr,
    ) -> Result<bool, LockError> {
        let Some(owner) = self.lock_owner(image, pool).await? else {
            tracing::debug!(pool = %pool.name, image = %image.name, "locked image lists no holder");
            return Ok(false);
        };
        if owner.address != address {
            tracing::trace!(
                pool = %pool.name,
                image = %image.name,
                %owner,
                "held by another client"
            );
            return Ok(false);
        }
        tracing::debug!(
            pool = %pool.name,
            image = %image.name,
            %address,
            "client holds image lock, removing"
        );
        self.remove_lock(image, pool, &owner).await?;
        Ok(true)
    }

    async fn remove_lock(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
        owner: &LockOwner,
    ) -> Result<(), LockError> {
        self.rbd(&[
            "-p",
            &pool.name,
            "lock",
            "remove",
            &image.name,
            &owner.lock_id,
            &owner.client_id,
        ])
        .await?;
        Ok(())
    }
}

#[async_trait]
impl<R: CommandRunner> LockInventory for RbdCli<R> {
    async fn list_pools(&self) -> Result<Vec<StoragePool>, LockError> {
        let output = self
            .runner
            .execute(
                self.tools.timeout,
                &self.tools.ceph,
                &["osd", "lspools", "-f", "json"],
            )
            .await?;
        parse_pools(&output)
    }

    async fn list_images(&self, pool: &StoragePool) -> Result<Vec<StorageImage>, LockError> {
        let output = self
            .rbd(&["-p", &pool.name, "ls", "-l", "--format", "json"])
            .await?;
        parse_images(&output)
    }

    async fn lock_owner(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<Option<LockOwner>, LockError> {
        let output = self
            .rbd(&["-p", &pool.name, "lock", "list", &image.name])
            .await?;
        Ok(parse_lock_owner(&output))
    }

    async fn unlock_image(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<(), LockError> {
        tracing::info!(pool = %pool.name, image = %image.name, "removing image lock");
        let owner = self
            .lock_owner(image, pool)
            .await?
            .ok_or_else(|| LockError::NoLockOwner {
                pool: pool.name.clone(),
                image: image.name.clone(),
            })?;
        self.remove_lock(image, pool, &owner).await
    }

    async fn unlock_client(&self, address: Ipv4Addr) -> Result<UnlockReport, LockError> {
        tracing::debug!(%address, "scanning for locks held by client");
        let mut report = UnlockReport::default();

        let pools = self.list_pools().await?;
        for pool in pools.iter().filter(|p| self.in_scope(p)) {
            report.pools_scanned += 1;

            let images = match self.list_images(pool).await {
                Ok(images) => images,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(pool = %pool.name, error = %e, "failed to list images");
                    report.failures += 1;
                    continue;
                }
            };

            for image in &images {
                if image.snapshot.is_some() {
                    continue;
                }
                report.images_checked += 1;
                if !image.is_locked() {
                    tracing::trace!(pool = %pool.name, image = %image.name, "not locked, skipping");
                    continue;
                }

                match self.release_if_held(image, pool, address).await {
                    Ok(true) => {
                        tracing::info!(
                            pool = %pool.name,
                            image = %image.name,
                            %address,
                            "removed lock held by client"
                        );
                        report.unlocked.push(format!("{}/{}", pool.name, image.name));
                    }
                    Ok(false) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(
                            pool = %pool.name,
                            image = %image.name,
                            error = %e,
                            "failed to release image lock"
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
#[path = "rbd_tests.rs"]
mod tests;
