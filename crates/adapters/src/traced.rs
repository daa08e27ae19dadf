// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::cloud::{CloudError, InstanceDirectory};
use crate::storage::{
    LockError, LockInventory, LockOwner, StorageImage, StoragePool, UnlockReport,
};
use async_trait::async_trait;
use fence_core::{InstanceId, InstanceRecord};
use std::net::Ipv4Addr;
use tracing::Instrument;

/// Wrapper that adds tracing to any LockInventory
#[derive(Clone)]
pub struct TracedLockInventory<L> {
    inner: L,
}

impl<L> TracedLockInventory<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<L: LockInventory> LockInventory for TracedLockInventory<L> {
    async fn list_pools(&self) -> Result<Vec<StoragePool>, LockError> {
        let result = self.inner.list_pools().await;
        match &result {
            Ok(pools) => tracing::debug!(count = pools.len(), "listed pools"),
            Err(e) => tracing::error!(error = %e, "listing pools failed"),
        }
        result
    }

    async fn list_images(&self, pool: &StoragePool) -> Result<Vec<StorageImage>, LockError> {
        let result = self.inner.list_images(pool).await;
        tracing::trace!(
            pool = %pool.name,
            count = result.as_ref().map(|v| v.len()).ok(),
            "listed images"
        );
        result
    }

    async fn lock_owner(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<Option<LockOwner>, LockError> {
        let result = self.inner.lock_owner(image, pool).await;
        tracing::trace!(
            pool = %pool.name,
            image = %image.name,
            owner = ?result.as_ref().ok().and_then(|o| o.as_ref().map(|o| o.address)),
            "resolved lock owner"
        );
        result
    }

    async fn unlock_image(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<(), LockError> {
        let span =
            tracing::info_span!("storage.unlock_image", pool = %pool.name, image = %image.name);
        async {
            let result = self.inner.unlock_image(image, pool).await;
            match &result {
                Ok(()) => tracing::info!("lock removed"),
                Err(e) => tracing::warn!(error = %e, "unlock failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn unlock_client(&self, address: Ipv4Addr) -> Result<UnlockReport, LockError> {
        let span = tracing::info_span!("storage.unlock_client", %address);
        async {
            tracing::info!("releasing locks");

            let start = std::time::Instant::now();
            let result = self.inner.unlock_client(address).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(report) => tracing::info!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    pools = report.pools_scanned,
                    images = report.images_checked,
                    unlocked = report.unlocked.len(),
                    failures = report.failures,
                    "scan complete"
                ),
                Err(e) => tracing::error!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "scan failed"
                ),
            }

            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any InstanceDirectory
#[derive(Clone)]
pub struct TracedInstanceDirectory<D> {
    inner: D,
}

impl<D> TracedInstanceDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }
}

fn log_listing(kind: &'static str, result: &Result<Vec<InstanceRecord>, CloudError>) {
    match result {
        Ok(instances) => tracing::debug!(kind, count = instances.len(), "listed instances"),
        Err(e) => tracing::warn!(kind, error = %e, "listing instances failed"),
    }
}

#[async_trait]
impl<D: InstanceDirectory> InstanceDirectory for TracedInstanceDirectory<D> {
    async fn list_all(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        let result = self.inner.list_all().await;
        log_listing("all", &result);
        result
    }

    async fn list_running(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        let result = self.inner.list_running().await;
        log_listing("running", &result);
        result
    }

    async fn list_terminated(&self) -> Result<Vec<InstanceRecord>, CloudError> {
        let result = self.inner.list_terminated().await;
        log_listing("terminated", &result);
        result
    }

    async fn exists(&self, id: &InstanceId) -> Result<bool, CloudError> {
        let result = self.inner.exists(id).await;
        tracing::trace!(instance = %id, exists = ?result.as_ref().ok(), "checked");
        result
    }

    async fn terminate(&self, id: &InstanceId) -> Result<(), CloudError> {
        let span = tracing::info_span!("cloud.terminate", instance = %id);
        async {
            let result = self.inner.terminate(id).await;
            match &result {
                Ok(()) => tracing::info!("terminate requested"),
                Err(e) => tracing::error!(error = %e, "terminate failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
