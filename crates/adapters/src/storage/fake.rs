// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory lock inventory for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LockError, LockInventory, LockOwner, LockType, StorageImage, StoragePool, UnlockReport};
use crate::command::CommandError;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Recorded inventory call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCall {
    ListPools,
    ListImages { pool: String },
    LockOwner { pool: String, image: String },
    UnlockImage { pool: String, image: String },
    UnlockClient { address: Ipv4Addr },
}

/// Scripted outcome for `unlock_client`
#[derive(Debug, Clone)]
enum ScriptedUnlock {
    Fail(String),
    Fatal,
}

#[derive(Default)]
struct FakeState {
    /// pool name -> image name -> current owner
    pools: BTreeMap<String, BTreeMap<String, Option<LockOwner>>>,
    unlock_script: VecDeque<ScriptedUnlock>,
    unlock_delay: Option<Duration>,
    active_unlocks: usize,
    peak_unlocks: usize,
    calls: Vec<LockCall>,
}

/// Fake lock inventory holding pools and image locks in memory
#[derive(Clone, Default)]
pub struct FakeLockInventory {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an image, locked by `owner` when given
    pub fn add_image(&self, pool: &str, image: &str, owner: Option<LockOwner>) {
        self.lock()
            .pools
            .entry(pool.to_string())
            .or_default()
            .insert(image.to_string(), owner);
    }

    /// Make the next `unlock_client` call fail with an ordinary error
    pub fn fail_next_unlock(&self, message: impl Into<String>) {
        self.lock()
            .unlock_script
            .push_back(ScriptedUnlock::Fail(message.into()));
    }

    /// Make the next `unlock_client` call fail fatally
    pub fn fatal_next_unlock(&self) {
        self.lock().unlock_script.push_back(ScriptedUnlock::Fatal);
    }

    /// Hold every `unlock_client` call open for `delay` before it answers
    pub fn delay_unlocks(&self, delay: Duration) {
        self.lock().unlock_delay = Some(delay);
    }

    /// Most `unlock_client` calls that were ever in progress at once
    pub fn peak_concurrent_unlocks(&self) -> usize {
        self.lock().peak_unlocks
    }

    pub fn owner(&self, pool: &str, image: &str) -> Option<LockOwner> {
        self.lock()
            .pools
            .get(pool)
            .and_then(|images| images.get(image))
            .cloned()
            .flatten()
    }

    pub fn calls(&self) -> Vec<LockCall> {
        self.lock().calls.clone()
    }

    /// Addresses passed to `unlock_client`, in order
    pub fn unlock_client_calls(&self) -> Vec<Ipv4Addr> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                LockCall::UnlockClient { address } => Some(*address),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl LockInventory for FakeLockInventory {
    async fn list_pools(&self) -> Result<Vec<StoragePool>, LockError> {
        let mut state = self.lock();
        state.calls.push(LockCall::ListPools);
        Ok(state
            .pools
            .keys()
            .enumerate()
            .map(|(i, name)| StoragePool::new(i as i64, name.clone()))
            .collect())
    }

    async fn list_images(&self, pool: &StoragePool) -> Result<Vec<StorageImage>, LockError> {
        let mut state = self.lock();
        state.calls.push(LockCall::ListImages {
            pool: pool.name.clone(),
        });
        Ok(state
            .pools
            .get(&pool.name)
            .map(|images| {
                images
                    .iter()
                    .map(|(name, owner)| {
                        let lock_type = if owner.is_some() {
                            LockType::Exclusive
                        } else {
                            LockType::Unlocked
                        };
                        StorageImage::new(name.clone(), lock_type)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn lock_owner(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<Option<LockOwner>, LockError> {
        let mut state = self.lock();
        state.calls.push(LockCall::LockOwner {
            pool: pool.name.clone(),
            image: image.name.clone(),
        });
        Ok(state
            .pools
            .get(&pool.name)
            .and_then(|images| images.get(&image.name))
            .cloned()
            .flatten())
    }

    async fn unlock_image(
        &self,
        image: &StorageImage,
        pool: &StoragePool,
    ) -> Result<(), LockError> {
        let mut state = self.lock();
        state.calls.push(LockCall::UnlockImage {
            pool: pool.name.clone(),
            image: image.name.clone(),
        });
        let slot = state
            .pools
            .get_mut(&pool.name)
            .and_then(|images| images.get_mut(&image.name));
        match slot {
            Some(owner) if owner.is_some() => {
                *owner = None;
                Ok(())
            }
            _ => Err(LockError::NoLockOwner {
                pool: pool.name.clone(),
                image: image.name.clone(),
            }),
        }
    }

    async fn unlock_client(&self, address: Ipv4Addr) -> Result<UnlockReport, LockError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(LockCall::UnlockClient { address });
            state.active_unlocks += 1;
            state.peak_unlocks = state.peak_unlocks.max(state.active_unlocks);
            state.unlock_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.active_unlocks -= 1;

        match state.unlock_script.pop_front() {
            Some(ScriptedUnlock::Fail(message)) => {
                return Err(LockError::Command(CommandError::Exited {
                    program: "rbd".to_string(),
                    code: Some(1),
                    output: message,
                }))
            }
            Some(ScriptedUnlock::Fatal) => {
                return Err(LockError::Command(CommandError::KillFailed {
                    program: "rbd".to_string(),
                    source: std::io::Error::other("scripted kill failure"),
                }))
            }
            None => {}
        }

        let mut report = UnlockReport::default();
        for (pool, images) in state.pools.iter_mut() {
            report.pools_scanned += 1;
            for (image, owner) in images.iter_mut() {
                report.images_checked += 1;
                if owner.as_ref().is_some_and(|o| o.address == address) {
                    *owner = None;
                    report.unlocked.push(format!("{}/{}", pool, image));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
