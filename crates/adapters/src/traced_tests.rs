// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::cloud::FakeInstanceDirectory;
use crate::storage::FakeLockInventory;
use fence_core::InstanceState;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn new() -> Self {
        Self::default()
    }

    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a test with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::new();
    let logs_clone = logs.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs_clone)
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

const HOST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

fn owner(address: Ipv4Addr) -> LockOwner {
    LockOwner {
        lock_id: "auto 1".to_string(),
        client_id: "client.4123".to_string(),
        address,
        session: "3141592".to_string(),
    }
}

// =============================================================================
// Tracing output verification tests
// =============================================================================

#[test]
fn traced_unlock_client_logs_entry_and_summary() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeLockInventory::new();
        fake.add_image("rbd", "vol-1", Some(owner(HOST)));
        fake.add_image("rbd", "vol-2", None);
        TracedLockInventory::new(fake).unlock_client(HOST).await
    });

    let report = result.unwrap();
    assert_eq!(report.unlocked, ["rbd/vol-1"]);

    assert!(
        logs.contains("storage.unlock_client"),
        "Should log span name. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("10.0.0.5"),
        "Should log the address. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("releasing locks"),
        "Should log entry message. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("scan complete") && logs.contains("unlocked=1"),
        "Should log summary. Logs:\n{}",
        logs
    );
    assert!(
        logs.contains("elapsed_ms"),
        "Should log timing. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_unlock_client_logs_failure() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeLockInventory::new();
        fake.fail_next_unlock("cluster unreachable");
        TracedLockInventory::new(fake).unlock_client(HOST).await
    });

    assert!(result.is_err());
    assert!(
        logs.contains("scan failed") && logs.contains("cluster unreachable"),
        "Should log the failure. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_unlock_image_logs_missing_owner() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeLockInventory::new();
        fake.add_image("rbd", "vol-1", None);
        TracedLockInventory::new(fake)
            .unlock_image(
                &StorageImage::new("vol-1", crate::storage::LockType::Unlocked),
                &StoragePool::new(0, "rbd"),
            )
            .await
    });

    assert!(matches!(result, Err(LockError::NoLockOwner { .. })));
    assert!(
        logs.contains("storage.unlock_image") && logs.contains("unlock failed"),
        "Should log span and failure. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_directory_logs_listing_counts() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeInstanceDirectory::new();
        fake.push_listing(vec![InstanceRecord::new(
            "i-1",
            Some(HOST),
            InstanceState::Running,
        )]);
        TracedInstanceDirectory::new(fake).list_all().await
    });

    assert_eq!(result.unwrap().len(), 1);
    assert!(
        logs.contains("listed instances") && logs.contains("count=1"),
        "Should log listing. Logs:\n{}",
        logs
    );
}

#[test]
fn traced_directory_logs_terminate_failure() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeInstanceDirectory::new();
        TracedInstanceDirectory::new(fake)
            .terminate(&InstanceId::from("i-404"))
            .await
    });

    assert!(result.is_err());
    assert!(
        logs.contains("cloud.terminate") && logs.contains("terminate failed"),
        "Should log span and failure. Logs:\n{}",
        logs
    );
}

// =============================================================================
// Delegation tests - verify traced wrapper delegates to inner adapter
// =============================================================================

#[tokio::test]
async fn traced_inventory_delegates_to_inner() {
    let fake = FakeLockInventory::new();
    fake.add_image("rbd", "vol-1", Some(owner(HOST)));
    let traced = TracedLockInventory::new(fake.clone());

    let pools = traced.list_pools().await.unwrap();
    let images = traced.list_images(&pools[0]).await.unwrap();
    let found = traced.lock_owner(&images[0], &pools[0]).await.unwrap();

    assert_eq!(found, Some(owner(HOST)));
    assert_eq!(fake.calls().len(), 3);
}

#[tokio::test]
async fn traced_directory_delegates_to_inner() {
    let fake = FakeInstanceDirectory::new();
    fake.push_listing(vec![
        InstanceRecord::new("i-1", Some(HOST), InstanceState::Running),
        InstanceRecord::new("i-2", None, InstanceState::Terminated),
    ]);
    let traced = TracedInstanceDirectory::new(fake.clone());

    assert_eq!(traced.list_running().await.unwrap().len(), 1);
    assert_eq!(traced.list_terminated().await.unwrap().len(), 1);
    assert!(traced.exists(&InstanceId::from("i-2")).await.unwrap());
    assert_eq!(fake.calls().len(), 3);
}
