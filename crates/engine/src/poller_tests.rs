// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fence_adapters::FakeInstanceDirectory;
use fence_core::{EventReceiver, StateMask, Subscription};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

const ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

fn record(id: &str, state: InstanceState) -> InstanceRecord {
    InstanceRecord::new(id, Some(ADDR), state)
}

fn poller() -> (InstancePoller<FakeInstanceDirectory>, FakeInstanceDirectory, EventReceiver) {
    let directory = FakeInstanceDirectory::new();
    let bus = EventBus::with_capacity(256);
    let rx = bus.subscribe(Subscription::new(StateMask::all(), "observer"));
    (InstancePoller::new(directory.clone(), bus), directory, rx)
}

fn drain(rx: &mut EventReceiver) -> Vec<StateTransitionEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.logs.lock().unwrap()).to_string()
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

fn with_logs<T>(f: impl FnOnce() -> T) -> (String, T) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (logs.contents(), result)
}

#[test]
fn first_listing_publishes_new_instances() {
    let (mut poller, _, mut rx) = poller();

    let report = poller.reconcile(vec![
        record("i-1", InstanceState::Running),
        record("i-2", InstanceState::Pending),
    ]);

    assert_eq!(report.new, 2);
    assert_eq!(report.events(), 2);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.previous().is_none()));
    assert_eq!(events[0].instance_id().as_str(), "i-1");
    assert_eq!(poller.len(), 2);
}

#[test]
fn changed_state_publishes_previous_and_current() {
    let (mut poller, _, mut rx) = poller();
    poller.reconcile(vec![record("i-1", InstanceState::Running)]);
    drain(&mut rx);

    let report = poller.reconcile(vec![record("i-1", InstanceState::Stopping)]);

    assert_eq!(report.changed, 1);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous(), Some(InstanceState::Running));
    assert_eq!(events[0].current(), InstanceState::Stopping);
    let cached = poller.cached(&InstanceId::from("i-1")).unwrap();
    assert_eq!(cached.state, InstanceState::Stopping);
}

#[test]
fn unchanged_state_publishes_nothing() {
    let (mut poller, _, mut rx) = poller();
    poller.reconcile(vec![record("i-1", InstanceState::Running)]);
    drain(&mut rx);

    let report = poller.reconcile(vec![record("i-1", InstanceState::Running)]);

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.events(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn address_is_refreshed_without_an_event() {
    let (mut poller, _, mut rx) = poller();
    poller.reconcile(vec![InstanceRecord::new("i-1", None, InstanceState::Running)]);
    drain(&mut rx);

    poller.reconcile(vec![record("i-1", InstanceState::Running)]);

    assert!(drain(&mut rx).is_empty());
    assert_eq!(poller.cached(&InstanceId::from("i-1")).unwrap().address, Some(ADDR));
}

#[test]
fn duplicate_ids_keep_the_first_record() {
    let (mut poller, _, mut rx) = poller();

    let report = poller.reconcile(vec![
        record("i-1", InstanceState::Running),
        record("i-1", InstanceState::Terminated),
    ]);

    assert_eq!(report.new, 1);
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(
        poller.cached(&InstanceId::from("i-1")).unwrap().state,
        InstanceState::Running
    );
}

#[test]
fn vanished_terminated_instance_is_removed_quietly() {
    let (mut poller, _, mut rx) = poller();
    poller.reconcile(vec![record("i-1", InstanceState::Terminated)]);
    drain(&mut rx);

    let (logs, report) = with_logs(|| poller.reconcile(Vec::new()));

    assert_eq!(report.vanished, 1);
    assert_eq!(report.anomalies, 0);
    assert!(poller.is_empty());
    assert!(drain(&mut rx).is_empty());
    assert!(logs.contains("instance finally removed"), "logs:\n{}", logs);
    assert!(!logs.contains("vanished without"), "logs:\n{}", logs);
}

#[test]
fn vanished_live_instances_each_log_one_anomaly() {
    let (mut poller, _, _rx) = poller();
    poller.reconcile(vec![
        record("i-1", InstanceState::Running),
        record("i-2", InstanceState::Stopped),
        record("i-3", InstanceState::Terminated),
    ]);

    let (logs, report) = with_logs(|| poller.reconcile(Vec::new()));

    assert_eq!(report.vanished, 3);
    assert_eq!(report.anomalies, 2);
    assert_eq!(logs.matches("vanished without being observed terminated").count(), 2);
    assert!(logs.contains("last_state=running"), "logs:\n{}", logs);
    assert!(logs.contains("last_state=stopped"), "logs:\n{}", logs);
}

#[test]
fn reappearing_instance_is_new_again() {
    let (mut poller, _, mut rx) = poller();
    poller.reconcile(vec![record("i-1", InstanceState::Terminated)]);
    poller.reconcile(Vec::new());
    drain(&mut rx);

    poller.reconcile(vec![record("i-1", InstanceState::Running)]);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].previous(), None);
}

#[test]
fn running_hosts_lists_running_instances_with_addresses() {
    let (mut poller, _, _rx) = poller();
    poller.reconcile(vec![
        record("i-1", InstanceState::Running),
        InstanceRecord::new("i-2", None, InstanceState::Running),
        record("i-3", InstanceState::Stopped),
    ]);

    let hosts = poller.running_hosts();

    assert_eq!(hosts, vec![(InstanceId::from("i-1"), ADDR)]);
}

#[tokio::test]
async fn bootstrap_fills_cache_without_publishing() {
    let (mut poller, directory, mut rx) = poller();
    directory.push_listing(vec![
        record("i-1", InstanceState::Running),
        record("i-2", InstanceState::Stopped),
    ]);

    let cached = poller.bootstrap(3, Duration::ZERO).await.unwrap();

    assert_eq!(cached, 2);
    assert!(drain(&mut rx).is_empty());

    // The next cycle only reports what changed since bootstrap
    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.events(), 0);
}

#[tokio::test]
async fn bootstrap_retries_until_a_listing_succeeds() {
    let (mut poller, directory, _rx) = poller();
    directory
        .push_failure("throttled")
        .push_failure("throttled")
        .push_listing(vec![record("i-1", InstanceState::Running)]);

    let cached = poller.bootstrap(3, Duration::from_millis(1)).await.unwrap();

    assert_eq!(cached, 1);
    assert_eq!(directory.listing_count(), 3);
}

#[tokio::test]
async fn bootstrap_gives_up_after_attempt_budget() {
    let (mut poller, directory, _rx) = poller();
    directory.push_failure("no credentials");

    let err = poller.bootstrap(3, Duration::from_millis(1)).await.unwrap_err();

    match err {
        EngineError::Bootstrap {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.to_string().contains("no credentials"));
        }
        other => panic!("expected bootstrap failure, got {:?}", other),
    }
    assert_eq!(directory.listing_count(), 3);
    assert!(poller.is_empty());
}

#[tokio::test]
async fn failed_poll_keeps_cache_and_publishes_nothing() {
    let (mut poller, directory, mut rx) = poller();
    directory
        .push_listing(vec![record("i-1", InstanceState::Running)])
        .push_failure("throttled")
        .push_listing(vec![record("i-1", InstanceState::Stopped)]);
    poller.poll_once().await.unwrap();
    drain(&mut rx);

    assert!(poller.poll_once().await.is_err());
    assert_eq!(poller.len(), 1);
    assert!(drain(&mut rx).is_empty());

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.changed, 1);
}

const STATES: [InstanceState; 7] = InstanceState::ALL;

fn listing_strategy() -> impl Strategy<Value = BTreeMap<u8, usize>> {
    prop::collection::btree_map(0u8..8, 0usize..STATES.len(), 0..8)
}

fn to_records(listing: &BTreeMap<u8, usize>) -> Vec<InstanceRecord> {
    listing
        .iter()
        .map(|(id, state)| record(&format!("i-{}", id), STATES[*state]))
        .collect()
}

proptest! {
    #[test]
    fn events_are_exactly_new_and_changed_instances(
        first in listing_strategy(),
        second in listing_strategy(),
    ) {
        let (mut poller, _, mut rx) = poller();
        poller.reconcile(to_records(&first));
        drain(&mut rx);

        let report = poller.reconcile(to_records(&second));
        let events = drain(&mut rx);

        let mut expected: Vec<(String, Option<InstanceState>, InstanceState)> = Vec::new();
        for (id, state) in &second {
            let current = STATES[*state];
            match first.get(id) {
                None => expected.push((format!("i-{}", id), None, current)),
                Some(prev) if STATES[*prev] != current => {
                    expected.push((format!("i-{}", id), Some(STATES[*prev]), current))
                }
                Some(_) => {}
            }
        }
        let actual: Vec<(String, Option<InstanceState>, InstanceState)> = events
            .iter()
            .map(|e| (e.instance_id().to_string(), e.previous(), e.current()))
            .collect();

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(report.events(), events.len());
        let vanished = first.keys().filter(|id| !second.contains_key(id)).count();
        prop_assert_eq!(report.vanished, vanished);
        prop_assert_eq!(poller.len(), second.len());
    }
}
