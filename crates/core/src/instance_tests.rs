// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    running = { "running", InstanceState::Running },
    stopped = { "stopped", InstanceState::Stopped },
    terminated = { "terminated", InstanceState::Terminated },
    stopping = { "stopping", InstanceState::Stopping },
    pending = { "pending", InstanceState::Pending },
    shutting_down = { "shutting-down", InstanceState::ShuttingDown },
    rebooting = { "rebooting", InstanceState::Unknown },
    empty = { "", InstanceState::Unknown },
    wrong_case = { "Running", InstanceState::Unknown },
)]
fn cloud_state_names_map_to_lifecycle(name: &str, expected: InstanceState) {
    assert_eq!(InstanceState::from_cloud_name(name), expected);
}

#[test]
fn state_names_round_trip_through_as_str() {
    for state in InstanceState::ALL {
        if state == InstanceState::Unknown {
            continue;
        }
        assert_eq!(InstanceState::from_cloud_name(state.as_str()), state);
    }
}

#[test]
fn every_state_has_a_distinct_flag() {
    let mut seen = StateMask::empty();
    for state in InstanceState::ALL {
        let flag = state.flag();
        assert_eq!(flag.bits().count_ones(), 1, "{} flag is not a single bit", state);
        assert!(!seen.intersects(flag), "{} flag collides", state);
        seen |= flag;
    }
    assert_eq!(seen.bits(), 0b111_1111);
}

#[test]
fn flags_keep_historic_bit_layout() {
    assert_eq!(StateMask::RUNNING.bits(), 1);
    assert_eq!(StateMask::STOPPING.bits(), 2);
    assert_eq!(StateMask::STOPPED.bits(), 4);
    assert_eq!(StateMask::SHUTTING_DOWN.bits(), 8);
    assert_eq!(StateMask::TERMINATED.bits(), 16);
    assert_eq!(StateMask::PENDING.bits(), 32);
    assert_eq!(StateMask::UNKNOWN.bits(), 64);
}

#[parameterized(
    running_in_running_or_pending = { InstanceState::Running, StateMask::RUNNING | StateMask::PENDING, true },
    running_not_in_terminated = { InstanceState::Running, StateMask::TERMINATED, false },
    terminated_not_in_running = { InstanceState::Terminated, StateMask::RUNNING, false },
    stopping_not_in_running = { InstanceState::Stopping, StateMask::RUNNING, false },
    terminated_in_union = { InstanceState::Terminated, StateMask::TERMINATED | StateMask::RUNNING | StateMask::PENDING, true },
    stopped_at_risk = { InstanceState::Stopped, StateMask::AT_RISK, true },
    pending_not_at_risk = { InstanceState::Pending, StateMask::AT_RISK, false },
    nothing_in_empty = { InstanceState::Unknown, StateMask::empty(), false },
)]
fn mask_accepts_matching_states(state: InstanceState, mask: StateMask, expected: bool) {
    assert_eq!(mask.accepts(state), expected);
}

#[test]
fn mask_collects_from_states() {
    let mask: StateMask = [InstanceState::Stopped, InstanceState::Terminated]
        .into_iter()
        .collect();
    assert_eq!(mask, StateMask::STOPPED | StateMask::TERMINATED);
}

#[test]
fn mask_renders_state_names() {
    let mask = StateMask::RUNNING | StateMask::STOPPED | StateMask::UNKNOWN;
    assert_eq!(mask.to_string(), "running,stopped,unknown");
    assert_eq!(StateMask::empty().to_string(), "");
    assert_eq!(
        StateMask::AT_RISK.to_string(),
        "stopping,stopped,shutting-down,terminated"
    );
}

#[test]
fn instance_state_serializes_kebab_case() {
    let json = serde_json::to_string(&InstanceState::ShuttingDown).unwrap();
    assert_eq!(json, "\"shutting-down\"");
}

proptest::proptest! {
    #[test]
    fn mask_from_its_states_is_identity(bits in 0u8..128) {
        let mask = StateMask::from_bits_truncate(bits);
        let rebuilt: StateMask = mask.states().collect();
        proptest::prop_assert_eq!(rebuilt, mask);
        for state in InstanceState::ALL {
            proptest::prop_assert_eq!(mask.accepts(state), mask.states().any(|s| s == state));
        }
    }
}
