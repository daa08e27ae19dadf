// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Fencing engine: instance polling, address tracking and lock revocation

mod error;
mod fencing;
mod poller;
mod tracker;

pub use error::{EngineError, FenceError};
pub use fencing::{FenceOutcome, FencingCoordinator, RetryPolicy};
pub use poller::{CycleReport, InstancePoller};
pub use tracker::AddressTracker;
