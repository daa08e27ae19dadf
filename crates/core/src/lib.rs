// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fence-core: Core types for the rbd fencing agent
//!
//! This crate provides:
//! - Instance lifecycle types and the typed interest mask
//! - State transition events
//! - The event bus with bounded per-subscriber queues
//! - The host directory used to resolve fencing addresses

pub mod event;
pub mod events;
pub mod hosts;
pub mod instance;

// Re-exports
pub use event::StateTransitionEvent;
pub use events::{EventBus, EventReceiver, SubscriberId, Subscription, TryRecvError};
pub use hosts::{HostDirectory, HostEntry};
pub use instance::{InstanceId, InstanceRecord, InstanceState, StateMask};
