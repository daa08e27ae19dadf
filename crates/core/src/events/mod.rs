// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events system for fanning instance transitions out to consumers
//!
//! This module provides:
//! - `EventBus` - Route events to subscribers by lifecycle interest mask
//! - `Subscription` - An interest mask plus a description
//! - `EventReceiver` - A subscriber's bounded, drop-oldest inbox

mod bus;
mod subscription;

pub use bus::{EventBus, DEFAULT_QUEUE_CAPACITY};
pub use subscription::{EventReceiver, SubscriberId, Subscription, TryRecvError};
