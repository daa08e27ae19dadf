// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rbd fencing daemon: configuration and lifecycle

pub mod config;
pub mod lifecycle;

pub use config::{parse_tag, Config, ConfigError, Overrides};
pub use lifecycle::{startup, startup_with, DaemonState, LifecycleError};
