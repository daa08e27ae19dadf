// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External command execution with a hard timeout

mod process;

pub use process::{ProcessRunner, DEFAULT_COMMAND_TIMEOUT};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCommandRunner, FakeResponse};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from running an external command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {}, output: {output}", exit_description(.code))]
    Exited {
        program: String,
        code: Option<i32>,
        output: String,
    },
    #[error("{program} timed out after {timeout:?}, output: {output}")]
    TimedOut {
        program: String,
        timeout: Duration,
        output: String,
    },
    #[error("failed to kill {program} after timeout: {source}")]
    KillFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "termination by signal".to_string(),
    }
}

impl CommandError {
    /// A process that outlived its timeout and could not be killed is
    /// still running unsupervised.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::KillFailed { .. })
    }

    /// Combined stdout/stderr captured before the failure
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandError::Exited { output, .. } | CommandError::TimedOut { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}

/// Runs external tools, capturing stdout and stderr into one buffer
#[async_trait]
pub trait CommandRunner: Clone + Send + Sync + 'static {
    /// Run `program` with `args`, killing it if it outlives `timeout`.
    ///
    /// Returns the merged output on a zero exit status.
    async fn execute(
        &self,
        timeout: Duration,
        program: &str,
        args: &[&str],
    ) -> Result<String, CommandError>;
}
