// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed command runner

use super::{CommandError, CommandRunner};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout, Command};

/// Timeout used when a caller passes a zero duration
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs commands as child processes.
///
/// Holds no state, so concurrent calls are independent.
#[derive(Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        timeout: Duration,
        program: &str,
        args: &[&str],
    ) -> Result<String, CommandError> {
        let timeout = if timeout.is_zero() {
            DEFAULT_COMMAND_TIMEOUT
        } else {
            timeout
        };

        tracing::trace!(
            program,
            args = %args.join(" "),
            timeout_ms = timeout.as_millis() as u64,
            "executing command"
        );

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(CommandError::Io {
                program: program.to_string(),
                source: std::io::Error::other("child stdio was not captured"),
            });
        };

        let captured = Mutex::new(Vec::new());
        let finished = tokio::time::timeout(timeout, async {
            let (drained, status) = tokio::join!(drain(stdout, stderr, &captured), child.wait());
            drained.and(status)
        })
        .await;

        let output = {
            let bytes = captured.lock().unwrap_or_else(|e| e.into_inner());
            String::from_utf8_lossy(&bytes).into_owned()
        };

        match finished {
            Ok(Ok(status)) if status.success() => {
                tracing::trace!(program, output_len = output.len(), "command succeeded");
                Ok(output)
            }
            Ok(Ok(status)) => {
                tracing::debug!(program, code = ?status.code(), "command failed");
                Err(CommandError::Exited {
                    program: program.to_string(),
                    code: status.code(),
                    output,
                })
            }
            Ok(Err(source)) => Err(CommandError::Io {
                program: program.to_string(),
                source,
            }),
            Err(_) => {
                tracing::warn!(
                    program,
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out, killing"
                );
                if let Err(source) = child.kill().await {
                    tracing::error!(program, error = %source, "failed to kill timed out command");
                    return Err(CommandError::KillFailed {
                        program: program.to_string(),
                        source,
                    });
                }
                Err(CommandError::TimedOut {
                    program: program.to_string(),
                    timeout,
                    output,
                })
            }
        }
    }
}

/// Read stdout and stderr concurrently into one buffer, in arrival order
async fn drain(
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    sink: &Mutex<Vec<u8>>,
) -> std::io::Result<()> {
    let mut out_buf = [0u8; 4096];
    let mut err_buf = [0u8; 4096];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => match read? {
                0 => out_open = false,
                n => append(sink, &out_buf[..n]),
            },
            read = stderr.read(&mut err_buf), if err_open => match read? {
                0 => err_open = false,
                n => append(sink, &err_buf[..n]),
            },
        }
    }

    Ok(())
}

fn append(sink: &Mutex<Vec<u8>>, bytes: &[u8]) {
    sink.lock()
        .unwrap_or_else(|e| e.into_inner())
        .extend_from_slice(bytes);
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
