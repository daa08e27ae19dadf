// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted command runner for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CommandError, CommandRunner};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted outcome for one invocation
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Zero exit with this output
    Output(String),
    /// Non-zero exit
    Exit { code: i32, output: String },
    /// Timed out and was killed
    Timeout { output: String },
    /// Timed out and could not be killed
    KillFailed,
}

impl FakeResponse {
    pub fn output(text: impl Into<String>) -> Self {
        FakeResponse::Output(text.into())
    }

    pub fn exit(code: i32, output: impl Into<String>) -> Self {
        FakeResponse::Exit {
            code,
            output: output.into(),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Responses per full argv; the last response repeats once the rest
    /// are consumed
    responses: HashMap<Vec<String>, VecDeque<FakeResponse>>,
    calls: Vec<Vec<String>>,
}

/// Fake command runner that answers from a script and records every argv
#[derive(Clone, Default)]
pub struct FakeCommandRunner {
    script: Arc<Mutex<Script>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the exact command line `argv` (program first)
    pub fn respond(&self, argv: &[&str], response: FakeResponse) -> &Self {
        let key = argv.iter().map(|s| s.to_string()).collect();
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .responses
            .entry(key)
            .or_default()
            .push_back(response);
        self
    }

    /// Every command line executed, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// Command lines starting with `prefix`
    pub fn calls_starting_with(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|argv| {
                argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeCommandRunner {
    async fn execute(
        &self,
        timeout: Duration,
        program: &str,
        args: &[&str],
    ) -> Result<String, CommandError> {
        let argv: Vec<String> = std::iter::once(program)
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect();

        let response = {
            let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
            script.calls.push(argv.clone());
            script.responses.get_mut(&argv).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };

        let program = program.to_string();
        match response {
            Some(FakeResponse::Output(output)) => Ok(output),
            Some(FakeResponse::Exit { code, output }) => Err(CommandError::Exited {
                program,
                code: Some(code),
                output,
            }),
            Some(FakeResponse::Timeout { output }) => Err(CommandError::TimedOut {
                program,
                timeout,
                output,
            }),
            Some(FakeResponse::KillFailed) => Err(CommandError::KillFailed {
                program,
                source: std::io::Error::other("scripted kill failure"),
            }),
            None => Err(CommandError::Exited {
                program,
                code: Some(127),
                output: format!("no scripted response for: {}", argv.join(" ")),
            }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
