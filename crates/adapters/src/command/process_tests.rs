// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Instant;

const SHORT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn captures_stdout_and_stderr_together() {
    let output = ProcessRunner::new()
        .execute(SHORT, "sh", &["-c", "echo to-stdout; echo to-stderr 1>&2"])
        .await
        .unwrap();

    assert!(output.contains("to-stdout"), "output: {}", output);
    assert!(output.contains("to-stderr"), "output: {}", output);
}

#[tokio::test]
async fn non_zero_exit_carries_output() {
    let err = ProcessRunner::new()
        .execute(SHORT, "sh", &["-c", "echo boom 1>&2; exit 3"])
        .await
        .unwrap_err();

    match &err {
        CommandError::Exited { code, output, .. } => {
            assert_eq!(*code, Some(3));
            assert!(output.contains("boom"));
        }
        other => panic!("expected Exited, got {:?}", other),
    }
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("exit code 3"));
}

#[tokio::test]
async fn kills_command_after_timeout() {
    let start = Instant::now();
    let err = ProcessRunner::new()
        .execute(
            Duration::from_millis(200),
            "sh",
            &["-c", "echo started; exec sleep 30"],
        )
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(10));
    match &err {
        CommandError::TimedOut { output, timeout, .. } => {
            assert_eq!(*timeout, Duration::from_millis(200));
            assert!(output.contains("started"), "partial output: {}", output);
        }
        other => panic!("expected TimedOut, got {:?}", other),
    }
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let err = ProcessRunner::new()
        .execute(SHORT, "/nonexistent/rbd-fence-test-binary", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::Spawn { .. }));
    assert!(err.output().is_none());
}

#[tokio::test]
async fn zero_timeout_falls_back_to_default() {
    let output = ProcessRunner::new()
        .execute(Duration::ZERO, "sh", &["-c", "echo ok"])
        .await
        .unwrap();

    assert_eq!(output.trim(), "ok");
}

#[tokio::test]
async fn concurrent_calls_do_not_share_output() {
    let runner = ProcessRunner::new();
    let (a, b) = tokio::join!(
        runner.execute(SHORT, "sh", &["-c", "sleep 0.1; echo first"]),
        runner.execute(SHORT, "sh", &["-c", "echo second"]),
    );

    assert_eq!(a.unwrap().trim(), "first");
    assert_eq!(b.unwrap().trim(), "second");
}

#[test]
fn kill_failure_is_fatal() {
    let err = CommandError::KillFailed {
        program: "rbd".to_string(),
        source: std::io::Error::other("permission denied"),
    };
    assert!(err.is_fatal());
}
