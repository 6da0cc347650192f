// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Instant;

fn sh(script: &str) -> Command {
    new_command("sh", ["-c", script])
}

#[tokio::test]
async fn captures_stdout_and_stderr_separately() {
    let token = CancellationToken::new();
    let output = execute_command(&token, sh("echo out; echo err >&2"), None)
        .await
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "out");
    assert_eq!(output.stderr.trim(), "err");
}

#[tokio::test]
async fn large_output_does_not_stall() {
    // ~264 KiB on each stream, well past the OS pipe buffer.
    let token = CancellationToken::new();
    let script = "i=0; while [ $i -lt 8192 ]; do printf '%032d\\n' $i; printf '%032d\\n' $i >&2; i=$((i+1)); done";
    let output = execute_command(&token, sh(script), None).await.unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.len(), 8192 * 33);
    assert_eq!(output.stderr.len(), 8192 * 33);
}

#[tokio::test]
async fn sequential_invocations_leave_no_tracked_processes() {
    let token = CancellationToken::new();
    let pm = ProcessManager::new();
    for i in 0..12 {
        let output = execute_command(&token, sh(&format!("echo {i}")), Some(&pm))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(pm.count(), 0, "pid still tracked after invocation {i}");
    }
}

#[tokio::test]
async fn nonzero_exit_is_reported_in_status() {
    let token = CancellationToken::new();
    let output = execute_command(&token, sh("echo oops >&2; exit 3"), None)
        .await
        .unwrap();
    assert!(!output.success());
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(output.stderr.trim(), "oops");
}

#[tokio::test]
async fn cancellation_kills_the_child_quickly() {
    let token = CancellationToken::new();
    let pm = ProcessManager::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let err = execute_command(&token, sh("sleep 30"), Some(&pm))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(pm.count(), 0);
}

#[tokio::test]
async fn kill_all_reaches_descendants() {
    let token = CancellationToken::new();
    let pm = ProcessManager::new();

    // The child spawns its own grandchild; both share the process group.
    let handle = {
        let token = token.clone();
        let pm = pm.clone();
        tokio::spawn(async move {
            execute_command(&token, sh("sleep 30 & wait"), Some(&pm)).await
        })
    };

    // Wait for the child to be tracked, then group-kill.
    for _ in 0..100 {
        if pm.count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pm.count(), 1);
    pm.kill_all();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    let output = result.unwrap();
    assert!(!output.success(), "killed child should not exit cleanly");
    assert_eq!(pm.count(), 0);
}

#[tokio::test]
async fn spawn_failure_is_descriptive() {
    let token = CancellationToken::new();
    let err = execute_command(
        &token,
        new_command("definitely-not-a-real-binary-gf", [""; 0]),
        None,
    )
    .await
    .unwrap_err();
    match err {
        ProcessError::Spawn { command, .. } => {
            assert!(command.contains("definitely-not-a-real-binary-gf"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn run_with_timeout_times_out() {
    let err = run_with_timeout(sh("sleep 30"), Duration::from_millis(100), "sleepy test")
        .await
        .unwrap_err();
    match err {
        ProcessError::Timeout { description, .. } => assert_eq!(description, "sleepy test"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn run_with_timeout_returns_output() {
    let output = run_with_timeout(sh("echo fast"), Duration::from_secs(10), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "fast");
}
