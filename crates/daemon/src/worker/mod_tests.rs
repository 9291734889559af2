// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn exit(code: Option<i32>, signal: Option<&str>) -> WorkerExit {
    WorkerExit { code, signal: signal.map(str::to_string) }
}

#[parameterized(
    clean_zero = { Some(0), None, false },
    deliberate_nonzero = { Some(2), None, true },
    classic_crash = { Some(1), None, true },
    sigterm_stop = { None, Some("SIGTERM"), false },
    sigkill_stop = { None, Some("SIGKILL"), false },
    segfault = { None, Some("SIGSEGV"), true },
    abort = { None, Some("SIGABRT"), true },
    no_information = { None, None, false },
)]
fn crash_classification(code: Option<i32>, signal: Option<&str>, is_crash: bool) {
    assert_eq!(exit(code, signal).is_crash(), is_crash);
}

fn launch(cmd: &[&str], dir: &std::path::Path) -> WorkerLaunch {
    WorkerLaunch {
        command: cmd.iter().map(|s| s.to_string()).collect(),
        env: vec![],
        cwd: dir.to_path_buf(),
    }
}

#[tokio::test]
async fn spawn_captures_output_and_clean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let spawned =
        spawn_worker(&launch(&["sh", "-c", "echo started; echo oops >&2"], dir.path())).unwrap();
    assert!(spawned.pid > 0);

    let mut lines = spawned.lines;
    let mut seen = Vec::new();
    while let Some(line) = lines.recv().await {
        seen.push(line);
    }
    assert!(seen.contains(&(botd_core::LogStream::Stdout, "started".to_string())));
    assert!(seen.contains(&(botd_core::LogStream::Stderr, "oops".to_string())));

    let exit = spawned.exit.await.unwrap();
    assert_eq!(exit.code, Some(0));
    assert!(!exit.is_crash());
}

#[tokio::test]
async fn spawn_reports_nonzero_exit_as_crash() {
    let dir = tempfile::tempdir().unwrap();
    let spawned = spawn_worker(&launch(&["sh", "-c", "exit 3"], dir.path())).unwrap();
    let exit = spawned.exit.await.unwrap();
    assert_eq!(exit.code, Some(3));
    assert!(exit.is_crash());
}

#[tokio::test]
async fn spawn_forwards_environment() {
    let dir = tempfile::tempdir().unwrap();
    let mut launch = launch(&["sh", "-c", "echo token=$BOTD_BOT_TOKEN"], dir.path());
    launch.env.push(("BOTD_BOT_TOKEN".to_string(), "tk-123".to_string()));

    let mut spawned = spawn_worker(&launch).unwrap();
    let (_, line) = spawned.lines.recv().await.unwrap();
    assert_eq!(line, "token=tk-123");
}

#[test]
fn empty_command_is_rejected() {
    let err = spawn_worker(&WorkerLaunch {
        command: vec![],
        env: vec![],
        cwd: std::env::temp_dir(),
    })
    .unwrap_err();
    assert!(matches!(err, SpawnError::NoCommand));
}

#[tokio::test]
async fn connect_control_gives_up_after_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.sock");
    let stream = connect_control(&missing, 2, Duration::from_millis(5)).await;
    assert!(stream.is_none());
}
