// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn startup_creates_state_layout_and_binds_socket() {
    let dir = TempDir::new().unwrap();
    let config = Config::in_dir(dir.path().join("state"));

    let result = startup(&config).await.unwrap();
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
    assert!(config.crashes_path.is_dir());
    assert!(config.backups_path.is_dir());
    assert!(config.data_path.is_dir());

    let pid: u32 = std::fs::read_to_string(&config.lock_path)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert_eq!(pid, std::process::id());

    drop(result);
}

#[tokio::test]
async fn second_startup_fails_on_held_lock() {
    let dir = TempDir::new().unwrap();
    let config = Config::in_dir(dir.path().join("state"));

    let first = startup(&config).await.unwrap();
    let second = startup(&config).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    // The losing attempt must not delete the winner's files.
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());

    drop(first);
}

#[tokio::test]
async fn shutdown_removes_socket_and_pid_files() {
    let dir = TempDir::new().unwrap();
    let config = Config::in_dir(dir.path().join("state"));

    let StartupResult { mut daemon, listener } = startup(&config).await.unwrap();
    drop(listener);
    daemon.shutdown().await.unwrap();

    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
}

#[tokio::test]
async fn startup_reloads_persisted_safety_state() {
    let dir = TempDir::new().unwrap();
    let config = Config::in_dir(dir.path().join("state"));

    {
        let StartupResult { mut daemon, listener } = startup(&config).await.unwrap();
        daemon.safety.enable_safe_mode("pre-restart lockdown");
        drop(listener);
        daemon.shutdown().await.unwrap();
    }

    let StartupResult { mut daemon, listener } = startup(&config).await.unwrap();
    assert!(daemon.safety.is_in_safe_mode());
    assert_eq!(daemon.safety.safe_mode_reason().as_deref(), Some("pre-restart lockdown"));
    drop(listener);
    daemon.shutdown().await.unwrap();
}
