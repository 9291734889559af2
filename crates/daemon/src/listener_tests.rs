// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::control::ControlChannel;
use crate::event_bus::EventBusConfig;
use crate::safety::SafetyPaths;
use crate::supervisor::SupervisorConfig;
use botd_core::EventKind;
use botd_wire::{decode, encode, read_message, write_message};
use std::time::Duration;
use tempfile::TempDir;

fn ctx(dir: &TempDir) -> Arc<ListenCtx> {
    ctx_with_token(dir, None)
}

fn ctx_with_token(dir: &TempDir, bot_token: Option<&str>) -> Arc<ListenCtx> {
    let data_dir = dir.path().join("data");
    let crashes = dir.path().join("crashes");
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::create_dir_all(&crashes).unwrap();
    std::fs::create_dir_all(&backups).unwrap();

    let safety = Arc::new(
        SafetyStore::load(SafetyPaths {
            config_path: dir.path().join("safety.json"),
            crashes_dir: crashes,
            backups_dir: backups,
        })
        .unwrap(),
    );
    let event_bus = Arc::new(EventBus::new(EventBusConfig {
        auth_token: Some("ws-token".to_string()),
        max_subscribers: 8,
        conn_limit: 100,
        conn_window: Duration::from_secs(10),
        heartbeat_interval: Duration::from_secs(30),
    }));
    let supervisor = Arc::new(WorkerSupervisor::new(
        SupervisorConfig {
            worker_command: vec!["sh".into(), "-c".into(), "sleep 30".into()],
            bot_token: bot_token.map(str::to_string),
            data_dir: data_dir.clone(),
            control_socket: dir.path().join("worker.sock"),
            ready_marker: "ready".to_string(),
            ready_timeout: Duration::from_millis(200),
            ready_poll: Duration::from_millis(10),
            grace_period: Duration::from_secs(1),
        },
        Arc::clone(&safety),
        Arc::clone(&event_bus),
        ControlChannel::new(Duration::from_millis(200)),
    ));

    Arc::new(ListenCtx {
        supervisor,
        safety,
        event_bus,
        shutdown: Arc::new(Notify::new()),
        data_dir,
    })
}

/// Run one request through a framed in-memory connection.
async fn roundtrip(ctx: &ListenCtx, request: &Request) -> Response {
    let mut request_buf = Vec::new();
    write_message(&mut request_buf, &encode(request).unwrap()).await.unwrap();

    let reader = std::io::Cursor::new(request_buf);
    let mut response_buf = Vec::new();
    handle_connection(reader, &mut response_buf, ctx).await.unwrap();

    let mut cursor = std::io::Cursor::new(response_buf);
    decode(&read_message(&mut cursor).await.unwrap()).unwrap()
}

#[tokio::test]
async fn ping_pongs() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);
    assert_eq!(roundtrip(&ctx, &Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn status_reports_stopped_worker() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);
    match roundtrip(&ctx, &Request::Status).await {
        Response::Status { status } => {
            assert!(!status.running);
            assert!(status.pid.is_none());
            assert!(!status.safe_mode);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn start_failure_surfaces_reason_code() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir); // no bot token configured
    match roundtrip(&ctx, &Request::Start).await {
        Response::Error { code, message } => {
            assert_eq!(code, "credentials_missing");
            assert!(!message.is_empty());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn safe_mode_toggle_updates_store_and_broadcasts_status() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);
    let mut tap = ctx.event_bus.tap();

    let response = roundtrip(
        &ctx,
        &Request::SafeMode { enable: true, reason: Some("maintenance window".into()) },
    )
    .await;
    assert_eq!(response, Response::Ok);
    assert!(ctx.safety.is_in_safe_mode());

    let frame = tap.try_recv().unwrap();
    assert_eq!(frame.kind, EventKind::BotStatus);
    assert_eq!(frame.data["status"]["safe_mode"], true);

    let response = roundtrip(&ctx, &Request::SafeMode { enable: false, reason: None }).await;
    assert_eq!(response, Response::Ok);
    assert!(!ctx.safety.is_in_safe_mode());
}

#[tokio::test]
async fn safe_mode_enable_without_reason_still_has_one() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    roundtrip(&ctx, &Request::SafeMode { enable: true, reason: None }).await;
    let reason = ctx.safety.safe_mode_reason().unwrap();
    assert!(!reason.is_empty());
}

#[tokio::test]
async fn logs_and_clear_logs() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    match roundtrip(&ctx, &Request::Logs { include_crash_snapshot: true }).await {
        Response::Logs { lines, crash_snapshot } => {
            assert!(lines.is_empty());
            assert!(crash_snapshot.is_none());
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(roundtrip(&ctx, &Request::ClearLogs).await, Response::Ok);
}

#[tokio::test]
async fn backup_create_list_restore_flow() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);
    std::fs::write(ctx.data_dir.join("config.json"), b"{}").unwrap();

    let created = match roundtrip(&ctx, &Request::BackupCreate { version: "0.9.1".into() }).await
    {
        Response::BackupCreated { backup } => backup,
        other => panic!("unexpected response: {other:?}"),
    };

    match roundtrip(&ctx, &Request::Backups).await {
        Response::Backups { backups } => {
            assert_eq!(backups.len(), 1);
            assert_eq!(backups[0].version, "0.9.1");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    assert_eq!(
        roundtrip(&ctx, &Request::BackupRestore { at_ms: created.at_ms }).await,
        Response::Ok
    );
}

#[tokio::test]
async fn restore_of_unknown_backup_reports_rollback_unavailable() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    match roundtrip(&ctx, &Request::BackupRestore { at_ms: 12345 }).await {
        Response::Error { code, .. } => assert_eq!(code, "rollback_unavailable"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn panel_passthrough_fails_structurally_when_worker_down() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    match roundtrip(&ctx, &Request::ListPanels).await {
        Response::Error { code, message } => {
            assert_eq!(code, "ipc_unavailable");
            assert_eq!(message, "Bot is not running");
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn daemon_shutdown_notifies_and_acknowledges() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    let notified = {
        let shutdown = Arc::clone(&ctx.shutdown);
        tokio::spawn(async move { shutdown.notified().await })
    };
    tokio::task::yield_now().await;

    assert_eq!(roundtrip(&ctx, &Request::DaemonShutdown).await, Response::ShuttingDown);
    notified.await.unwrap();
}

#[tokio::test]
async fn malformed_request_is_a_protocol_error() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir);

    let mut request_buf = Vec::new();
    write_message(&mut request_buf, br#"{"type": "NoSuchRequest"}"#).await.unwrap();

    let reader = std::io::Cursor::new(request_buf);
    let mut response_buf = Vec::new();
    let result = handle_connection(reader, &mut response_buf, &ctx).await;
    assert!(matches!(result, Err(ConnectionError::Protocol(ProtocolError::Json(_)))));
}
