// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Daemon version reported on the management surface.
pub const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: BOTD_STATE_DIR > XDG_STATE_HOME/botd > ~/.local/state/botd
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("BOTD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("botd"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/botd"))
}

fn duration_ms(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Management-socket read/write timeout.
pub fn ipc_timeout() -> Duration {
    duration_ms("BOTD_IPC_TIMEOUT_MS", Duration::from_secs(5))
}

/// Control-channel per-request timeout.
pub fn control_timeout() -> Duration {
    duration_ms("BOTD_CONTROL_TIMEOUT_MS", Duration::from_secs(10))
}

/// How long the readiness wait polls the log buffer before giving up.
pub fn ready_timeout() -> Duration {
    duration_ms("BOTD_READY_TIMEOUT_MS", Duration::from_secs(15))
}

/// Poll interval of the readiness wait.
pub fn ready_poll() -> Duration {
    duration_ms("BOTD_READY_POLL_MS", Duration::from_millis(100))
}

/// Substring that marks the worker as ready in its log output.
pub fn ready_marker() -> String {
    std::env::var("BOTD_READY_MARKER").unwrap_or_else(|_| "ready".to_string())
}

/// Grace window for graceful shutdown and post-start health validation.
pub fn grace_period() -> Duration {
    duration_ms("BOTD_GRACE_MS", Duration::from_secs(5))
}

/// Debounce window for routine safety-state writes.
pub fn save_debounce() -> Duration {
    duration_ms("BOTD_SAVE_DEBOUNCE_MS", Duration::from_millis(500))
}

/// Worker launch command, whitespace-split into program + args.
///
/// Shell syntax is deliberately not supported; wrap complex launches in a
/// script and point this at the script.
pub fn worker_command() -> Vec<String> {
    std::env::var("BOTD_WORKER_CMD")
        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Bot token forwarded to the worker. Required to start; its absence is the
/// `credentials_missing` failure.
pub fn bot_token() -> Option<String> {
    std::env::var("BOTD_BOT_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Event-stream bind address.
pub fn ws_addr() -> String {
    std::env::var("BOTD_WS_ADDR").unwrap_or_else(|_| "127.0.0.1:7620".to_string())
}

/// Event-stream auth token. The event bus does not start without one.
pub fn ws_token() -> Option<String> {
    std::env::var("BOTD_WS_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Heartbeat ping interval for event-stream subscribers.
pub fn ws_heartbeat() -> Duration {
    duration_ms("BOTD_WS_HEARTBEAT_MS", Duration::from_secs(30))
}

/// Global subscriber cap.
pub fn ws_max_subscribers() -> usize {
    std::env::var("BOTD_WS_MAX_SUBSCRIBERS").ok().and_then(|s| s.parse().ok()).unwrap_or(32)
}

/// Per-IP connection attempts allowed per rolling window.
pub fn ws_conn_limit() -> u32 {
    std::env::var("BOTD_WS_CONN_LIMIT").ok().and_then(|s| s.parse().ok()).unwrap_or(5)
}

/// Rolling window for the per-IP connection limit.
pub fn ws_conn_window() -> Duration {
    duration_ms("BOTD_WS_CONN_WINDOW_MS", Duration::from_secs(10))
}

/// Interval of the idle rate-bucket sweep.
pub fn rate_sweep_interval() -> Duration {
    duration_ms("BOTD_RATE_SWEEP_MS", Duration::from_secs(60))
}
