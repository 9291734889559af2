// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::info;

use crate::control::ControlChannel;
use crate::event_bus::{EventBus, EventBusConfig};
use crate::safety::{SafetyPaths, SafetyStore};
use crate::supervisor::{SupervisorConfig, WorkerSupervisor};

use super::{Config, DaemonState, LifecycleError, StartupResult};

/// Start the daemon
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // Don't clean up if we failed to acquire the lock —
            // those files belong to the already-running daemon.
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create the state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    // Use OpenOptions to avoid truncating the file before we hold the lock,
    // which would wipe the running daemon's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    // Write PID to lock file (truncate now that we hold the lock)
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file; // Drop mutability

    // 3. Create remaining directories
    std::fs::create_dir_all(&config.crashes_path)?;
    std::fs::create_dir_all(&config.backups_path)?;
    std::fs::create_dir_all(&config.data_path)?;

    // 4. Load persisted safety state and start its debounced flusher
    let safety = Arc::new(SafetyStore::load(SafetyPaths {
        config_path: config.safety_path.clone(),
        crashes_dir: config.crashes_path.clone(),
        backups_dir: config.backups_path.clone(),
    })?);
    SafetyStore::spawn_flusher(Arc::clone(&safety), crate::env::save_debounce());

    // 5. Event bus (started only when an auth token is configured)
    let event_bus = Arc::new(EventBus::new(EventBusConfig {
        auth_token: crate::env::ws_token(),
        max_subscribers: crate::env::ws_max_subscribers(),
        conn_limit: crate::env::ws_conn_limit(),
        conn_window: crate::env::ws_conn_window(),
        heartbeat_interval: crate::env::ws_heartbeat(),
    }));

    // 6. Control channel and supervisor
    let control = ControlChannel::new(crate::env::control_timeout());
    let supervisor = Arc::new(WorkerSupervisor::new(
        SupervisorConfig {
            worker_command: crate::env::worker_command(),
            bot_token: crate::env::bot_token(),
            data_dir: config.data_path.clone(),
            control_socket: config.control_socket_path.clone(),
            ready_marker: crate::env::ready_marker(),
            ready_timeout: crate::env::ready_timeout(),
            ready_poll: crate::env::ready_poll(),
            grace_period: crate::env::grace_period(),
        },
        Arc::clone(&safety),
        Arc::clone(&event_bus),
        control.clone(),
    ));

    // 7. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(
        state_dir = %config.state_dir.display(),
        safe_mode = safety.is_in_safe_mode(),
        "Daemon started"
    );

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            supervisor,
            safety,
            event_bus,
            control,
            start_time: Instant::now(),
            shutdown: Arc::new(Notify::new()),
        },
        listener,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }

    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
