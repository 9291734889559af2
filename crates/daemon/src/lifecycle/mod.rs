// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::control::ControlChannel;
use crate::event_bus::EventBus;
use crate::safety::SafetyStore;
use crate::supervisor::WorkerSupervisor;

/// Daemon configuration: every path lives under the state directory.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/botd)
    pub state_dir: PathBuf,
    /// Path to the management Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to the daemon log file
    pub log_path: PathBuf,
    /// Path to the persisted safety state
    pub safety_path: PathBuf,
    /// Directory of per-crash log files
    pub crashes_path: PathBuf,
    /// Directory of backup snapshots
    pub backups_path: PathBuf,
    /// Worker data directory (what backups copy)
    pub data_path: PathBuf,
    /// Per-worker control socket the supervisor connects to
    pub control_socket_path: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under `~/.local/state/botd/` (or `$XDG_STATE_HOME`,
    /// or `$BOTD_STATE_DIR`). One daemon supervises one worker.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = crate::env::state_dir()?;
        Ok(Self::in_dir(state_dir))
    }

    /// Configuration rooted at an explicit directory (used by tests).
    pub fn in_dir(state_dir: PathBuf) -> Self {
        Self {
            socket_path: state_dir.join("botd.sock"),
            lock_path: state_dir.join("botd.pid"),
            log_path: state_dir.join("botd.log"),
            safety_path: state_dir.join("safety.json"),
            crashes_path: state_dir.join("crashes"),
            backups_path: state_dir.join("backups"),
            data_path: state_dir.join("data"),
            control_socket_path: state_dir.join("worker.sock"),
            state_dir,
        }
    }
}

/// Daemon state during operation.
///
/// The listener is returned separately from startup to be spawned as a task.
pub struct DaemonState {
    /// Configuration
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// The worker supervisor
    pub supervisor: Arc<WorkerSupervisor>,
    /// Safety state store
    pub safety: Arc<SafetyStore>,
    /// Event fan-out to WebSocket subscribers
    pub event_bus: Arc<EventBus>,
    /// Control channel into the worker
    pub control: ControlChannel,
    /// When the daemon started
    pub start_time: Instant,
    /// Notified when a management client requests daemon shutdown
    pub shutdown: Arc<Notify>,
}

/// Result of daemon startup: the daemon state plus the bound listener.
pub struct StartupResult {
    pub daemon: DaemonState,
    /// The management Unix socket listener to spawn as a task
    pub listener: UnixListener,
}

impl DaemonState {
    /// Shutdown the daemon gracefully.
    ///
    /// Stops the worker first (graceful, falling back to kill after the grace
    /// window), flushes any debounced safety write, then removes the socket
    /// and PID files. The lock file itself is released on drop.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        if self.supervisor.is_running() {
            if let Err(e) = self.supervisor.shutdown(false).await {
                warn!(error = %e, "worker did not stop cleanly during daemon shutdown");
            }
        }

        self.safety.flush();

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Safety state error: {0}")]
    Safety(#[from] crate::safety::SafetyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
