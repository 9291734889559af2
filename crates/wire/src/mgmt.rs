// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Management protocol between external callers and the daemon socket.

use botd_core::{BackupMetadata, WorkerStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request from a management client to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check.
    Ping,

    /// Worker + safety status snapshot.
    Status,

    /// Start the worker.
    Start,

    /// Restart the worker (graceful stop, then start).
    Restart,

    /// Stop the worker. Emergency bypasses the lifecycle lock and kills
    /// immediately.
    Shutdown {
        #[serde(default)]
        emergency: bool,
    },

    /// Current log buffer, optionally with the retained crash snapshot.
    Logs {
        #[serde(default)]
        include_crash_snapshot: bool,
    },

    /// Drop the log buffer and crash snapshot.
    ClearLogs,

    /// Manually toggle safe mode.
    SafeMode {
        enable: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Enumerate backups, newest first.
    Backups,

    /// Take a new backup of the worker data directory.
    BackupCreate { version: String },

    /// Restore a backup into the worker data directory.
    BackupRestore { at_ms: u64 },

    /// Pass-through: list the worker's admin panels.
    ListPanels,

    /// Pass-through: execute a panel action in the worker.
    PanelAction {
        panel_id: String,
        action_id: String,
        #[serde(default)]
        data: Value,
    },

    /// Stop the daemon itself.
    DaemonShutdown,
}

/// Response from the daemon to a management client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Health check response.
    Pong,

    /// Generic success.
    Ok,

    /// Status snapshot.
    Status { status: WorkerStatus },

    /// Log buffer contents.
    Logs {
        lines: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crash_snapshot: Option<Vec<String>>,
    },

    /// Backup listing, newest first.
    Backups { backups: Vec<BackupMetadata> },

    /// A backup was taken.
    BackupCreated { backup: BackupMetadata },

    /// Worker reply to a pass-through request.
    Worker { data: Value },

    /// Operation failed; `code` is a stable reason for programmatic callers,
    /// `message` is displayable.
    Error { code: String, message: String },

    /// Daemon is shutting down.
    ShuttingDown,
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error { code: code.into(), message: message.into() }
    }
}

#[cfg(test)]
#[path = "mgmt_tests.rs"]
mod tests;
