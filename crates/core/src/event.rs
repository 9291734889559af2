// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor events pushed to event-stream subscribers.
//!
//! Serializes with `{"type": "scope:name", ...fields}` format. The event bus
//! splits the tag out into the stream envelope and carries the remaining
//! fields as the `data` payload.

use crate::id::SubscriberId;
use serde::{Deserialize, Serialize};

/// Which output stream a captured log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Worker status snapshot, reported on the management surface and in
/// `bot:status` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub crashed: bool,
    pub safe_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe_mode_reason: Option<String>,
}

/// Wire tag of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "bot:status")]
    BotStatus,
    #[serde(rename = "bot:log")]
    BotLog,
    #[serde(rename = "bot:startup")]
    BotStartup,
    #[serde(rename = "bot:shutdown")]
    BotShutdown,
    #[serde(rename = "bot:crash")]
    BotCrash,
    #[serde(rename = "connection:authenticated")]
    ConnectionAuthenticated,
    #[serde(rename = "panel:updated")]
    PanelUpdated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BotStatus => "bot:status",
            EventKind::BotLog => "bot:log",
            EventKind::BotStartup => "bot:startup",
            EventKind::BotShutdown => "bot:shutdown",
            EventKind::BotCrash => "bot:crash",
            EventKind::ConnectionAuthenticated => "connection:authenticated",
            EventKind::PanelUpdated => "panel:updated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events emitted by the supervisor as state transitions happen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SupervisorEvent {
    /// Status transition (start, stop, safe-mode change).
    #[serde(rename = "bot:status")]
    Status { status: WorkerStatus },

    /// One captured worker output line.
    #[serde(rename = "bot:log")]
    Log { stream: LogStream, line: String },

    /// Worker process spawned and passed the readiness wait.
    #[serde(rename = "bot:startup")]
    Startup { pid: u32 },

    /// Worker stopped by request.
    #[serde(rename = "bot:shutdown")]
    Shutdown { emergency: bool },

    /// Worker exited abnormally.
    #[serde(rename = "bot:crash")]
    Crash {
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        signal: Option<String>,
        crash_count: u32,
        safe_mode: bool,
    },

    /// Sent to a subscriber once its token has been accepted.
    #[serde(rename = "connection:authenticated")]
    Authenticated { subscriber_id: SubscriberId },

    /// A worker panel changed after an executed action.
    #[serde(rename = "panel:updated")]
    PanelUpdated { panel_id: String, data: serde_json::Value },
}

impl SupervisorEvent {
    /// The stream-envelope tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SupervisorEvent::Status { .. } => EventKind::BotStatus,
            SupervisorEvent::Log { .. } => EventKind::BotLog,
            SupervisorEvent::Startup { .. } => EventKind::BotStartup,
            SupervisorEvent::Shutdown { .. } => EventKind::BotShutdown,
            SupervisorEvent::Crash { .. } => EventKind::BotCrash,
            SupervisorEvent::Authenticated { .. } => EventKind::ConnectionAuthenticated,
            SupervisorEvent::PanelUpdated { .. } => EventKind::PanelUpdated,
        }
    }

    /// The event fields as a bare JSON object, without the type tag.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let serde_json::Value::Object(ref mut map) = value {
            map.remove("type");
        }
        value
    }

    /// One-line summary for structured logs.
    pub fn log_summary(&self) -> String {
        let t = self.kind().as_str();
        match self {
            SupervisorEvent::Status { status } => {
                format!("{t} running={} safe_mode={}", status.running, status.safe_mode)
            }
            SupervisorEvent::Log { stream, .. } => format!("{t} stream={stream:?}"),
            SupervisorEvent::Startup { pid } => format!("{t} pid={pid}"),
            SupervisorEvent::Shutdown { emergency } => format!("{t} emergency={emergency}"),
            SupervisorEvent::Crash { exit_code, crash_count, .. } => {
                format!("{t} exit_code={exit_code:?} crash_count={crash_count}")
            }
            SupervisorEvent::Authenticated { subscriber_id } => format!("{t} id={subscriber_id}"),
            SupervisorEvent::PanelUpdated { panel_id, .. } => format!("{t} panel={panel_id}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
