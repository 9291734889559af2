// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-stream envelope sent to WebSocket subscribers.

use botd_core::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One broadcast frame: `{type, data, timestamp, sequence}`.
///
/// `sequence` is a monotonically increasing global counter so subscribers can
/// detect gaps; `timestamp` is RFC-3339.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
    pub timestamp: String,
    pub sequence: u64,
}

impl EventFrame {
    pub fn new(kind: EventKind, data: Value, timestamp: String, sequence: u64) -> Self {
        Self { kind, data, timestamp, sequence }
    }

    /// Serialize once for fan-out to every subscriber.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
