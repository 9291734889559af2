// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash records and the rolling-window arithmetic behind safe-mode entry.

use serde::{Deserialize, Serialize};

/// How long crash records stay in the in-memory/persisted history.
pub const CRASH_HISTORY_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;

/// Max log lines captured into a crash record.
pub const CRASH_SNIPPET_MAX_LINES: usize = 50;

/// One abnormal worker exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    /// Wall-clock time of the exit, epoch milliseconds.
    pub at_ms: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub signal: Option<String>,
    /// Tail of the log buffer at crash time, at most
    /// [`CRASH_SNIPPET_MAX_LINES`] lines.
    #[serde(default)]
    pub log_snippet: Vec<String>,
}

impl CrashRecord {
    pub fn new(
        at_ms: u64,
        exit_code: Option<i32>,
        signal: Option<String>,
        logs: &[String],
    ) -> Self {
        let skip = logs.len().saturating_sub(CRASH_SNIPPET_MAX_LINES);
        Self { at_ms, exit_code, signal, log_snippet: logs[skip..].to_vec() }
    }
}

/// Drop records older than [`CRASH_HISTORY_RETENTION_MS`].
pub fn prune_history(history: &mut Vec<CrashRecord>, now_ms: u64) {
    history.retain(|record| now_ms.saturating_sub(record.at_ms) < CRASH_HISTORY_RETENTION_MS);
}

/// Count records with timestamps inside the trailing `window_ms`.
pub fn count_in_window(history: &[CrashRecord], now_ms: u64, window_ms: u64) -> usize {
    history
        .iter()
        .filter(|record| now_ms.saturating_sub(record.at_ms) <= window_ms)
        .count()
}

#[cfg(test)]
#[path = "crash_tests.rs"]
mod tests;
