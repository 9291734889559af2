// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent safety state: crash history, safe mode, rollback snapshots.
//!
//! All mutation goes through [`SafetyStore`]. Routine updates are persisted
//! through a debounced background flusher; safe-mode transitions are written
//! immediately because they are the state a crash-looping system must not
//! lose.

mod backups;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use botd_core::{
    count_in_window, prune_history, BackupMetadata, Clock, CrashRecord, SystemClock,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Per-crash audit files older than this are pruned on each crash.
const CRASH_FILE_RETENTION_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Reason prefix for threshold-induced safe mode. `record_successful_start`
/// clears safe mode only when the reason carries this prefix; manually-set
/// safe mode survives a healthy start.
const CRASH_THRESHOLD_PREFIX: &str = "crash threshold";

fn default_max_consecutive_crashes() -> u32 {
    3
}

fn default_crash_window_ms() -> u64 {
    300_000
}

/// The persisted safety singleton.
///
/// Invariant: `safe_mode == true` always carries a non-empty
/// `safe_mode_reason`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub safe_mode: bool,
    #[serde(default)]
    pub safe_mode_reason: Option<String>,
    #[serde(default = "default_max_consecutive_crashes")]
    pub max_consecutive_crashes: u32,
    #[serde(default = "default_crash_window_ms")]
    pub crash_window_ms: u64,
    #[serde(default)]
    pub crash_count: u32,
    #[serde(default)]
    pub crash_history: Vec<CrashRecord>,
    #[serde(default)]
    pub last_successful_start_ms: Option<u64>,
    #[serde(default)]
    pub rollback_snapshot: Option<BackupMetadata>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            safe_mode: false,
            safe_mode_reason: None,
            max_consecutive_crashes: default_max_consecutive_crashes(),
            crash_window_ms: default_crash_window_ms(),
            crash_count: 0,
            crash_history: Vec::new(),
            last_successful_start_ms: None,
            rollback_snapshot: None,
        }
    }
}

/// Where safety state lives on disk.
#[derive(Debug, Clone)]
pub struct SafetyPaths {
    /// The JSON safety singleton.
    pub config_path: PathBuf,
    /// One audit file per crash.
    pub crashes_dir: PathBuf,
    /// One directory per backup, with a metadata sidecar.
    pub backups_dir: PathBuf,
}

/// How a mutation reaches disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Written synchronously before the mutation returns.
    Immediate,
    /// Batched through the background flusher.
    Debounced,
}

/// Outcome of recording one crash.
#[derive(Debug, Clone)]
pub struct CrashOutcome {
    pub record: CrashRecord,
    pub crash_count: u32,
    pub crashes_in_window: usize,
    /// True when this crash tripped the threshold and safe mode was entered.
    pub safe_mode_entered: bool,
}

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no backup exists for timestamp {0}")]
    RollbackUnavailable(u64),

    #[error("backup {0} is corrupted: {1}")]
    RollbackCorrupted(u64, String),
}

impl SafetyError {
    /// Stable reason code for the management surface.
    pub fn code(&self) -> &'static str {
        match self {
            SafetyError::Io(_) => "io_error",
            SafetyError::Json(_) => "state_corrupted",
            SafetyError::RollbackUnavailable(_) => "rollback_unavailable",
            SafetyError::RollbackCorrupted(_, _) => "rollback_corrupted",
        }
    }
}

/// State manager for crash history, safe mode, and backups.
pub struct SafetyStore<C: Clock = SystemClock> {
    paths: SafetyPaths,
    state: Mutex<SafetyConfig>,
    clock: C,
    dirty: AtomicBool,
    flush_signal: Notify,
}

impl SafetyStore<SystemClock> {
    /// Load persisted state, or start fresh when none exists.
    pub fn load(paths: SafetyPaths) -> Result<Self, SafetyError> {
        Self::load_with_clock(paths, SystemClock)
    }
}

impl<C: Clock + 'static> SafetyStore<C> {
    pub fn load_with_clock(paths: SafetyPaths, clock: C) -> Result<Self, SafetyError> {
        let state = match std::fs::read(&paths.config_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SafetyConfig::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            paths,
            state: Mutex::new(state),
            clock,
            dirty: AtomicBool::new(false),
            flush_signal: Notify::new(),
        })
    }

    /// Spawn the background flusher that batches debounced writes.
    pub fn spawn_flusher(store: Arc<Self>, debounce: Duration) {
        tokio::spawn(async move {
            loop {
                store.flush_signal.notified().await;
                tokio::time::sleep(debounce).await;
                store.flush();
            }
        });
    }

    /// Write any pending debounced state now.
    pub fn flush(&self) {
        if self.dirty.swap(false, Ordering::SeqCst) {
            let snapshot = self.state.lock().clone();
            if let Err(e) = self.write_config(&snapshot) {
                warn!(error = %e, "failed to persist safety state");
            }
        }
    }

    fn persist(&self, mode: PersistMode) {
        match mode {
            PersistMode::Immediate => {
                // Clear any queued debounced write; this write supersedes it.
                self.dirty.store(false, Ordering::SeqCst);
                let snapshot = self.state.lock().clone();
                if let Err(e) = self.write_config(&snapshot) {
                    warn!(error = %e, "failed to persist safety state");
                }
            }
            PersistMode::Debounced => {
                self.dirty.store(true, Ordering::SeqCst);
                self.flush_signal.notify_one();
            }
        }
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn write_config(&self, state: &SafetyConfig) -> Result<(), SafetyError> {
        let payload = serde_json::to_vec_pretty(state)?;
        let tmp = self.paths.config_path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &self.paths.config_path)?;
        Ok(())
    }

    /// Record one abnormal exit.
    ///
    /// Appends to history, prunes records outside the 24h retention, writes
    /// the per-crash audit file, and enters safe mode when the count inside
    /// `crash_window_ms` reaches `max_consecutive_crashes`.
    pub fn record_crash(
        &self,
        exit_code: Option<i32>,
        signal: Option<String>,
        logs: &[String],
    ) -> CrashOutcome {
        let now = self.clock.epoch_ms();
        let record = CrashRecord::new(now, exit_code, signal, logs);

        let outcome = {
            let mut state = self.state.lock();
            state.crash_history.push(record.clone());
            state.crash_count = state.crash_count.saturating_add(1);
            prune_history(&mut state.crash_history, now);

            let in_window = count_in_window(&state.crash_history, now, state.crash_window_ms);
            let tripped = in_window >= state.max_consecutive_crashes as usize && !state.safe_mode;
            if tripped {
                state.safe_mode = true;
                state.safe_mode_reason = Some(format!(
                    "{CRASH_THRESHOLD_PREFIX} reached: {in_window} crashes within {}ms",
                    state.crash_window_ms
                ));
            }
            CrashOutcome {
                record: record.clone(),
                crash_count: state.crash_count,
                crashes_in_window: in_window,
                safe_mode_entered: tripped,
            }
        };

        self.write_crash_file(&record);
        self.prune_crash_files(now);

        if outcome.safe_mode_entered {
            warn!(
                crashes_in_window = outcome.crashes_in_window,
                "crash threshold exceeded, entering safe mode"
            );
            self.persist(PersistMode::Immediate);
        } else {
            self.persist(PersistMode::Debounced);
        }
        outcome
    }

    /// Reset the crash counter after a healthy start.
    ///
    /// Clears safe mode only when it was threshold-induced; manually-enabled
    /// safe mode is preserved.
    pub fn record_successful_start(&self) {
        let cleared = {
            let mut state = self.state.lock();
            state.crash_count = 0;
            state.last_successful_start_ms = Some(self.clock.epoch_ms());
            let threshold_induced = state
                .safe_mode_reason
                .as_deref()
                .is_some_and(|reason| reason.starts_with(CRASH_THRESHOLD_PREFIX));
            if state.safe_mode && threshold_induced {
                state.safe_mode = false;
                state.safe_mode_reason = None;
                true
            } else {
                false
            }
        };
        if cleared {
            info!("healthy start, clearing threshold-induced safe mode");
            self.persist(PersistMode::Immediate);
        } else {
            self.persist(PersistMode::Debounced);
        }
    }

    /// Enter safe mode. Empty reasons are replaced so the non-empty-reason
    /// invariant holds.
    pub fn enable_safe_mode(&self, reason: impl Into<String>) {
        let reason = {
            let reason = reason.into();
            if reason.trim().is_empty() {
                "safe mode enabled".to_string()
            } else {
                reason
            }
        };
        {
            let mut state = self.state.lock();
            state.safe_mode = true;
            state.safe_mode_reason = Some(reason.clone());
        }
        info!(reason = %reason, "safe mode enabled");
        self.persist(PersistMode::Immediate);
    }

    /// Leave safe mode regardless of how it was entered.
    pub fn disable_safe_mode(&self) {
        {
            let mut state = self.state.lock();
            state.safe_mode = false;
            state.safe_mode_reason = None;
        }
        info!("safe mode disabled");
        self.persist(PersistMode::Immediate);
    }

    pub fn is_in_safe_mode(&self) -> bool {
        self.state.lock().safe_mode
    }

    pub fn safe_mode_reason(&self) -> Option<String> {
        self.state.lock().safe_mode_reason.clone()
    }

    /// Point the rollback snapshot at a backup. Size is read from disk when
    /// the path exists.
    pub fn create_rollback_snapshot(&self, version: impl Into<String>, path: PathBuf) {
        let size_bytes = if path.is_dir() { backups::dir_size(&path) } else { 0 };
        let snapshot = BackupMetadata {
            at_ms: self.clock.epoch_ms(),
            version: version.into(),
            path,
            size_bytes,
        };
        self.state.lock().rollback_snapshot = Some(snapshot);
        self.persist(PersistMode::Debounced);
    }

    pub fn clear_rollback_snapshot(&self) {
        self.state.lock().rollback_snapshot = None;
        self.persist(PersistMode::Debounced);
    }

    /// The current rollback pointer, if its backup still exists on disk.
    pub fn rollback_snapshot(&self) -> Option<BackupMetadata> {
        self.state.lock().rollback_snapshot.clone().filter(BackupMetadata::is_available)
    }

    /// Copy the worker data directory into a new timestamped backup.
    pub fn create_backup(
        &self,
        version: impl Into<String>,
        source_dir: &std::path::Path,
    ) -> Result<BackupMetadata, SafetyError> {
        backups::create(&self.paths.backups_dir, self.clock.epoch_ms(), version.into(), source_dir)
    }

    /// Restore a backup into `dest_dir`.
    pub fn restore_backup(
        &self,
        at_ms: u64,
        dest_dir: &std::path::Path,
    ) -> Result<BackupMetadata, SafetyError> {
        backups::restore(&self.paths.backups_dir, at_ms, dest_dir)
    }

    /// Enumerate backups with readable sidecars, newest first.
    pub fn get_backups(&self) -> Vec<BackupMetadata> {
        backups::list(&self.paths.backups_dir)
    }

    /// Liveness probe: wait out the grace window, then record a successful
    /// start if the worker is still alive.
    pub async fn validate_health(&self, grace: Duration, probe: impl FnOnce() -> bool) {
        tokio::time::sleep(grace).await;
        if probe() {
            self.record_successful_start();
        }
    }

    /// Clone of the current state, for status reporting and tests.
    pub fn snapshot(&self) -> SafetyConfig {
        self.state.lock().clone()
    }

    fn write_crash_file(&self, record: &CrashRecord) {
        let path = self.paths.crashes_dir.join(format!("crash-{}.json", record.at_ms));
        let result = serde_json::to_vec_pretty(record)
            .map_err(SafetyError::from)
            .and_then(|payload| std::fs::write(&path, payload).map_err(SafetyError::from));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write crash audit file");
        }
    }

    /// Drop crash audit files older than 30 days, keyed by the timestamp in
    /// the filename.
    fn prune_crash_files(&self, now_ms: u64) {
        let entries = match std::fs::read_dir(&self.paths.crashes_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(at_ms) = name
                .to_str()
                .and_then(|n| n.strip_prefix("crash-"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            if now_ms.saturating_sub(at_ms) > CRASH_FILE_RETENTION_MS {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!(error = %e, "failed to prune crash audit file");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
