// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker lifecycle supervision.
//!
//! Owns the single worker process handle. Lifecycle operations (start,
//! restart, graceful shutdown) are serialized by one mutual-exclusion flag —
//! a second concurrent call is rejected, not queued. Emergency shutdown is
//! the only operation allowed to bypass that flag, since it must always be
//! able to terminate a runaway worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use botd_core::{
    Clock, LogBuffer, LogStream, SupervisorEvent, SystemClock, WorkerStatus,
    CRASH_SNIPPET_MAX_LINES,
};
use botd_wire::{ControlCommand, ReplyData};
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::control::{ControlChannel, ControlError};
use crate::event_bus::EventBus;
use crate::safety::SafetyStore;
use crate::worker::{
    connect_control, signal_worker, spawn_worker, SpawnedWorker, WorkerExit, WorkerLaunch,
};

/// Lines frozen into the viewable crash snapshot.
const CRASH_SNAPSHOT_LINES: usize = 500;

/// How far back the readiness wait scans for the ready marker.
const READY_LOOKBACK_LINES: usize = 200;

/// Control-socket connect retry cadence after spawn.
const CONNECT_ATTEMPTS: usize = 100;
const CONNECT_DELAY: Duration = Duration::from_millis(100);

/// Poll cadence while waiting for the exit monitor to reap a process.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Structured outcomes of supervisor operations. The `code()` string is what
/// management clients switch on; `Display` is the displayable message.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Bot is already running")]
    AlreadyRunning,

    #[error("Another lifecycle operation is in progress")]
    OperationInProgress,

    #[error("Bot token or worker command is not configured")]
    CredentialsMissing,

    #[error("Bot process exited before becoming ready")]
    StartupFailed,

    #[error("Failed to spawn bot process: {0}")]
    Spawn(String),

    #[error("IPC request timeout")]
    IpcTimeout,

    #[error("Bot is not running")]
    ChannelUnavailable,
}

impl SupervisorError {
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::AlreadyRunning => "already_running",
            SupervisorError::OperationInProgress => "operation_in_progress",
            SupervisorError::CredentialsMissing => "credentials_missing",
            SupervisorError::StartupFailed => "startup_failed",
            SupervisorError::Spawn(_) => "spawn_failed",
            SupervisorError::IpcTimeout => "ipc_timeout",
            SupervisorError::ChannelUnavailable => "ipc_unavailable",
        }
    }
}

impl From<ControlError> for SupervisorError {
    fn from(e: ControlError) -> Self {
        match e {
            ControlError::Unavailable => SupervisorError::ChannelUnavailable,
            ControlError::Timeout => SupervisorError::IpcTimeout,
        }
    }
}

/// Supervisor tuning and launch parameters.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Worker program + args.
    pub worker_command: Vec<String>,
    /// Required launch credential, forwarded as `BOTD_BOT_TOKEN`.
    pub bot_token: Option<String>,
    /// Worker working/data directory.
    pub data_dir: PathBuf,
    /// Control socket the worker binds and the supervisor connects to.
    pub control_socket: PathBuf,
    /// Log substring that marks the worker ready.
    pub ready_marker: String,
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    /// Grace window for graceful stop and post-start health validation.
    pub grace_period: Duration,
}

/// The live worker process. Exactly one exists at a time; created by `start`,
/// destroyed by the exit monitor.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub pid: u32,
    pub started_at: Instant,
    pub started_at_ms: u64,
}

pub struct WorkerSupervisor {
    config: SupervisorConfig,
    /// Lifecycle mutual exclusion. A flag, not a queue: concurrent operations
    /// are rejected with `operation_in_progress`.
    op_in_progress: AtomicBool,
    handle: Mutex<Option<WorkerHandle>>,
    /// Sticky crash marker for status reporting; cleared by a successful
    /// start or a clean exit.
    crashed: AtomicBool,
    logs: Mutex<LogBuffer>,
    safety: Arc<SafetyStore>,
    bus: Arc<EventBus>,
    control: ControlChannel,
}

/// Clears the lifecycle flag when the operation finishes.
struct OpGuard<'a>(&'a AtomicBool);

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum Readiness {
    /// The ready marker appeared in the log buffer.
    Marker,
    /// No marker, but the process was still alive at the deadline. Treated
    /// as started — a heuristic, not a guarantee.
    AliveAtDeadline,
    /// The process died before readiness was observed.
    Exited,
}

impl WorkerSupervisor {
    pub fn new(
        config: SupervisorConfig,
        safety: Arc<SafetyStore>,
        bus: Arc<EventBus>,
        control: ControlChannel,
    ) -> Self {
        Self {
            config,
            op_in_progress: AtomicBool::new(false),
            handle: Mutex::new(None),
            crashed: AtomicBool::new(false),
            logs: Mutex::new(LogBuffer::default()),
            safety,
            bus,
            control,
        }
    }

    fn begin_op(&self) -> Result<OpGuard<'_>, SupervisorError> {
        if self
            .op_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SupervisorError::OperationInProgress);
        }
        Ok(OpGuard(&self.op_in_progress))
    }

    /// Start the worker.
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let _guard = self.begin_op()?;
        self.start_locked().await
    }

    /// Restart the worker: graceful stop when running, then a normal start,
    /// all under the same held lifecycle flag.
    pub async fn restart(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let _guard = self.begin_op()?;
        if self.is_running() {
            self.stop_locked(false).await;
        }
        self.start_locked().await
    }

    /// Stop the worker.
    ///
    /// Emergency shutdown kills immediately and deliberately bypasses the
    /// lifecycle flag. Graceful shutdown takes the flag, asks politely with
    /// SIGTERM, and force-kills after the grace window.
    pub async fn shutdown(self: &Arc<Self>, emergency: bool) -> Result<(), SupervisorError> {
        if emergency {
            self.stop_locked(true).await;
            return Ok(());
        }
        let _guard = self.begin_op()?;
        self.stop_locked(false).await;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    fn current_pid(&self) -> Option<u32> {
        self.handle.lock().as_ref().map(|h| h.pid)
    }

    pub fn status(&self) -> WorkerStatus {
        let (running, uptime_secs, pid) = {
            let handle = self.handle.lock();
            match handle.as_ref() {
                Some(h) => (true, h.started_at.elapsed().as_secs(), Some(h.pid)),
                None => (false, 0, None),
            }
        };
        WorkerStatus {
            running,
            uptime_secs,
            pid,
            crashed: self.crashed.load(Ordering::SeqCst),
            safe_mode: self.safety.is_in_safe_mode(),
            safe_mode_reason: self.safety.safe_mode_reason(),
        }
    }

    /// Current log buffer, optionally with the retained crash snapshot.
    pub fn logs(&self, include_crash_snapshot: bool) -> (Vec<String>, Option<Vec<String>>) {
        let logs = self.logs.lock();
        let snapshot = if include_crash_snapshot {
            logs.crash_snapshot().map(<[String]>::to_vec)
        } else {
            None
        };
        (logs.lines(), snapshot)
    }

    pub fn clear_logs(&self) {
        self.logs.lock().clear();
    }

    /// Pass-through: enumerate the worker's admin panels.
    pub async fn list_panels(&self) -> Result<ReplyData, SupervisorError> {
        Ok(self.control.request(&ControlCommand::ListPanels).await?)
    }

    /// Pass-through: execute a panel action in the worker. A successful
    /// action is broadcast as `panel:updated`.
    pub async fn execute_panel_action(
        &self,
        panel_id: &str,
        action_id: &str,
        data: serde_json::Value,
    ) -> Result<ReplyData, SupervisorError> {
        let reply = self
            .control
            .request(&ControlCommand::ExecuteAction {
                panel_id: panel_id.to_string(),
                action_id: action_id.to_string(),
                data,
            })
            .await?;
        if reply.success {
            self.bus.publish(&SupervisorEvent::PanelUpdated {
                panel_id: panel_id.to_string(),
                data: serde_json::Value::Object(reply.rest.clone()),
            });
        }
        Ok(reply)
    }

    async fn start_locked(self: &Arc<Self>) -> Result<(), SupervisorError> {
        if self.is_running() {
            return Err(SupervisorError::AlreadyRunning);
        }
        if self.config.worker_command.is_empty() {
            return Err(SupervisorError::CredentialsMissing);
        }
        let token =
            self.config.bot_token.clone().ok_or(SupervisorError::CredentialsMissing)?;

        // Stale socket from a previous run would make the worker's bind fail.
        let _ = std::fs::remove_file(&self.config.control_socket);

        let launch = WorkerLaunch {
            command: self.config.worker_command.clone(),
            env: vec![
                ("BOTD_BOT_TOKEN".to_string(), token),
                (
                    "BOTD_CONTROL_SOCKET".to_string(),
                    self.config.control_socket.to_string_lossy().into_owned(),
                ),
            ],
            cwd: self.config.data_dir.clone(),
        };
        let SpawnedWorker { pid, lines, exit } =
            spawn_worker(&launch).map_err(|e| SupervisorError::Spawn(e.to_string()))?;

        *self.handle.lock() = Some(WorkerHandle {
            pid,
            started_at: Instant::now(),
            started_at_ms: SystemClock.epoch_ms(),
        });
        self.crashed.store(false, Ordering::SeqCst);
        info!(pid, "worker spawned");

        self.spawn_log_pump(lines);
        self.spawn_exit_monitor(pid, exit);
        self.spawn_control_connector(pid);

        match self.wait_ready().await {
            Readiness::Marker => info!(pid, "worker reported ready"),
            Readiness::AliveAtDeadline => {
                warn!(pid, "no ready marker before deadline; process alive, treating as started")
            }
            Readiness::Exited => return Err(SupervisorError::StartupFailed),
        }

        self.bus.publish(&SupervisorEvent::Startup { pid });
        self.publish_status();

        // Liveness probe: a worker still alive after the grace window counts
        // as a successful start for crash-loop accounting.
        let supervisor = Arc::clone(self);
        let grace = self.config.grace_period;
        tokio::spawn(async move {
            let probe_pid = pid;
            let alive = {
                let supervisor = Arc::clone(&supervisor);
                move || supervisor.current_pid() == Some(probe_pid)
            };
            supervisor.safety.validate_health(grace, alive).await;
        });

        Ok(())
    }

    /// Deliver SIGTERM (or SIGKILL when emergency), wait for the exit monitor
    /// to reap the process, escalating to SIGKILL after the grace window.
    async fn stop_locked(self: &Arc<Self>, emergency: bool) {
        let Some(pid) = self.current_pid() else {
            return;
        };
        self.bus.publish(&SupervisorEvent::Shutdown { emergency });

        if emergency {
            warn!(pid, "emergency shutdown, killing worker");
            signal_worker(pid, Signal::SIGKILL);
            self.wait_reaped(pid, self.config.grace_period).await;
            return;
        }

        info!(pid, "graceful shutdown requested");
        signal_worker(pid, Signal::SIGTERM);
        if !self.wait_reaped(pid, self.config.grace_period).await {
            warn!(pid, "worker ignored SIGTERM, escalating to SIGKILL");
            signal_worker(pid, Signal::SIGKILL);
            self.wait_reaped(pid, self.config.grace_period).await;
        }
    }

    /// Poll until the exit monitor has cleared `pid` from the handle, bounded
    /// by `timeout`. Returns false when the process is still there.
    async fn wait_reaped(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.current_pid() != Some(pid) {
                return true;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
        self.current_pid() != Some(pid)
    }

    /// Bounded readiness wait: poll the log buffer for the marker until the
    /// timeout, treating a still-alive process at the deadline as started.
    ///
    /// Only lines that arrived after this spawn are scanned — a marker left
    /// over from the previous run must not count.
    async fn wait_ready(&self) -> Readiness {
        let baseline = self.logs.lock().len();
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            let marker_seen = {
                let logs = self.logs.lock();
                let fresh = logs.len().saturating_sub(baseline).min(READY_LOOKBACK_LINES);
                fresh > 0 && logs.contains_marker(&self.config.ready_marker, fresh)
            };
            if marker_seen {
                return Readiness::Marker;
            }
            if !self.is_running() {
                return Readiness::Exited;
            }
            if Instant::now() >= deadline {
                return if self.is_running() {
                    Readiness::AliveAtDeadline
                } else {
                    Readiness::Exited
                };
            }
            tokio::time::sleep(self.config.ready_poll).await;
        }
    }

    fn spawn_log_pump(self: &Arc<Self>, mut lines: mpsc::Receiver<(LogStream, String)>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            while let Some((stream, line)) = lines.recv().await {
                supervisor.logs.lock().push(line.clone());
                supervisor.bus.publish(&SupervisorEvent::Log { stream, line });
            }
        });
    }

    fn spawn_exit_monitor(self: &Arc<Self>, pid: u32, exit: oneshot::Receiver<WorkerExit>) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(exit) = exit.await else { return };
            supervisor.handle_exit(pid, exit);
        });
    }

    /// Classify an observed exit and update crash state.
    fn handle_exit(&self, pid: u32, exit: WorkerExit) {
        {
            let mut handle = self.handle.lock();
            match handle.as_ref() {
                Some(h) if h.pid == pid => *handle = None,
                // A newer worker owns the handle; this exit was already
                // accounted for.
                _ => return,
            }
        }
        self.control.detach();

        if exit.is_crash() {
            let tail = {
                let mut logs = self.logs.lock();
                logs.capture_crash_snapshot(CRASH_SNAPSHOT_LINES);
                logs.tail(CRASH_SNIPPET_MAX_LINES)
            };
            let outcome = self.safety.record_crash(exit.code, exit.signal.clone(), &tail);
            self.crashed.store(true, Ordering::SeqCst);
            warn!(
                pid,
                exit_code = ?exit.code,
                signal = ?exit.signal,
                crash_count = outcome.crash_count,
                "worker crashed"
            );
            self.bus.publish(&SupervisorEvent::Crash {
                exit_code: exit.code,
                signal: exit.signal,
                crash_count: outcome.crash_count,
                safe_mode: self.safety.is_in_safe_mode(),
            });
        } else {
            info!(pid, exit_code = ?exit.code, signal = ?exit.signal, "worker exited cleanly");
            self.crashed.store(false, Ordering::SeqCst);
            self.logs.lock().clear_crash_snapshot();
        }
        self.publish_status();
    }

    /// Connect the control channel once the freshly spawned worker binds its
    /// socket. Abandoned quietly if that worker is gone by connect time.
    fn spawn_control_connector(self: &Arc<Self>, pid: u32) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let socket = supervisor.config.control_socket.clone();
            match connect_control(&socket, CONNECT_ATTEMPTS, CONNECT_DELAY).await {
                Some(stream) if supervisor.current_pid() == Some(pid) => {
                    let (read_half, write_half) = stream.into_split();
                    supervisor.control.attach(read_half, write_half);
                    info!(pid, "control channel attached");
                }
                Some(_) | None => {
                    info!(pid, "control channel not attached (worker gone or socket missing)");
                }
            }
        });
    }

    fn publish_status(&self) {
        self.bus.publish(&SupervisorEvent::Status { status: self.status() });
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
