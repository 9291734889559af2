// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker process adapter: spawning, output capture, exit classification,
//! signal delivery, and the control-socket connection.
//!
//! The supervisor never touches `tokio::process` directly; everything flows
//! through this module so the process transport stays swappable.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use botd_core::LogStream;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl WorkerExit {
    pub fn from_status(status: ExitStatus) -> Self {
        Self { code: status.code(), signal: status.signal().map(signal_name) }
    }

    /// Crash classification.
    ///
    /// A non-zero exit code is always a crash, even when the worker chose
    /// that code deliberately. Termination by the supervisor's own signals
    /// (SIGTERM/SIGKILL) is a clean stop; any other signal is a crash.
    pub fn is_crash(&self) -> bool {
        match (self.code, self.signal.as_deref()) {
            (Some(code), _) => code != 0,
            (None, Some("SIGTERM")) | (None, Some("SIGKILL")) => false,
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }
}

fn signal_name(signal: i32) -> String {
    match Signal::try_from(signal) {
        Ok(sig) => sig.as_str().to_string(),
        Err(_) => format!("signal {signal}"),
    }
}

/// Parameters for one worker launch.
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    /// Program + args; never run through a shell.
    pub command: Vec<String>,
    /// Extra environment (bot token, control-socket path).
    pub env: Vec<(String, String)>,
    /// Working directory (the worker data dir).
    pub cwd: PathBuf,
}

/// A freshly spawned worker: its pid, a line stream from stdout+stderr, and
/// a one-shot exit notification.
#[derive(Debug)]
pub struct SpawnedWorker {
    pub pid: u32,
    pub lines: mpsc::Receiver<(LogStream, String)>,
    pub exit: oneshot::Receiver<WorkerExit>,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("worker command is not configured")]
    NoCommand,

    #[error("failed to spawn worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker spawned without a pid")]
    NoPid,
}

/// Spawn the worker with captured stdout/stderr.
///
/// Output pumps and the exit waiter run as background tasks; the returned
/// channels close when the process is gone.
pub fn spawn_worker(launch: &WorkerLaunch) -> Result<SpawnedWorker, SpawnError> {
    let (program, args) = launch.command.split_first().ok_or(SpawnError::NoCommand)?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .current_dir(&launch.cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    for (key, value) in &launch.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id().ok_or(SpawnError::NoPid)?;

    let (line_tx, line_rx) = mpsc::channel::<(LogStream, String)>(1024);
    if let Some(stdout) = child.stdout.take() {
        pump_lines(stdout, LogStream::Stdout, line_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        pump_lines(stderr, LogStream::Stderr, line_tx);
    }

    // Waiter task doubles as the reaper; it owns the child handle. Kills are
    // delivered by pid so no one else needs `&mut Child`.
    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        let exit = match child.wait().await {
            Ok(status) => WorkerExit::from_status(status),
            Err(e) => {
                warn!(error = %e, "failed to wait on worker process");
                WorkerExit { code: None, signal: None }
            }
        };
        let _ = exit_tx.send(exit);
    });

    Ok(SpawnedWorker { pid, lines: line_rx, exit: exit_rx })
}

fn pump_lines<R>(reader: R, stream: LogStream, tx: mpsc::Sender<(LogStream, String)>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).await.is_err() {
                break;
            }
        }
    });
}

/// Send a signal to the worker by pid. Errors (already-gone process) are
/// logged and swallowed — the exit waiter reports the authoritative outcome.
pub fn signal_worker(pid: u32, signal: Signal) {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => debug!(pid, signal = %signal, "signal sent to worker"),
        Err(e) => debug!(pid, signal = %signal, error = %e, "signal delivery failed"),
    }
}

/// Connect to the worker's control socket, retrying while it starts up.
pub async fn connect_control(
    socket_path: &std::path::Path,
    attempts: usize,
    delay: Duration,
) -> Option<UnixStream> {
    for i in 0..attempts {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        match UnixStream::connect(socket_path).await {
            Ok(stream) => return Some(stream),
            Err(_) => continue,
        }
    }
    warn!(path = %socket_path.display(), attempts, "control socket connect failed");
    None
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
