// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for the management socket.
//!
//! Runs in a spawned task, accepting connections and handling them without
//! blocking the supervisor. Every request gets a framed response; operation
//! failures come back as `Response::Error` with a stable reason code.

use std::path::PathBuf;
use std::sync::Arc;

use botd_core::SupervisorEvent;
use botd_wire::{read_request, write_response, ProtocolError, Request, Response};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::env::ipc_timeout;
use crate::event_bus::EventBus;
use crate::safety::{SafetyError, SafetyStore};
use crate::supervisor::{SupervisorError, WorkerSupervisor};

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub supervisor: Arc<WorkerSupervisor>,
    pub safety: Arc<SafetyStore>,
    pub event_bus: Arc<EventBus>,
    pub shutdown: Arc<Notify>,
    /// Worker data directory: backup source and restore target.
    pub data_dir: PathBuf,
}

/// Listener task for accepting management connections.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run the accept loop, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("management accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
            debug!("management client disconnected")
        }
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("management connection timeout"),
        _ => error!("management connection error: {}", e),
    }
}

/// Handle a single client connection: one request, one response.
pub async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &ListenCtx,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = read_request(&mut reader, ipc_timeout()).await?;

    // Status polling is frequent; keep it at debug.
    if matches!(request, Request::Ping | Request::Status) {
        debug!(request = ?request, "received request");
    } else {
        info!(request = ?request, "received request");
    }

    let response = handle_request(request, ctx).await;
    debug!(response = ?response, "sending response");

    write_response(&mut writer, &response, ipc_timeout()).await?;
    Ok(())
}

/// Dispatch one request. Never fails: operational errors become
/// `Response::Error` so the caller always gets a structured outcome.
async fn handle_request(request: Request, ctx: &ListenCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Status => Response::Status { status: ctx.supervisor.status() },

        Request::Start => outcome(ctx.supervisor.start().await),

        Request::Restart => outcome(ctx.supervisor.restart().await),

        Request::Shutdown { emergency } => outcome(ctx.supervisor.shutdown(emergency).await),

        Request::Logs { include_crash_snapshot } => {
            let (lines, crash_snapshot) = ctx.supervisor.logs(include_crash_snapshot);
            Response::Logs { lines, crash_snapshot }
        }

        Request::ClearLogs => {
            ctx.supervisor.clear_logs();
            Response::Ok
        }

        Request::SafeMode { enable, reason } => {
            if enable {
                let reason =
                    reason.unwrap_or_else(|| "manually enabled by operator".to_string());
                ctx.safety.enable_safe_mode(reason);
            } else {
                ctx.safety.disable_safe_mode();
            }
            ctx.event_bus
                .publish(&SupervisorEvent::Status { status: ctx.supervisor.status() });
            Response::Ok
        }

        Request::Backups => Response::Backups { backups: ctx.safety.get_backups() },

        Request::BackupCreate { version } => {
            match ctx.safety.create_backup(version, &ctx.data_dir) {
                Ok(backup) => Response::BackupCreated { backup },
                Err(e) => safety_error(e),
            }
        }

        Request::BackupRestore { at_ms } => {
            // Restoring under a live worker would race its own writes.
            if ctx.supervisor.is_running() {
                return Response::error(
                    "worker_running",
                    "Stop the bot before restoring a backup",
                );
            }
            match ctx.safety.restore_backup(at_ms, &ctx.data_dir) {
                Ok(_) => Response::Ok,
                Err(e) => safety_error(e),
            }
        }

        Request::ListPanels => worker_reply(ctx.supervisor.list_panels().await),

        Request::PanelAction { panel_id, action_id, data } => {
            worker_reply(ctx.supervisor.execute_panel_action(&panel_id, &action_id, data).await)
        }

        Request::DaemonShutdown => {
            ctx.shutdown.notify_one();
            Response::ShuttingDown
        }
    }
}

fn outcome(result: Result<(), SupervisorError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => Response::error(e.code(), e.to_string()),
    }
}

fn worker_reply(result: Result<botd_wire::ReplyData, SupervisorError>) -> Response {
    match result {
        Ok(reply) => Response::Worker {
            data: serde_json::to_value(&reply).unwrap_or_default(),
        },
        Err(e) => Response::error(e.code(), e.to_string()),
    }
}

fn safety_error(e: SafetyError) -> Response {
    Response::error(e.code(), e.to_string())
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
