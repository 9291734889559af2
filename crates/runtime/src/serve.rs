// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket serve loop.
//!
//! Binds the Unix socket named by the supervisor (via `BOTD_CONTROL_SOCKET`)
//! and answers framed envelopes until shutdown. The supervisor reconnects
//! after its own restarts, so the loop keeps accepting.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use botd_core::Clock;
use botd_wire::{encode, read_message, write_message, RawEnvelope};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::router::{CommandRouter, RouterOutcome, WorkerCommands};

/// Cadence of the idle rate-bucket sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind control socket at {0}: {1}")]
    Bind(std::path::PathBuf, std::io::Error),
}

/// Serve the control socket until `shutdown` is cancelled.
pub async fn serve<H, C>(
    socket_path: &Path,
    router: Arc<CommandRouter<H, C>>,
    shutdown: CancellationToken,
) -> Result<(), ServeError>
where
    H: WorkerCommands + 'static,
    C: Clock + 'static,
{
    // Stale socket from a previous run blocks the bind.
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)
        .map_err(|e| ServeError::Bind(socket_path.to_path_buf(), e))?;
    info!(path = %socket_path.display(), "control socket listening");

    let sweeper = {
        let router = Arc::clone(&router);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => router.sweep(),
                }
            }
        })
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let router = Arc::clone(&router);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, router, shutdown).await;
                    });
                }
                Err(e) => warn!("control accept error: {}", e),
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    sweeper.abort();
    Ok(())
}

async fn handle_connection<H, C>(
    mut stream: UnixStream,
    router: Arc<CommandRouter<H, C>>,
    shutdown: CancellationToken,
) where
    H: WorkerCommands,
    C: Clock,
{
    debug!("supervisor connected to control socket");
    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = read_message(&mut stream) => match result {
                Ok(payload) => payload,
                Err(e) => {
                    debug!(error = %e, "control connection closed");
                    break;
                }
            }
        };

        let raw = RawEnvelope::from_bytes(&payload);
        match router.route(&raw, "supervisor").await {
            RouterOutcome::Drop => {}
            RouterOutcome::Reply(reply) => {
                let frame = match encode(&reply) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "failed to encode reply");
                        continue;
                    }
                };
                if let Err(e) = write_message(&mut stream, &frame).await {
                    warn!(error = %e, "control write failed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;
