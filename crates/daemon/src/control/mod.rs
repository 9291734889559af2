// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlated request/response channel into the worker.
//!
//! Each outbound request carries a unique `requestId`. A pending-map entry is
//! removed exactly once: by the matching reply, or by the per-request timeout
//! — never both. Requests are independent and may be outstanding
//! concurrently; each is cancellable only via its own timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use botd_core::{Clock, RequestId, SystemClock};
use botd_wire::{
    encode, read_message, write_message, ControlCommand, ControlEnvelope, ReplyData, ReplyEnvelope,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Control-channel failures, converted to structured errors at call sites.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The worker is not running or the channel is not attached.
    #[error("Bot is not running")]
    Unavailable,

    /// No reply arrived within the configured timeout.
    #[error("IPC request timeout")]
    Timeout,
}

struct ChannelInner {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ReplyData>>>,
    outbound: Mutex<Option<mpsc::Sender<ControlEnvelope>>>,
    timeout: Duration,
}

/// Cloneable handle to the control channel.
#[derive(Clone)]
pub struct ControlChannel {
    inner: Arc<ChannelInner>,
}

impl ControlChannel {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                timeout,
            }),
        }
    }

    /// Attach the channel to a worker transport, spawning the writer and
    /// reader tasks. A previously attached transport is replaced.
    ///
    /// Entries pending at detach time are left to resolve via their own
    /// timeouts, preserving the resolve-exactly-once contract.
    pub fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<ControlEnvelope>(64);
        *self.inner.outbound.lock() = Some(tx);

        self.spawn_writer(writer, rx);
        self.spawn_reader(reader);
    }

    /// Drop the outbound transport. Subsequent requests fail fast with
    /// [`ControlError::Unavailable`].
    pub fn detach(&self) {
        self.inner.outbound.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.inner.outbound.lock().is_some()
    }

    /// Number of requests currently awaiting a reply.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Send a request and await its correlated reply.
    ///
    /// Fails immediately — no send attempt — when no transport is attached.
    pub async fn request(&self, command: &ControlCommand) -> Result<ReplyData, ControlError> {
        let sender =
            self.inner.outbound.lock().clone().ok_or(ControlError::Unavailable)?;

        let request_id = RequestId::generate(command.kind(), SystemClock.epoch_ms());
        let envelope = ControlEnvelope::new(command, request_id.clone());

        let (reply_tx, mut reply_rx) = oneshot::channel();
        self.inner.pending.lock().insert(request_id.clone(), reply_tx);

        if sender.send(envelope).await.is_err() {
            // Writer task is gone; undo the registration.
            self.inner.pending.lock().remove(&request_id);
            self.detach();
            return Err(ControlError::Unavailable);
        }

        match tokio::time::timeout(self.inner.timeout, &mut reply_rx).await {
            Ok(Ok(data)) => Ok(data),
            // Sender dropped without a reply; entry is already gone.
            Ok(Err(_)) => Err(ControlError::Unavailable),
            Err(_elapsed) => {
                // Timeout and reply can race: only the side that removes the
                // pending entry wins, so a reply that landed in the gap is
                // still delivered.
                let abandoned = self.inner.pending.lock().remove(&request_id);
                match abandoned {
                    Some(_abandoned) => Err(ControlError::Timeout),
                    None => reply_rx.await.map_err(|_| ControlError::Timeout),
                }
            }
        }
    }

    fn spawn_writer(&self, mut writer: impl AsyncWrite + Unpin + Send + 'static, mut rx: mpsc::Receiver<ControlEnvelope>) {
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let payload = match encode(&envelope) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "failed to encode control envelope");
                        continue;
                    }
                };
                if let Err(e) = write_message(&mut writer, &payload).await {
                    warn!(error = %e, "control channel write failed");
                    break;
                }
            }
        });
    }

    fn spawn_reader(&self, mut reader: impl AsyncRead + Unpin + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let payload = match read_message(&mut reader).await {
                    Ok(p) => p,
                    Err(e) => {
                        debug!(error = %e, "control channel closed");
                        break;
                    }
                };
                let reply: ReplyEnvelope = match serde_json::from_slice(&payload) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "discarding malformed control reply");
                        continue;
                    }
                };
                match inner.pending.lock().remove(&reply.request_id) {
                    Some(tx) => {
                        let _ = tx.send(reply.data);
                    }
                    None => {
                        // Late reply after its timeout already resolved.
                        debug!(request_id = %reply.request_id, "reply for unknown request");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
