// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound command validation, rate limiting, and dispatch.

use std::time::Duration;

use async_trait::async_trait;
use botd_core::{Clock, RateLimiter, SystemClock};
use botd_wire::{CommandParseError, ControlCommand, RawEnvelope, ReplyData, ReplyEnvelope};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Handlers the embedding runtime provides, one per command.
///
/// The dispatch match in [`CommandRouter::route`] is exhaustive over
/// [`ControlCommand`], so adding a command without a handler fails to
/// compile.
#[async_trait]
pub trait WorkerCommands: Send + Sync {
    /// Worker-side runtime status.
    async fn status(&self) -> ReplyData;
    /// Enumerate admin panels.
    async fn list_panels(&self) -> ReplyData;
    /// Execute one panel action.
    async fn execute_action(
        &self,
        panel_id: String,
        action_id: String,
        data: serde_json::Value,
    ) -> ReplyData;
}

/// Router tuning.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Token-bucket capacity per caller.
    pub rate_capacity: u32,
    /// Time to mint one token back.
    pub rate_refill: Duration,
    /// Idle buckets older than this are evicted by [`CommandRouter::sweep`].
    pub rate_idle_eviction: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            rate_capacity: 5,
            rate_refill: Duration::from_millis(1000),
            rate_idle_eviction: Duration::from_secs(300),
        }
    }
}

/// What to do with one inbound envelope.
#[derive(Debug)]
pub enum RouterOutcome {
    /// Send this reply back over the channel.
    Reply(ReplyEnvelope),
    /// Malformed beyond repair (no `requestId`): drop silently, the caller
    /// has nothing to correlate a reply with.
    Drop,
}

/// Validates, rate-limits, and dispatches inbound control messages.
pub struct CommandRouter<H, C: Clock = SystemClock> {
    handlers: H,
    buckets: Mutex<RateLimiter<String, C>>,
    config: RouterConfig,
}

impl<H: WorkerCommands> CommandRouter<H> {
    pub fn new(handlers: H, config: RouterConfig) -> Self {
        Self::with_clock(handlers, config, SystemClock)
    }
}

impl<H: WorkerCommands, C: Clock> CommandRouter<H, C> {
    pub fn with_clock(handlers: H, config: RouterConfig, clock: C) -> Self {
        Self {
            handlers,
            buckets: Mutex::new(RateLimiter::with_clock(
                config.rate_capacity,
                config.rate_refill,
                clock,
            )),
            config,
        }
    }

    /// Process one raw envelope from `peer`.
    ///
    /// Validation order matters: an envelope without a `requestId` is
    /// dropped with no reply, while any later failure (bad fields, unknown
    /// type, rate limit) still gets an error reply so the caller's pending
    /// future resolves.
    pub async fn route(&self, raw: &RawEnvelope, peer: &str) -> RouterOutcome {
        let Some(request_id) = raw.request_id.clone() else {
            debug!(peer, kind = ?raw.kind, "dropping envelope without requestId");
            return RouterOutcome::Drop;
        };

        let command = match raw.command() {
            Ok(command) => command,
            Err(e) => {
                let message = match &e {
                    CommandParseError::UnknownType(kind) => {
                        warn!(peer, kind = %kind, "unknown message type");
                        format!("unknown message type: {kind}")
                    }
                    other => other.to_string(),
                };
                return RouterOutcome::Reply(ReplyEnvelope::new(
                    request_id,
                    ReplyData::err(message),
                ));
            }
        };

        // Read-only commands bypass the bucket; everything else spends one
        // token from the caller's bucket.
        if !command.is_read_only() {
            let caller = raw.caller.clone().unwrap_or_else(|| peer.to_string());
            if !self.buckets.lock().try_acquire(caller.clone()) {
                debug!(peer, caller = %caller, "rate limit exhausted");
                return RouterOutcome::Reply(ReplyEnvelope::new(
                    request_id,
                    ReplyData::err("rate limit exceeded, try again later"),
                ));
            }
        }

        let data = match command {
            ControlCommand::Ping => ReplyData::ok(),
            ControlCommand::GetStatus => self.handlers.status().await,
            ControlCommand::ListPanels => self.handlers.list_panels().await,
            ControlCommand::ExecuteAction { panel_id, action_id, data } => {
                self.handlers.execute_action(panel_id, action_id, data).await
            }
        };
        RouterOutcome::Reply(ReplyEnvelope::new(request_id, data))
    }

    /// Evict idle rate buckets.
    pub fn sweep(&self) {
        self.buckets.lock().sweep(self.config.rate_idle_eviction);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
