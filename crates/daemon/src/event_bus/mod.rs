// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated WebSocket fan-out of supervisor events.
//!
//! Subscribers connect to `/ws?token=...`; the token is checked with a
//! constant-time comparison during the handshake, before the connection is
//! admitted to the subscriber set. Per-IP connection attempts ride a token
//! bucket, a global cap bounds the subscriber set, and a heartbeat sweep
//! terminates half-open sockets that never answer pings.

mod sanitize;
pub use sanitize::sanitize;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use botd_core::{RateLimiter, SubscriberId, SupervisorEvent};
use botd_wire::EventFrame;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Event-bus tuning knobs.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Shared secret subscribers must present. Without one the bus refuses
    /// to serve.
    pub auth_token: Option<String>,
    /// Global subscriber cap.
    pub max_subscribers: usize,
    /// Connection attempts allowed per IP per rolling window.
    pub conn_limit: u32,
    /// The rolling window for `conn_limit`.
    pub conn_window: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Message>,
    remote_ip: IpAddr,
    /// True between a ping and its pong. Still true at the next sweep means
    /// the socket is half-open and gets terminated.
    awaiting_pong: bool,
}

/// Publish/subscribe fan-out for supervisor events.
pub struct EventBus {
    config: EventBusConfig,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    sequence: AtomicU64,
    conn_rate: Mutex<RateLimiter<IpAddr>>,
    /// In-process observers (tests, log mirrors); receive every frame.
    taps: Mutex<Vec<mpsc::UnboundedSender<EventFrame>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let refill = config.conn_window / config.conn_limit.max(1);
        Self {
            conn_rate: Mutex::new(RateLimiter::new(config.conn_limit, refill)),
            config,
            subscribers: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            taps: Mutex::new(Vec::new()),
        }
    }

    /// Register an in-process observer of every broadcast frame.
    pub fn tap(&self) -> mpsc::UnboundedReceiver<EventFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Broadcast one event to every open subscriber.
    ///
    /// The envelope is serialized once; subscribers whose channel is gone are
    /// removed. A failure for one subscriber never affects the others and
    /// never escapes this method.
    pub fn publish(&self, event: &SupervisorEvent) -> u64 {
        let frame = self.frame(event);
        let sequence = frame.sequence;
        debug!(event = %event.log_summary(), sequence, "broadcast");

        self.taps.lock().retain(|tap| tap.send(frame.clone()).is_ok());

        let json = frame.to_json();
        let mut subs = self.subscribers.lock();
        let dead: Vec<SubscriberId> = subs
            .iter()
            .filter(|(_, sub)| sub.tx.send(Message::text(json.clone())).is_err())
            .map(|(id, _)| id.clone())
            .collect();
        for id in dead {
            subs.remove(&id);
            debug!(%id, "removed dead subscriber during broadcast");
        }
        sequence
    }

    fn frame(&self, event: &SupervisorEvent) -> EventFrame {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        EventFrame::new(
            event.kind(),
            sanitize(event.payload()),
            chrono::Utc::now().to_rfc3339(),
            sequence,
        )
    }

    /// Send one event to a single subscriber (the authenticated greeting).
    fn send_to(&self, id: &SubscriberId, event: &SupervisorEvent) {
        let frame = self.frame(event);
        let json = frame.to_json();
        self.taps.lock().retain(|tap| tap.send(frame.clone()).is_ok());
        if let Some(sub) = self.subscribers.lock().get(id) {
            let _ = sub.tx.send(Message::text(json));
        }
    }

    /// Accept-loop over the bound listener until cancelled.
    pub async fn run(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        let Some(token) = self.config.auth_token.clone() else {
            warn!("no event-stream auth token configured; event bus disabled");
            return;
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        let ip = addr.ip();
                        if !self.conn_rate.lock().try_acquire(ip) {
                            debug!(%ip, "connection attempt rate limited");
                            drop(stream);
                            continue;
                        }
                        let bus = Arc::clone(&self);
                        let token = token.clone();
                        tokio::spawn(async move {
                            bus.handle_socket(stream, ip, token).await;
                        });
                    }
                    Err(e) => error!("event-stream accept error: {}", e),
                }
            }
        }
    }

    async fn handle_socket(self: Arc<Self>, stream: tokio::net::TcpStream, ip: IpAddr, token: String) {
        // Path and token checks happen inside the handshake callback: a bad
        // token gets an HTTP 401 and never touches the subscriber set.
        let ws = match accept_hdr_async(stream, move |req: &Request, resp: Response| {
            if req.uri().path() != "/ws" {
                return Err(not_found());
            }
            let provided = query_param(req.uri().query().unwrap_or(""), "token");
            match provided {
                Some(provided) if constant_time_eq(provided.as_bytes(), token.as_bytes()) => {
                    Ok(resp)
                }
                _ => Err(unauthorized()),
            }
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                debug!(%ip, error = %e, "event-stream handshake rejected");
                return;
            }
        };

        if self.subscriber_count() >= self.config.max_subscribers {
            warn!(%ip, cap = self.config.max_subscribers, "subscriber cap reached, rejecting");
            let mut ws = ws;
            let _ = ws.close(None).await;
            return;
        }

        let id = SubscriberId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .insert(id.clone(), Subscriber { tx, remote_ip: ip, awaiting_pong: false });
        info!(%id, %ip, "event-stream subscriber connected");

        self.send_to(&id, &SupervisorEvent::Authenticated { subscriber_id: id.clone() });

        let (mut sink, mut reader) = ws.split();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        while let Some(msg) = reader.next().await {
            match msg {
                Ok(Message::Pong(_)) => self.note_pong(&id),
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }

        // Removing the entry drops the sender, which ends the writer task.
        self.subscribers.lock().remove(&id);
        let _ = writer.await;
        info!(%id, "event-stream subscriber disconnected");
    }

    fn note_pong(&self, id: &SubscriberId) {
        if let Some(sub) = self.subscribers.lock().get_mut(id) {
            sub.awaiting_pong = false;
        }
    }

    /// One heartbeat pass: terminate subscribers that never answered the
    /// previous ping, then ping the rest.
    pub fn sweep_heartbeats(&self) {
        let mut subs = self.subscribers.lock();
        let mut dead = Vec::new();
        for (id, sub) in subs.iter_mut() {
            if sub.awaiting_pong {
                dead.push((id.clone(), sub.remote_ip));
            } else {
                sub.awaiting_pong = true;
                if sub.tx.send(Message::Ping(Bytes::new())).is_err() {
                    dead.push((id.clone(), sub.remote_ip));
                }
            }
        }
        for (id, ip) in dead {
            subs.remove(&id);
            warn!(%id, %ip, "no pong since last ping, terminating subscriber");
        }
    }

    /// Spawn the periodic heartbeat sweep.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(bus.config.heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so fresh
            // subscribers get a full interval before their first ping.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                bus.sweep_heartbeats();
            }
        })
    }

    /// Spawn the periodic eviction of idle per-IP rate buckets.
    pub fn spawn_rate_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move {
            let idle = bus.config.conn_window.max(Duration::from_secs(60));
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                bus.conn_rate.lock().sweep(idle);
            }
        })
    }
}

/// Constant-time byte comparison to defeat timing side-channels on the
/// auth token.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}

fn unauthorized() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("unauthorized".to_string()));
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp
}

fn not_found() -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some("not found".to_string()));
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
