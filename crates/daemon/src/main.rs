// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! botd entrypoint: bootstrap, spawn the listener and event-bus tasks, wait
//! for a shutdown signal.

use std::process::ExitCode;
use std::sync::Arc;

use botd_daemon::{env, startup, Config, ListenCtx, Listener, StartupResult};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("botd: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;
    let _log_guard = init_tracing(&config);

    info!(version = env::DAEMON_VERSION, "starting botd");
    let StartupResult { mut daemon, listener } = startup(&config).await?;

    let ctx = Arc::new(ListenCtx {
        supervisor: Arc::clone(&daemon.supervisor),
        safety: Arc::clone(&daemon.safety),
        event_bus: Arc::clone(&daemon.event_bus),
        shutdown: Arc::clone(&daemon.shutdown),
        data_dir: config.data_path.clone(),
    });
    tokio::spawn(Listener::new(listener, ctx).run());

    let ws_shutdown = CancellationToken::new();
    match tokio::net::TcpListener::bind(env::ws_addr()).await {
        Ok(ws_listener) => {
            info!(addr = %env::ws_addr(), "event stream listening");
            tokio::spawn(Arc::clone(&daemon.event_bus).run(ws_listener, ws_shutdown.clone()));
            let _heartbeat = daemon.event_bus.spawn_heartbeat();
            let _sweeper = daemon.event_bus.spawn_rate_sweeper(env::rate_sweep_interval());
        }
        Err(e) => warn!(addr = %env::ws_addr(), error = %e, "event stream disabled"),
    }

    wait_for_shutdown(&daemon.shutdown).await;

    ws_shutdown.cancel();
    if let Err(e) = daemon.shutdown().await {
        error!(error = %e, "shutdown incomplete");
    }
    Ok(())
}

/// Block until a management shutdown request, SIGINT, or SIGTERM.
async fn wait_for_shutdown(shutdown: &tokio::sync::Notify) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            shutdown.notified().await;
            return;
        }
    };

    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested via management socket"),
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
}

/// Log to a file under the state dir, mirroring warnings to stderr.
fn init_tracing(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    let appender = tracing_appender::rolling::never(
        &config.state_dir,
        config.log_path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("botd.log")),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}
