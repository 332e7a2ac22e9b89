// interceptor: Pre-send chat interceptor on the synchronous send path.
//
// Scores outgoing messages, answers allow / nudge / hard-block within the
// latency budget, and forwards every intercepted event to the append-only
// log for the downstream detection pipeline.

use std::sync::Arc;
use std::time::Duration;

use interceptor::breaker::CircuitBreaker;
use interceptor::config;
use interceptor::emitter::EventEmitter;
use interceptor::state::AppState;
use interceptor::status_http::{StatusConfig, StatusServer};
use interceptor::ws_intercept::InterceptServer;
use tracing::info;

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for structured logging to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "interceptor starting");

    // Invalid configuration is the one non-fail-open path: refuse to start.
    let config = match config::load_cached() {
        Ok(cfg) => {
            info!(
                sync_threshold = cfg.sync_threshold,
                ws_port = cfg.ws_port,
                health_port = cfg.health_port,
                "config loaded"
            );
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let emitter = match EventEmitter::start(&config.redis_host, config.redis_port) {
        Ok(emitter) => Arc::new(emitter),
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    let breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker_threshold,
        Duration::from_millis(config.circuit_breaker_reset_ms),
        1,
    ));
    let state = AppState::new(Arc::clone(&config), breaker, Arc::clone(&emitter));

    let status = StatusServer::start(
        StatusConfig {
            bind: format!("0.0.0.0:{}", config.health_port),
        },
        state.clone(),
    )
    .await
    .expect("failed to bind status listener");
    info!(addr = %status.local_addr(), "status endpoints listening");

    let ws = InterceptServer::start(&format!("0.0.0.0:{}", config.ws_port), state.clone())
        .await
        .expect("failed to bind intercept listener");
    info!(addr = %ws.local_addr(), "intercept endpoint listening");

    shutdown_signal().await;
    info!("shutting down");
    ws.shutdown().await;
    emitter.shutdown().await;
    info!("interceptor shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
