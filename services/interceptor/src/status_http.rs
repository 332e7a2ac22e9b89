//! Out-of-band status HTTP endpoints.
//!
//! Provides, on a separate port from the intercept WebSocket:
//! - `GET /health`  -- 200 when serving traffic safely, 503 otherwise
//! - `GET /metrics` -- breaker, log backend, and connection gauges
//! - anything else  -- 404 `{"error": "Not found"}`
//!
//! # Health contract
//! Healthy = intercept listener up AND breaker `closed` or `half_open`.
//! The log backend does NOT affect health: emission is fail-open, so a
//! backend outage must not take the interceptor out of rotation.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::breaker::CircuitState;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Public config
// ---------------------------------------------------------------------------

/// Configuration for the status HTTP server.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    /// Bind address, e.g. `"0.0.0.0:8081"`.
    pub bind: String,
}

// ---------------------------------------------------------------------------
// StatusServer handle
// ---------------------------------------------------------------------------

/// Handle to the running status HTTP server.
pub struct StatusServer {
    local_addr: SocketAddr,
}

impl StatusServer {
    /// Return the bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the status HTTP server.
    pub async fn start(cfg: StatusConfig, state: AppState) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(&cfg.bind).await?;
        let local_addr = listener.local_addr()?;

        tokio::spawn(async move {
            run_server(listener, state).await;
        });

        Ok(StatusServer { local_addr })
    }
}

// ---------------------------------------------------------------------------
// Server accept loop
// ---------------------------------------------------------------------------

async fn run_server(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, state).await;
                });
            }
            Err(_) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Request handler
// ---------------------------------------------------------------------------

async fn handle_connection(mut stream: TcpStream, state: AppState) {
    // Read the request (limited to 4 KiB -- sufficient for a simple HTTP/1.1 request line + headers)
    let mut buf = vec![0u8; 4096];
    let n = match stream.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };

    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => {
            send_response(&mut stream, 400, "text/plain", "Bad Request").await;
            return;
        }
    };

    // Parse the request line: METHOD PATH HTTP/1.1
    let first_line = match request.lines().next() {
        Some(l) => l,
        None => {
            send_response(&mut stream, 400, "text/plain", "Bad Request").await;
            return;
        }
    };

    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/");

    match (method, path) {
        ("GET", "/health") => {
            let (status, body) = health_body(&state);
            send_response(&mut stream, status, "application/json", &body).await;
        }
        ("GET", "/metrics") => {
            let body = metrics_body(&state).await;
            send_response(&mut stream, 200, "application/json", &body).await;
        }
        _ => {
            send_response(
                &mut stream,
                404,
                "application/json",
                r#"{"error":"Not found"}"#,
            )
            .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Body composition
// ---------------------------------------------------------------------------

fn health_body(state: &AppState) -> (u16, String) {
    let breaker_state = state.breaker.state();
    let ws_up = state.ws_listening.load(Ordering::Relaxed);
    let healthy = ws_up && matches!(breaker_state, CircuitState::Closed | CircuitState::HalfOpen);

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "dependencies": {
            "websocket": if ws_up { "listening" } else { "down" },
            "circuit_breaker": breaker_state.as_str(),
            "log_backend": if state.emitter.connected() { "connected" } else { "disconnected" },
        },
    })
    .to_string();

    (if healthy { 200 } else { 503 }, body)
}

async fn metrics_body(state: &AppState) -> String {
    let stats = state.emitter.stats().await;
    serde_json::json!({
        "circuit_breaker": {
            "state": state.breaker.state().as_str(),
            "failure_count": state.breaker.failure_count(),
        },
        "log_backend": {
            "connected": state.emitter.connected(),
            "stream_length": stats.as_ref().map(|s| s.length),
            "last_stream_id": stats.as_ref().and_then(|s| s.last_id.clone()),
        },
        "connections": {
            "active": state.active_connections.load(Ordering::Relaxed),
        },
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// HTTP response helper
// ---------------------------------------------------------------------------

async fn send_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {status} {status_text}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        len = body.len(),
    );

    let _ = stream.write_all(response.as_bytes()).await;
}
