//! Intercept WebSocket endpoint.
//!
//! The primary transport: clients hold a persistent connection and send
//! `intercept` frames; the dispatcher answers each with exactly one
//! `intercept_result` or `error` frame.
//!
//! # Protocol
//! 1. Connect to `ws://host:WS_PORT`
//! 2. Send `{"type": "intercept", "message": {...}, "request_id"?: "..."}`
//!    as a text frame
//! 3. Receive `intercept_result` (or `error` for malformed frames)
//!
//! Frames on one connection are handled to completion in arrival order, so
//! responses come back in request order per connection.  Nothing is
//! promised across connections.
//!
//! # Fail-open guarantee
//! Every frame that names a message with content gets an
//! `intercept_result`: a rejected (circuit-open) or failed scoring pass is
//! replaced by a synthesized allow-result with a diagnostic label, never by
//! a dropped or error response.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Instant;

use cis_protocol::{
    ErrorResponse, InterceptResult, InterceptorRequest, InterceptorResponse, WireMessage,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::breaker::Verdict;
use crate::scorer;
use crate::state::AppState;

/// Label attached to synthesized results when the circuit refuses to score.
pub const LABEL_CIRCUIT_OPEN: &str = "circuit_breaker_open";
/// Label attached to synthesized results when scoring itself failed.
pub const LABEL_INTERCEPTOR_ERROR: &str = "interceptor_error";

// ---------------------------------------------------------------------------
// Server handle
// ---------------------------------------------------------------------------

/// Handle to the running intercept WebSocket server.
pub struct InterceptServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl InterceptServer {
    /// Bind the listener and start accepting connections.
    pub async fn start(bind: &str, state: AppState) -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        state.ws_listening.store(true, Ordering::Relaxed);
        let task = tokio::spawn(accept_loop(listener, state, shutdown_rx));

        Ok(InterceptServer {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    /// Return the bound listen address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close existing connections, and wait for the accept
    /// loop to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

async fn accept_loop(
    listener: TcpListener,
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
) {
    let mut shutdown = shutdown_rx.clone();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    let conn_shutdown = shutdown_rx.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, state, conn_shutdown).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed, stopping intercept listener");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    state.ws_listening.store(false, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(peer = %peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    state.active_connections.fetch_add(1, Ordering::Relaxed);
    info!(peer = %peer, "client connected");

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            frame = read.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    warn!(peer = %peer, error = %e, "websocket error");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    let response = handle_frame(&text, &state).await;
                    match serde_json::to_string(&response) {
                        Ok(json) => {
                            if write.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!(peer = %peer, error = %e, "response serialization failed"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.active_connections.fetch_sub(1, Ordering::Relaxed);
    info!(peer = %peer, "client disconnected");
}

// ---------------------------------------------------------------------------
// Frame handling
// ---------------------------------------------------------------------------

/// Guard error for a scoring pass that panicked.
struct ScorerFailure;

/// Handle one inbound text frame and produce the outbound frame.
///
/// Exposed for the protocol integration tests.
pub async fn handle_frame(text: &str, state: &AppState) -> WireMessage {
    let started = Instant::now();

    // Step 1: JSON parse.  An unparseable frame carries no id to echo.
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable frame");
            return WireMessage::Error(ErrorResponse::processing(None, "Internal server error"));
        }
    };
    let request_id_hint = value
        .get("request_id")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned);

    // Step 2: validate the frame kind and message shape.
    match value.get("type").and_then(serde_json::Value::as_str) {
        Some("intercept") => {}
        other => {
            warn!(kind = other.unwrap_or("<missing>"), "unsupported frame type");
            return WireMessage::Error(ErrorResponse::processing(
                request_id_hint,
                "Unsupported message type",
            ));
        }
    }
    let request: InterceptorRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed intercept request");
            return WireMessage::Error(ErrorResponse::processing(
                request_id_hint,
                "Internal server error",
            ));
        }
    };
    if request.message.content.is_none() {
        return WireMessage::Error(ErrorResponse::processing(
            request_id_hint,
            "Message content is required",
        ));
    }

    // Step 3: correlation id -- echoed, or minted when absent.
    let request_id = request
        .request_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let message = request.message;

    // Step 4: score under the breaker.  A panic in the scorer counts as a
    // breaker failure; the response still goes out as a labeled allow.
    let outcome = state
        .breaker
        .execute(|| {
            let message = &message;
            let config = state.config.as_ref();
            async move {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    scorer::intercept(message, config)
                }))
                .map_err(|_| ScorerFailure)
            }
        })
        .await;

    let result = match outcome {
        Ok(Verdict::Ran(result)) => result,
        Ok(Verdict::Rejected) => {
            debug!(message_id = %message.message_id, "circuit open, failing open");
            InterceptResult::allow(0.0, vec![LABEL_CIRCUIT_OPEN.to_owned()])
        }
        Err(ScorerFailure) => {
            error!(message_id = %message.message_id, "scorer failed, failing open");
            InterceptResult::allow(0.0, vec![LABEL_INTERCEPTOR_ERROR.to_owned()])
        }
    };

    // Step 5: fire-and-forget toward the log; never blocks the response.
    state.emitter.emit(&message, &result);

    // Step 6: respond.
    let processing_ms = started.elapsed().as_millis() as u64;
    debug!(
        message_id = %message.message_id,
        action = %result.action,
        risk_score = result.risk_score,
        processing_ms,
        "intercept decided"
    );
    WireMessage::InterceptResult(InterceptorResponse {
        request_id,
        result,
        processing_ms,
    })
}
