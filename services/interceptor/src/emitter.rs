//! Fire-and-forget emitter for intercepted events.
//!
//! Every intercepted message -- blocked and permitted alike -- is appended
//! to the `cis:messages` stream for the downstream detection pipeline.
//! Delivery is at-least-once (consumers dedup on `message_id`); ordering is
//! whatever the backend acknowledges.
//!
//! # Fail-open contract
//! The response path never waits on the log backend.  Appends flow through
//! a bounded command channel into a worker task that owns the single
//! long-lived backend connection.  While disconnected -- or when the
//! channel is full -- events are dropped with a warning.  Append errors are
//! logged and swallowed; this component never retries an append.
//!
//! # Reconnect policy
//! Exponential backoff between attempts, `min(2^n * 1000 ms, 10 s)`; no
//! offline queueing.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{SecondsFormat, Utc};
use cis_protocol::{ChatMessage, InterceptResult};
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::scorer::SCORER_VERSION;

/// Stream key the downstream pipeline consumes from.
pub const STREAM_KEY: &str = "cis:messages";

const COMMAND_BUFFER: usize = 1024;
const BACKOFF_BASE_MS: u64 = 1000;
const BACKOFF_CAP_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("invalid log backend address: {0}")]
    InvalidAddress(#[from] redis::RedisError),
}

/// Read-only stream inspection for `/metrics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub length: u64,
    /// Id of the most recently appended entry; `None` on an empty stream.
    pub last_id: Option<String>,
}

/// One flat record bound for the stream.
///
/// Field order is stable: message fields, then the intercept summary,
/// scorer version, and emission timestamp.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    fields: Vec<(String, String)>,
}

impl StreamEvent {
    /// Flatten a message and its intercept outcome into stream fields.
    ///
    /// GPS coordinates are included only when present on the message.
    pub fn from_intercept(message: &ChatMessage, result: &InterceptResult) -> Self {
        let mut fields = vec![
            ("message_id".to_owned(), message.message_id.clone()),
            ("thread_id".to_owned(), message.thread_id.clone()),
            ("user_id".to_owned(), message.user_id.clone()),
            (
                "content".to_owned(),
                message.content.clone().unwrap_or_default(),
            ),
            ("timestamp".to_owned(), message.timestamp.clone()),
        ];
        if let Some(lat) = message.gps_lat {
            fields.push(("gps_lat".to_owned(), lat.to_string()));
        }
        if let Some(lon) = message.gps_lon {
            fields.push(("gps_lon".to_owned(), lon.to_string()));
        }
        fields.push(("intercept_result".to_owned(), result.summary_json()));
        fields.push(("scorer_version".to_owned(), SCORER_VERSION.to_owned()));
        fields.push((
            "emitted_at".to_owned(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        ));
        StreamEvent { fields }
    }

    /// The flat field/value pairs, in emission order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

// ---------------------------------------------------------------------------
// Emitter handle
// ---------------------------------------------------------------------------

enum EmitterCommand {
    Append(StreamEvent),
    Stats(oneshot::Sender<Option<StreamStats>>),
    Shutdown,
}

/// Handle to the emitter worker.
pub struct EventEmitter {
    tx: mpsc::Sender<EmitterCommand>,
    connected: Arc<AtomicBool>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventEmitter {
    /// Spawn the worker and begin connecting to `redis_host:redis_port`.
    ///
    /// Returns immediately; the connection is established (and re-established)
    /// in the background.
    pub fn start(host: &str, port: u16) -> Result<Self, EmitterError> {
        let url = format!("redis://{host}:{port}/");
        let client = redis::Client::open(url.as_str())?;
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker = tokio::spawn(run_worker(client, rx, Arc::clone(&connected)));
        Ok(EventEmitter {
            tx,
            connected,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Whether the backend connection is currently established.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Queue one intercepted event for appending.  Never blocks.
    ///
    /// Dropped with a warning when the backend is disconnected, the queue is
    /// full, or the worker has stopped.
    pub fn emit(&self, message: &ChatMessage, result: &InterceptResult) {
        if !self.connected() {
            warn!(
                message_id = %message.message_id,
                "log backend disconnected, dropping intercept event"
            );
            return;
        }
        let event = StreamEvent::from_intercept(message, result);
        match self.tx.try_send(EmitterCommand::Append(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    message_id = %message.message_id,
                    "emitter queue full, dropping intercept event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    message_id = %message.message_id,
                    "emitter worker stopped, dropping intercept event"
                );
            }
        }
    }

    /// Current stream length and last assigned id, `None` when the backend
    /// is unreachable.
    pub async fn stats(&self) -> Option<StreamStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(EmitterCommand::Stats(reply_tx)).await.ok()?;
        reply_rx.await.ok()?
    }

    /// Drain already-queued appends best-effort, then stop the worker and
    /// close the connection.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(EmitterCommand::Shutdown).await;
        let handle = self
            .worker
            .lock()
            .expect("emitter worker mutex poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Delay before reconnect attempt number `failed_attempts + 1`.
///
/// The first attempt is immediate; afterwards `min(2^n * 1000 ms, 10 s)`
/// for n = 0, 1, 2, ...
fn reconnect_delay(failed_attempts: u32) -> Duration {
    if failed_attempts == 0 {
        return Duration::ZERO;
    }
    let exp = 2_u64.saturating_pow(failed_attempts - 1);
    Duration::from_millis(exp.saturating_mul(BACKOFF_BASE_MS).min(BACKOFF_CAP_MS))
}

async fn run_worker(
    client: redis::Client,
    mut rx: mpsc::Receiver<EmitterCommand>,
    connected: Arc<AtomicBool>,
) {
    let mut conn: Option<MultiplexedConnection> = None;
    let mut failed_attempts: u32 = 0;

    loop {
        if let Some(active) = conn.as_mut() {
            match rx.recv().await {
                None | Some(EmitterCommand::Shutdown) => break,
                Some(EmitterCommand::Append(event)) => {
                    if let Err(e) = append(active, &event).await {
                        warn!(error = %e, "stream append failed, dropping intercept event");
                        conn = None;
                        connected.store(false, Ordering::Relaxed);
                        failed_attempts = 0;
                    }
                }
                Some(EmitterCommand::Stats(reply)) => {
                    let stats = read_stats(active).await;
                    if stats.is_none() {
                        warn!("stream stats unavailable, reconnecting");
                        conn = None;
                        connected.store(false, Ordering::Relaxed);
                        failed_attempts = 0;
                    }
                    let _ = reply.send(stats);
                }
            }
        } else {
            // Disconnected: race the next connect attempt against inbound
            // commands so stats and shutdown stay responsive.  Appends that
            // arrive here are dropped -- there is no offline queue.
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    None | Some(EmitterCommand::Shutdown) => break,
                    Some(EmitterCommand::Append(_)) => {
                        warn!("log backend disconnected, dropping intercept event");
                    }
                    Some(EmitterCommand::Stats(reply)) => {
                        let _ = reply.send(None);
                    }
                },
                () = tokio::time::sleep(reconnect_delay(failed_attempts)) => {
                    match client.get_multiplexed_async_connection().await {
                        Ok(c) => {
                            info!("log backend connected");
                            conn = Some(c);
                            connected.store(true, Ordering::Relaxed);
                            failed_attempts = 0;
                        }
                        Err(e) => {
                            failed_attempts = failed_attempts.saturating_add(1);
                            warn!(
                                error = %e,
                                retry_in_ms = reconnect_delay(failed_attempts).as_millis() as u64,
                                "log backend connect failed"
                            );
                        }
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    debug!("event emitter worker stopped");
}

async fn append(
    conn: &mut MultiplexedConnection,
    event: &StreamEvent,
) -> Result<(), redis::RedisError> {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(STREAM_KEY).arg("*");
    for (field, value) in event.fields() {
        cmd.arg(field).arg(value);
    }
    let id: String = cmd.query_async(conn).await?;
    debug!(stream_id = %id, "intercept event appended");
    Ok(())
}

async fn read_stats(conn: &mut MultiplexedConnection) -> Option<StreamStats> {
    let length: u64 = redis::cmd("XLEN")
        .arg(STREAM_KEY)
        .query_async(conn)
        .await
        .ok()?;
    let newest: Vec<(String, Vec<String>)> = redis::cmd("XREVRANGE")
        .arg(STREAM_KEY)
        .arg("+")
        .arg("-")
        .arg("COUNT")
        .arg(1)
        .query_async(conn)
        .await
        .ok()?;
    Some(StreamStats {
        length,
        last_id: newest.into_iter().next().map(|(id, _)| id),
    })
}
