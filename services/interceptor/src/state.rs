use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};

use crate::breaker::CircuitBreaker;
use crate::config::InterceptorConfig;
use crate::emitter::EventEmitter;

/// Shared handles for the serving tasks.
///
/// Everything here is process-wide: the validated configuration, the breaker
/// guarding the scorer, the emitter worker handle, and the two gauges the
/// status endpoints read (active WS connections, listener-up flag).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InterceptorConfig>,
    pub breaker: Arc<CircuitBreaker>,
    pub emitter: Arc<EventEmitter>,
    pub active_connections: Arc<AtomicUsize>,
    pub ws_listening: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        config: Arc<InterceptorConfig>,
        breaker: Arc<CircuitBreaker>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        AppState {
            config,
            breaker,
            emitter,
            active_connections: Arc::new(AtomicUsize::new(0)),
            ws_listening: Arc::new(AtomicBool::new(false)),
        }
    }
}
