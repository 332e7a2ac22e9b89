//! Interceptor configuration loading.
//!
//! The environment is the sole config source; every variable is optional and
//! falls back to its documented default.  Values are range-checked at load
//! time -- an out-of-range or unparseable value fails loading, and the
//! binary refuses to start.
//!
//! # Variables
//! - `SYNC_THRESHOLD` (0.65) -- risk score at/above which a message is
//!   hard-blocked synchronously; must be within [0, 1]
//! - `MAX_MESSAGE_LENGTH` (10000) -- content length gate, in characters; >= 1
//! - `CIRCUIT_BREAKER_THRESHOLD` (5) -- consecutive failures before the
//!   breaker opens; >= 1
//! - `CIRCUIT_BREAKER_RESET_MS` (30000) -- open-state cooldown; >= 1000
//! - `REDIS_HOST` / `REDIS_PORT` (127.0.0.1:6379) -- append-only log backend
//! - `DETECTOR_HOST` / `DETECTOR_PORT` (127.0.0.1:8090) -- downstream
//!   Stage-2 detector (reached only via the log; part of the deployment
//!   surface)
//! - `WS_PORT` (8080) -- intercept WebSocket listener
//! - `HEALTH_PORT` (8081) -- status HTTP listener
//!
//! The first successful load is cached process-wide ([`load_cached`]); the
//! cache can be cleared with [`reset_cache`] (tests and operator tooling
//! only -- the service lifetime matches the configuration lifetime).

use std::sync::{Arc, Mutex};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Config type
// ---------------------------------------------------------------------------

/// Immutable, validated interceptor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptorConfig {
    /// Risk score at and above which the dispatcher hard-blocks.
    pub sync_threshold: f64,
    /// Maximum accepted content length, in characters.
    pub max_message_length: usize,
    /// Consecutive scorer failures before the circuit opens.
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open circuit admits a probe, in milliseconds.
    pub circuit_breaker_reset_ms: u64,
    pub redis_host: String,
    pub redis_port: u16,
    pub detector_host: String,
    pub detector_port: u16,
    pub ws_port: u16,
    pub health_port: u16,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from the process environment.
pub fn load_from_env() -> Result<InterceptorConfig, ConfigError> {
    load_from(|var| std::env::var(var).ok())
}

/// Load configuration from an arbitrary variable lookup.
///
/// The indirection keeps loading testable without mutating the process
/// environment (which is not thread-safe under parallel test execution).
pub fn load_from<L>(lookup: L) -> Result<InterceptorConfig, ConfigError>
where
    L: Fn(&str) -> Option<String>,
{
    let sync_threshold = parse_var(&lookup, "SYNC_THRESHOLD", 0.65_f64)?;
    if !(0.0..=1.0).contains(&sync_threshold) {
        return Err(invalid(
            "SYNC_THRESHOLD",
            sync_threshold.to_string(),
            "must be within [0, 1]",
        ));
    }

    let max_message_length = parse_var(&lookup, "MAX_MESSAGE_LENGTH", 10_000_usize)?;
    if max_message_length < 1 {
        return Err(invalid(
            "MAX_MESSAGE_LENGTH",
            max_message_length.to_string(),
            "must be >= 1",
        ));
    }

    let circuit_breaker_threshold = parse_var(&lookup, "CIRCUIT_BREAKER_THRESHOLD", 5_u32)?;
    if circuit_breaker_threshold < 1 {
        return Err(invalid(
            "CIRCUIT_BREAKER_THRESHOLD",
            circuit_breaker_threshold.to_string(),
            "must be >= 1",
        ));
    }

    let circuit_breaker_reset_ms = parse_var(&lookup, "CIRCUIT_BREAKER_RESET_MS", 30_000_u64)?;
    if circuit_breaker_reset_ms < 1000 {
        return Err(invalid(
            "CIRCUIT_BREAKER_RESET_MS",
            circuit_breaker_reset_ms.to_string(),
            "must be >= 1000",
        ));
    }

    Ok(InterceptorConfig {
        sync_threshold,
        max_message_length,
        circuit_breaker_threshold,
        circuit_breaker_reset_ms,
        redis_host: lookup("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
        redis_port: parse_var(&lookup, "REDIS_PORT", 6379_u16)?,
        detector_host: lookup("DETECTOR_HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
        detector_port: parse_var(&lookup, "DETECTOR_PORT", 8090_u16)?,
        ws_port: parse_var(&lookup, "WS_PORT", 8080_u16)?,
        health_port: parse_var(&lookup, "HEALTH_PORT", 8081_u16)?,
    })
}

fn parse_var<L, T>(lookup: &L, var: &'static str, default: T) -> Result<T, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn invalid(var: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value,
        reason: reason.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Process-wide cache
// ---------------------------------------------------------------------------

static CACHE: Mutex<Option<Arc<InterceptorConfig>>> = Mutex::new(None);

/// Load from the environment once and cache the result process-wide.
///
/// Subsequent calls return the cached value without re-reading the
/// environment.  Loading errors are not cached; a failed load can be
/// retried after the environment is corrected.
pub fn load_cached() -> Result<Arc<InterceptorConfig>, ConfigError> {
    let mut cache = CACHE.lock().expect("config cache mutex poisoned");
    if let Some(cfg) = cache.as_ref() {
        return Ok(Arc::clone(cfg));
    }
    let cfg = Arc::new(load_from_env()?);
    *cache = Some(Arc::clone(&cfg));
    Ok(cfg)
}

/// Clear the process-wide cache so the next [`load_cached`] re-reads the
/// environment.
pub fn reset_cache() {
    *CACHE.lock().expect("config cache mutex poisoned") = None;
}
