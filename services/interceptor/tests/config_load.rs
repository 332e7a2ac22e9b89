//! Configuration loading: defaults, overrides, range validation, and the
//! process-wide cache.

use std::collections::HashMap;

use interceptor::config::{self, ConfigError};

fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |var: &str| map.get(var).cloned()
}

#[test]
fn empty_environment_yields_the_documented_defaults() {
    let cfg = config::load_from(|_| None).expect("defaults must load");
    assert_eq!(cfg.sync_threshold, 0.65);
    assert_eq!(cfg.max_message_length, 10_000);
    assert_eq!(cfg.circuit_breaker_threshold, 5);
    assert_eq!(cfg.circuit_breaker_reset_ms, 30_000);
    assert_eq!(cfg.redis_port, 6379);
    assert_eq!(cfg.ws_port, 8080);
    assert_eq!(cfg.health_port, 8081);
}

#[test]
fn overrides_are_parsed_and_applied() {
    let cfg = config::load_from(lookup(&[
        ("SYNC_THRESHOLD", "0.5"),
        ("MAX_MESSAGE_LENGTH", "200"),
        ("CIRCUIT_BREAKER_THRESHOLD", "2"),
        ("CIRCUIT_BREAKER_RESET_MS", "5000"),
        ("REDIS_HOST", "redis.internal"),
        ("REDIS_PORT", "6380"),
        ("DETECTOR_HOST", "detector.internal"),
        ("DETECTOR_PORT", "8099"),
        ("WS_PORT", "9090"),
        ("HEALTH_PORT", "9091"),
    ]))
    .expect("overrides must load");

    assert_eq!(cfg.sync_threshold, 0.5);
    assert_eq!(cfg.max_message_length, 200);
    assert_eq!(cfg.circuit_breaker_threshold, 2);
    assert_eq!(cfg.circuit_breaker_reset_ms, 5000);
    assert_eq!(cfg.redis_host, "redis.internal");
    assert_eq!(cfg.redis_port, 6380);
    assert_eq!(cfg.detector_host, "detector.internal");
    assert_eq!(cfg.detector_port, 8099);
    assert_eq!(cfg.ws_port, 9090);
    assert_eq!(cfg.health_port, 9091);
}

#[test]
fn whitespace_around_values_is_tolerated() {
    let cfg = config::load_from(lookup(&[("SYNC_THRESHOLD", " 0.7 ")])).expect("must load");
    assert_eq!(cfg.sync_threshold, 0.7);
}

#[test]
fn threshold_outside_the_unit_interval_is_rejected() {
    for bad in ["1.5", "-0.1"] {
        let err = config::load_from(lookup(&[("SYNC_THRESHOLD", bad)]))
            .expect_err("out-of-range threshold must fail");
        let ConfigError::InvalidValue { var, .. } = err;
        assert_eq!(var, "SYNC_THRESHOLD");
    }
}

#[test]
fn unparseable_numbers_are_rejected_with_the_variable_name() {
    let err = config::load_from(lookup(&[("CIRCUIT_BREAKER_THRESHOLD", "many")]))
        .expect_err("non-numeric value must fail");
    assert!(err.to_string().contains("CIRCUIT_BREAKER_THRESHOLD"));
    assert!(err.to_string().contains("many"));
}

#[test]
fn zero_message_length_is_rejected() {
    let err = config::load_from(lookup(&[("MAX_MESSAGE_LENGTH", "0")]))
        .expect_err("zero length must fail");
    assert!(err.to_string().contains("MAX_MESSAGE_LENGTH"));
}

#[test]
fn sub_second_breaker_reset_is_rejected() {
    let err = config::load_from(lookup(&[("CIRCUIT_BREAKER_RESET_MS", "999")]))
        .expect_err("sub-second reset must fail");
    assert!(err.to_string().contains("CIRCUIT_BREAKER_RESET_MS"));
}

#[test]
fn zero_breaker_threshold_is_rejected() {
    let err = config::load_from(lookup(&[("CIRCUIT_BREAKER_THRESHOLD", "0")]))
        .expect_err("zero threshold must fail");
    assert!(err.to_string().contains("CIRCUIT_BREAKER_THRESHOLD"));
}

#[test]
fn out_of_range_port_is_rejected() {
    let err = config::load_from(lookup(&[("WS_PORT", "70000")]))
        .expect_err("port above u16::MAX must fail");
    assert!(err.to_string().contains("WS_PORT"));
}

#[test]
fn cached_load_returns_the_same_instance_until_reset() {
    // Single test for the cache to avoid interleaving with other tests in
    // this binary; the cache is process-wide.
    config::reset_cache();
    let first = config::load_cached().expect("load");
    let second = config::load_cached().expect("load");
    assert!(
        std::sync::Arc::ptr_eq(&first, &second),
        "second load must come from the cache"
    );

    config::reset_cache();
    let third = config::load_cached().expect("load");
    assert_eq!(*first, *third, "reloaded config must be equivalent");
}
