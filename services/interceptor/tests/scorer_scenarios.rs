//! End-to-end scorer conformance.
//!
//! The six literal scenarios the intercept contract fixes, plus the
//! universal result invariants, all under the default configuration.

use cis_protocol::{Action, ChatMessage, InterceptResult};
use interceptor::config::{self, InterceptorConfig};
use interceptor::scorer;

fn default_config() -> InterceptorConfig {
    config::load_from(|_| None).expect("defaults must load")
}

fn message(content: &str) -> ChatMessage {
    ChatMessage {
        message_id: "msg-001".to_owned(),
        thread_id: "thread-001".to_owned(),
        user_id: "user-001".to_owned(),
        content: Some(content.to_owned()),
        timestamp: "2025-06-01T12:00:00Z".to_owned(),
        gps_lat: None,
        gps_lon: None,
    }
}

fn intercept(content: &str) -> InterceptResult {
    scorer::intercept(&message(content), &default_config())
}

/// Every result must satisfy the structural invariants, whatever the input.
fn assert_invariants(result: &InterceptResult) {
    assert!(
        (0.0..=1.0).contains(&result.risk_score),
        "risk_score out of range: {}",
        result.risk_score
    );
    assert_eq!(
        result.allowed,
        result.action != Action::HardBlock,
        "allowed must mirror the action"
    );
    assert_eq!(
        result.nudge_message.is_some(),
        result.action == Action::Nudge,
        "nudge_message present iff nudge"
    );
    assert_eq!(
        result.block_reason.is_some(),
        result.action == Action::HardBlock,
        "block_reason present iff hard_block"
    );
}

#[test]
fn scenario_1_benign_chatter_is_allowed() {
    let result = intercept("Hey, how are you doing today? The weather is nice!");
    assert_invariants(&result);
    assert!(result.allowed);
    assert_eq!(result.action, Action::Allow);
    assert_eq!(result.risk_score, 0.0);
    assert!(result.labels.is_empty());
}

#[test]
fn scenario_2_phone_number_is_blocked() {
    let result = intercept("Call me at (555) 123-4567 for more details");
    assert_invariants(&result);
    assert!(!result.allowed);
    assert_eq!(result.action, Action::HardBlock);
    assert!(result.risk_score >= 0.65, "got {}", result.risk_score);
    assert!(result.labels.contains(&"contact_info_phone".to_owned()));
    assert!(
        result
            .block_reason
            .as_deref()
            .expect("blocked result carries a reason")
            .contains("phone number")
    );
}

#[test]
fn scenario_3_email_address_is_blocked() {
    let result = intercept("Email me at john.doe@example.com");
    assert_invariants(&result);
    assert!(!result.allowed);
    assert_eq!(result.action, Action::HardBlock);
    assert!(result.risk_score >= 0.65, "got {}", result.risk_score);
    assert!(result.labels.contains(&"contact_info_email".to_owned()));
}

#[test]
fn scenario_4_external_link_is_nudged() {
    let result = intercept("Check out my profile at https://example.com/profile");
    assert_invariants(&result);
    assert!(result.allowed);
    assert_eq!(result.action, Action::Nudge);
    assert!(
        (0.40..0.65).contains(&result.risk_score),
        "got {}",
        result.risk_score
    );
    assert!(result.labels.contains(&"external_link".to_owned()));
    assert!(result.nudge_message.is_some());
}

#[test]
fn scenario_5_combined_contact_info_is_blocked_with_both_labels() {
    let result = intercept("Contact me at john@example.com or call (555) 123-4567");
    assert_invariants(&result);
    assert!(!result.allowed);
    assert_eq!(result.action, Action::HardBlock);
    assert!(result.risk_score >= 0.65, "got {}", result.risk_score);
    assert!(result.labels.contains(&"contact_info_phone".to_owned()));
    assert!(result.labels.contains(&"contact_info_email".to_owned()));
    let reason = result.block_reason.expect("blocked result carries a reason");
    assert!(reason.contains("phone number"));
    assert!(reason.contains("email address"));
}

#[test]
fn scenario_6_oversized_content_hits_the_length_gate() {
    let config = default_config();
    let result = intercept(&"a".repeat(config.max_message_length + 1));
    assert_invariants(&result);
    assert!(!result.allowed);
    assert_eq!(result.action, Action::HardBlock);
    assert_eq!(result.risk_score, 1.0);
    assert_eq!(result.labels, vec!["message_too_long".to_owned()]);
    assert!(
        result
            .block_reason
            .expect("length gate carries a reason")
            .contains(&config.max_message_length.to_string())
    );
}

#[test]
fn rescoring_identical_content_is_idempotent() {
    let inputs = [
        "Hey, how are you doing today?",
        "Call me at (555) 123-4567",
        "Check https://example.com/profile",
        "add me on whatsapp, user (at) mail (dot) com",
    ];
    for input in inputs {
        assert_eq!(intercept(input), intercept(input), "input: {input}");
    }
}

#[test]
fn empty_content_is_allowed_with_no_labels() {
    let result = intercept("");
    assert_invariants(&result);
    assert_eq!(result.action, Action::Allow);
    assert_eq!(result.risk_score, 0.0);
    assert!(result.labels.is_empty());
}

#[test]
fn invariants_hold_across_a_spread_of_inputs() {
    let inputs = [
        "",
        "plain text",
        "DM me on insta",
        "bit.ly/abc123 and www.example.com",
        "+31 6 1234 5678",
        "j o h n @ g m a i l dot com",
        "five  five  five, zero zero zero",
        "Contact us on telegram: t.co/xyz",
    ];
    for input in inputs {
        let result = intercept(input);
        assert_invariants(&result);
    }
}

#[test]
fn lowering_the_threshold_blocks_what_was_a_nudge() {
    let config = InterceptorConfig {
        sync_threshold: 0.40,
        ..default_config()
    };
    let result = scorer::intercept(&message("see https://example.com/profile"), &config);
    assert_eq!(result.action, Action::HardBlock);
    assert!(result.block_reason.is_some());
}
