//! Stage-1 pattern risk scorer.
//!
//! Pure function over message content: scan with the v1 taxonomy, aggregate
//! matches into a normalized risk score and label set, derive the
//! user-facing nudge/block text.  No I/O, no mutable state -- identical
//! content and configuration always produce identical results.
//!
//! The threshold decision (allow / nudge / hard-block) lives here as well
//! so the dispatcher composes a complete [`InterceptResult`] from a single
//! call.

pub mod patterns;

pub use patterns::PatternKind;

use cis_protocol::{ChatMessage, InterceptResult};

use crate::config::InterceptorConfig;

/// Version of the frozen taxonomy + formula; carried in stream events so
/// downstream consumers can tell which rule set produced a score.
pub const SCORER_VERSION: &str = "1";

/// Scores in `[NUDGE_FLOOR, sync_threshold)` produce a nudge.
const NUDGE_FLOOR: f64 = 0.40;

/// How many hits of one category still increase its contribution.
const COUNT_SATURATION: usize = 3;

/// All hits of one category, collapsed across its regex set.
///
/// `count` is the number of *distinct* trimmed substrings; `samples` keeps
/// up to three of them for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub count: usize,
    pub samples: Vec<String>,
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Scan content with every regex of every category.
///
/// Returns at most one [`PatternMatch`] per category, in canonical category
/// order.  Hits are deduplicated on the trimmed substring, so the same
/// fragment found by two regexes of a category counts once.
pub fn scan(content: &str) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    for kind in PatternKind::ALL {
        let mut seen: Vec<String> = Vec::new();
        for re in kind.regexes() {
            for hit in re.find_iter(content) {
                let trimmed = hit.as_str().trim();
                if trimmed.is_empty() || seen.iter().any(|s| s == trimmed) {
                    continue;
                }
                seen.push(trimmed.to_owned());
            }
        }
        if !seen.is_empty() {
            let count = seen.len();
            seen.truncate(3);
            matches.push(PatternMatch {
                kind,
                count,
                samples: seen,
            });
        }
    }
    matches
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Aggregate matches into a risk score in `[0, 1]`.
///
/// `max(strongest category x 0.85, summed saturated contributions x 0.7)`,
/// plus 0.10 per additional matched category.  The dominant-signal term
/// lets a single high-weight category (phone, email) clear the block
/// threshold on its own while a single mid-weight one cannot; the
/// multi-type boost is deliberately small so combinations of weak signals
/// escalate only alongside at least one mid-weight signal.
pub fn score(matches: &[PatternMatch]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }

    let max_weight = matches
        .iter()
        .map(|m| m.kind.weight())
        .fold(0.0_f64, f64::max);

    let total_contribution: f64 = matches
        .iter()
        .map(|m| m.kind.weight() * saturated_count(m.count) / 3.0)
        .sum();

    let multi_type_boost = if matches.len() > 1 {
        0.10 * (matches.len() - 1) as f64
    } else {
        0.0
    };

    let raw = f64::max(max_weight * 0.85, total_contribution * 0.7) + multi_type_boost;
    raw.min(1.0)
}

fn saturated_count(count: usize) -> f64 {
    count.min(COUNT_SATURATION) as f64
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Inspect one message and produce the complete intercept decision.
///
/// Short-circuits:
/// - content missing: allow with score 0 (fail open on malformed input)
/// - content longer than `max_message_length` characters: hard block with
///   score 1.0 and the `message_too_long` label, without scanning
pub fn intercept(message: &ChatMessage, config: &InterceptorConfig) -> InterceptResult {
    let Some(content) = message.content.as_deref() else {
        return InterceptResult::allow(0.0, Vec::new());
    };

    if content.chars().count() > config.max_message_length {
        return InterceptResult::hard_block(
            1.0,
            vec!["message_too_long".to_owned()],
            format!(
                "Message exceeds the maximum length of {} characters.",
                config.max_message_length
            ),
        );
    }

    let matches = scan(content);
    let risk_score = score(&matches);
    decide(risk_score, &matches, config)
}

/// Map a score and its matches onto the allow / nudge / hard-block bands.
fn decide(risk_score: f64, matches: &[PatternMatch], config: &InterceptorConfig) -> InterceptResult {
    let labels: Vec<String> = matches.iter().map(|m| m.kind.label().to_owned()).collect();

    if risk_score >= config.sync_threshold {
        InterceptResult::hard_block(risk_score, labels, block_reason(matches))
    } else if risk_score >= NUDGE_FLOOR {
        InterceptResult::nudge(risk_score, labels, nudge_message(matches))
    } else {
        InterceptResult::allow(risk_score, labels)
    }
}

fn block_reason(matches: &[PatternMatch]) -> String {
    if matches.is_empty() {
        // The threshold can only be reached with matches; kept so a future
        // formula change cannot produce a reason-less block.
        return "This message violates our messaging policies. \
                Keep conversations on the platform for your safety."
            .to_owned();
    }
    let listed = matches
        .iter()
        .map(|m| m.kind.human_name())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Sharing {listed} is not allowed. \
         Keep conversations on the platform for your safety."
    )
}

fn nudge_message(matches: &[PatternMatch]) -> String {
    // Matches are in canonical (descending-weight) order, so the first one
    // is the highest-severity category present.
    match matches.first().map(|m| m.kind) {
        Some(PatternKind::Phone | PatternKind::Email) => {
            "Sharing personal contact information may violate platform policies \
             and puts you at risk. Consider keeping the conversation here."
        }
        Some(PatternKind::Social) => {
            "We noticed you're trying to move the conversation off-platform. \
             For your safety, we recommend keeping communication here."
        }
        _ => {
            "Please keep our community guidelines in mind. Avoid sharing \
             personal contact details or unverified external links."
        }
    }
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> InterceptorConfig {
        crate::config::load_from(|_| None).expect("defaults must load")
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            message_id: "m-1".to_owned(),
            thread_id: "t-1".to_owned(),
            user_id: "u-1".to_owned(),
            content: Some(content.to_owned()),
            timestamp: "2025-06-01T12:00:00Z".to_owned(),
            gps_lat: None,
            gps_lon: None,
        }
    }

    #[test]
    fn clean_content_scores_zero() {
        assert!(scan("see you at the pickup spot tomorrow").is_empty());
        assert_eq!(score(&[]), 0.0);
    }

    #[test]
    fn repeated_substring_counts_once_per_category() {
        // The same ten digits hit both the US-grouped and condensed regexes.
        let matches = scan("5551234567");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, PatternKind::Phone);
        assert_eq!(matches[0].count, 1);
    }

    #[test]
    fn distinct_hits_raise_the_count() {
        let matches = scan("call 5551234567 or 5559876543");
        assert_eq!(matches[0].kind, PatternKind::Phone);
        assert_eq!(matches[0].count, 2);
        assert_eq!(matches[0].samples.len(), 2);
    }

    #[test]
    fn samples_are_capped_at_three() {
        let matches = scan("5551110001 5551110002 5551110003 5551110004");
        assert_eq!(matches[0].count, 4);
        assert_eq!(matches[0].samples.len(), 3);
    }

    #[test]
    fn single_phone_clears_the_block_threshold() {
        let matches = scan("call (555) 123-4567");
        let s = score(&matches);
        assert!(s >= 0.65, "single phone must block, got {s}");
        // dominant-signal term: 0.85 * 0.85
        assert!((s - 0.7225).abs() < 1e-9);
    }

    #[test]
    fn single_url_lands_in_the_nudge_band() {
        let matches = scan("see https://example.com/profile");
        let s = score(&matches);
        assert!((0.40..0.65).contains(&s), "single url must nudge, got {s}");
    }

    #[test]
    fn lone_obfuscation_stays_low() {
        let matches = scan("meet at two");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind, PatternKind::Obfuscation);
        let s = score(&matches);
        assert!(s < 0.40, "lone obfuscation must not nudge, got {s}");
    }

    #[test]
    fn multi_type_boost_escalates_combinations() {
        let phone_only = score(&scan("call (555) 123-4567"));
        let phone_and_email = score(&scan("call (555) 123-4567 or mail a@b.co"));
        assert!(phone_and_email > phone_only);
        assert!(phone_and_email <= 1.0);
    }

    #[test]
    fn score_is_clamped_to_one() {
        let matches = scan(
            "call (555) 123-4567 or 5559876543, mail a@b.co and c@d.co, \
             https://x.io/a www.y.io, add me on whatsapp or telegram, \
             five  five  five",
        );
        assert_eq!(score(&matches), 1.0);
    }

    #[test]
    fn block_reason_names_every_matched_category() {
        let config = default_config();
        let result = intercept(&message("call (555) 123-4567 or mail a@b.co"), &config);
        let reason = result.block_reason.expect("blocked result carries a reason");
        assert!(reason.contains("phone number"));
        assert!(reason.contains("email address"));
        assert!(reason.ends_with("Keep conversations on the platform for your safety."));
    }

    #[test]
    fn nudge_message_tracks_highest_severity_category() {
        let config = default_config();
        let result = intercept(&message("check https://example.com/profile"), &config);
        assert_eq!(result.action, cis_protocol::Action::Nudge);
        assert!(result.nudge_message.is_some());
    }

    #[test]
    fn missing_content_fails_open() {
        let config = default_config();
        let mut msg = message("ignored");
        msg.content = None;
        let result = intercept(&msg, &config);
        assert!(result.allowed);
        assert_eq!(result.risk_score, 0.0);
        assert!(result.labels.is_empty());
    }

    #[test]
    fn length_gate_blocks_before_scanning() {
        let config = default_config();
        let result = intercept(&message(&"a".repeat(config.max_message_length + 1)), &config);
        assert!(!result.allowed);
        assert_eq!(result.risk_score, 1.0);
        assert_eq!(result.labels, vec!["message_too_long".to_owned()]);
        assert!(
            result
                .block_reason
                .expect("length gate carries a reason")
                .contains("10000")
        );
    }

    #[test]
    fn length_gate_counts_characters_not_bytes() {
        let config = default_config();
        // Multi-byte characters, exactly at the limit: must pass the gate.
        let result = intercept(&message(&"ä".repeat(config.max_message_length)), &config);
        assert!(result.allowed);
    }

    #[test]
    fn scoring_is_deterministic() {
        let config = default_config();
        let a = intercept(&message("DM me on insta"), &config);
        let b = intercept(&message("DM me on insta"), &config);
        assert_eq!(a, b);
    }
}
