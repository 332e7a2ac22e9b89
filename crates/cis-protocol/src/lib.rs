// cis-protocol: Intercept wire protocol types and serialization.
//
// All WebSocket frames use a top-level `type` field for discriminated
// deserialization.  The enum variants map 1:1 to the frozen v1 frame kinds.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// An outgoing chat message as submitted for pre-send inspection.
///
/// Identifiers are opaque strings minted by the messaging product; the
/// interceptor never parses them.  `timestamp` is UTC ISO-8601.
///
/// `content` is optional at the wire layer so that a frame missing it still
/// deserializes -- the dispatcher rejects such frames with a protocol error,
/// and the scorer treats a missing body as malformed input and fails open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub thread_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_lon: Option<f64>,
}

/// The synchronous decision taken for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Nudge,
    HardBlock,
}

impl Action {
    /// The wire string for this action (matches the serde representation).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Nudge => "nudge",
            Action::HardBlock => "hard_block",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of scoring one message.
///
/// Invariants (enforced by the constructors):
/// - `allowed == (action != hard_block)`
/// - `nudge_message` is present iff `action == nudge`
/// - `block_reason` is present iff `action == hard_block`
/// - `risk_score` is within `[0.0, 1.0]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptResult {
    pub allowed: bool,
    pub action: Action,
    pub risk_score: f64,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nudge_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl InterceptResult {
    /// Permit the message, carrying any labels the scorer assigned.
    pub fn allow(risk_score: f64, labels: Vec<String>) -> Self {
        InterceptResult {
            allowed: true,
            action: Action::Allow,
            risk_score,
            labels,
            nudge_message: None,
            block_reason: None,
        }
    }

    /// Permit the message but attach user-visible warning text.
    pub fn nudge(risk_score: f64, labels: Vec<String>, nudge_message: String) -> Self {
        InterceptResult {
            allowed: true,
            action: Action::Nudge,
            risk_score,
            labels,
            nudge_message: Some(nudge_message),
            block_reason: None,
        }
    }

    /// Refuse delivery with a user-visible reason.
    pub fn hard_block(risk_score: f64, labels: Vec<String>, block_reason: String) -> Self {
        InterceptResult {
            allowed: false,
            action: Action::HardBlock,
            risk_score,
            labels,
            nudge_message: None,
            block_reason: Some(block_reason),
        }
    }

    /// Compact JSON summary carried in stream events for downstream
    /// consumers: `allowed`, `action`, `risk_score`, `labels` only.
    pub fn summary_json(&self) -> String {
        serde_json::json!({
            "allowed": self.allowed,
            "action": self.action,
            "risk_score": self.risk_score,
            "labels": self.labels,
        })
        .to_string()
    }
}

// ---------------------------------------------------------------------------
// Client -> Interceptor frames
// ---------------------------------------------------------------------------

/// Request to inspect one outgoing message before delivery.
///
/// `request_id` is an opaque correlation id echoed back in the response.
/// When absent, the dispatcher mints a fresh UUID so every response is
/// correlatable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorRequest {
    pub message: ChatMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Interceptor -> Client frames
// ---------------------------------------------------------------------------

/// The synchronous intercept decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorResponse {
    pub request_id: String,
    pub result: InterceptResult,
    /// Wall-clock handling time measured from frame arrival, in ms.
    pub processing_ms: u64,
}

/// Frozen v1 error codes.
pub mod error_codes {
    pub const PROCESSING_ERROR: &str = "processing_error";
}

/// Protocol error frame (interceptor -> client).
///
/// `request_id` is echoed when the inbound frame parsed far enough to carry
/// one; a frame that failed JSON parsing has no id to echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// One of the frozen v1 error codes.
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    /// A `processing_error` frame with the given human-readable message.
    pub fn processing(request_id: Option<String>, message: impl Into<String>) -> Self {
        ErrorResponse {
            request_id,
            error: error_codes::PROCESSING_ERROR.to_owned(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All WebSocket frame kinds in the v1 protocol.
///
/// Serializes/deserializes using the `type` field as a tag.
///
/// ```json
/// { "type": "intercept", "message": { ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum WireMessage {
    Intercept(InterceptorRequest),
    InterceptResult(InterceptorResponse),
    Error(ErrorResponse),
}
