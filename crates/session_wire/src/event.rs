use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known event kinds emitted by the server for a session's event log.
///
/// Unrecognized kinds must be dropped by dispatchers without error so new
/// server releases can add kinds ahead of client updates.
pub mod kind {
    pub const USER_TEXT_CHUNK: &str = "user-text-chunk";
    pub const ASSISTANT_TEXT_CHUNK: &str = "assistant-text-chunk";
    pub const THOUGHT_CHUNK: &str = "thought-chunk";
    pub const TOOL_CALL_CREATED: &str = "tool-call-created";
    pub const TOOL_CALL_UPDATED: &str = "tool-call-updated";
    pub const TERMINAL_OUTPUT_DELTA: &str = "terminal-output-delta";
    pub const SESSION_METADATA_UPDATE: &str = "session-metadata-update";
    pub const PERMISSION_REQUEST: &str = "permission-request";
    pub const PERMISSION_RESULT: &str = "permission-result";
    pub const STREAM_ERROR: &str = "stream-error";
    pub const TURN_END: &str = "turn-end";
}

/// One immutable entry of a session's replicated event log.
///
/// `seq` is 1-based and strictly increasing per `(session_id, revision)`;
/// `payload` stays opaque until the dispatcher resolves it by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: String,
    pub revision: u64,
    pub seq: u64,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl SessionEvent {
    pub fn new(
        session_id: impl Into<String>,
        revision: u64,
        seq: u64,
        kind: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            revision,
            seq,
            kind: kind.into(),
            payload,
        }
    }
}

/// Payload for the text chunk kinds (user, assistant, thought).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunkPayload {
    pub text: String,
}

/// Lifecycle status of a tool call surfaced to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolCallStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Payload for `tool-call-created` / `tool-call-updated`, and the shape the
/// store keeps per call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallState {
    pub call_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default = "default_tool_call_status")]
    pub status: ToolCallStatus,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub output: Option<Value>,
}

fn default_tool_call_status() -> ToolCallStatus {
    ToolCallStatus::Pending
}

/// Payload for `terminal-output-delta`: raw output appended to one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputPayload {
    pub call_id: String,
    pub delta: String,
}

/// Partial metadata update; absent fields leave stored values untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetaUpdate {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub available_commands: Option<Vec<String>>,
}

/// Payload for `stream-error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorPayload {
    pub message: String,
}

/// A pending permission request raised by the server for one tool action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub request_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Payload for the ordered `permission-result` event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResultPayload {
    pub request_id: String,
    pub outcome: PermissionOutcome,
}

/// Resolution of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOutcome {
    Approved,
    Denied,
    Cancelled,
}

impl PermissionOutcome {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "approved" => Self::Approved,
            "denied" => Self::Denied,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PermissionOutcome, SessionEvent, ToolCallState, ToolCallStatus};

    #[test]
    fn session_event_round_trips_camel_case_fields() {
        let event = SessionEvent::new("s-1", 2, 7, "assistant-text-chunk", json!({"text": "hi"}));
        let value = serde_json::to_value(&event).expect("serialize event");

        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["revision"], 2);
        assert_eq!(value["seq"], 7);

        let back: SessionEvent = serde_json::from_value(value).expect("deserialize event");
        assert_eq!(back, event);
    }

    #[test]
    fn session_event_payload_defaults_to_null() {
        let event: SessionEvent = serde_json::from_value(json!({
            "sessionId": "s-1",
            "revision": 1,
            "seq": 1,
            "kind": "turn-end",
        }))
        .expect("deserialize without payload");

        assert!(event.payload.is_null());
    }

    #[test]
    fn tool_call_state_defaults_status_to_pending() {
        let call: ToolCallState = serde_json::from_value(json!({"callId": "c-1"}))
            .expect("deserialize minimal tool call");

        assert_eq!(call.status, ToolCallStatus::Pending);
        assert!(call.tool_name.is_none());
    }

    #[test]
    fn permission_outcome_parse_matches_as_str() {
        for outcome in [
            PermissionOutcome::Approved,
            PermissionOutcome::Denied,
            PermissionOutcome::Cancelled,
        ] {
            assert_eq!(PermissionOutcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(PermissionOutcome::parse("maybe"), None);
    }
}
