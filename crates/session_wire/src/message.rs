use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{PermissionOutcome, PermissionRequest, SessionEvent};

/// Attachment metadata carried by `session-attached` / `session-detached`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAttachment {
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Inbound message decoded from the persistent transport channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SessionEvent(SessionEvent),
    SessionAttached {
        session_id: String,
        attachment: SessionAttachment,
        revision: Option<u64>,
    },
    SessionDetached {
        session_id: String,
        attachment: SessionAttachment,
        reason: Option<String>,
    },
    PermissionRequest {
        session_id: String,
        request: PermissionRequest,
    },
    PermissionResult {
        session_id: String,
        request_id: String,
        outcome: PermissionOutcome,
    },
}

/// Decode one inbound transport frame.
///
/// Frames with an unrecognized `type`, or a recognized `type` whose required
/// fields are missing, yield `None`; the channel may carry message types this
/// client does not know about.
pub fn parse_server_message(value: Value) -> Option<ServerMessage> {
    let message_type = value.get("type")?.as_str()?;

    match message_type {
        "session-event" => {
            let event = serde_json::from_value::<SessionEvent>(strip_type(value)).ok()?;
            Some(ServerMessage::SessionEvent(event))
        }
        "session-attached" => {
            let session_id = string_field(&value, "sessionId")?;
            let revision = value.get("revision").and_then(Value::as_u64);
            Some(ServerMessage::SessionAttached {
                session_id,
                attachment: SessionAttachment {
                    machine_id: value
                        .get("machineId")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    timestamp: value
                        .get("attachedAt")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                },
                revision,
            })
        }
        "session-detached" => {
            let session_id = string_field(&value, "sessionId")?;
            Some(ServerMessage::SessionDetached {
                session_id,
                attachment: SessionAttachment {
                    machine_id: value
                        .get("machineId")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    timestamp: value
                        .get("detachedAt")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                },
                reason: value
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
            })
        }
        "permission-request" => {
            let session_id = string_field(&value, "sessionId")?;
            let request = serde_json::from_value::<PermissionRequest>(strip_type(value)).ok()?;
            Some(ServerMessage::PermissionRequest {
                session_id,
                request,
            })
        }
        "permission-result" => {
            let session_id = string_field(&value, "sessionId")?;
            let request_id = string_field(&value, "requestId")?;
            let outcome = value
                .get("outcome")
                .and_then(Value::as_str)
                .and_then(PermissionOutcome::parse)?;
            Some(ServerMessage::PermissionResult {
                session_id,
                request_id,
                outcome,
            })
        }
        _ => None,
    }
}

/// Outbound message sent over the persistent transport channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { session_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { session_id: String },
    #[serde(rename_all = "camelCase")]
    SubmitPermissionDecision {
        session_id: String,
        request_id: String,
        outcome: PermissionOutcome,
    },
}

fn strip_type(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        object.remove("type");
    }
    value
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_server_message, ClientMessage, ServerMessage};
    use crate::event::PermissionOutcome;

    #[test]
    fn parse_session_event_frame() {
        let message = parse_server_message(json!({
            "type": "session-event",
            "sessionId": "s-1",
            "revision": 1,
            "seq": 3,
            "kind": "assistant-text-chunk",
            "payload": {"text": "hi"},
        }))
        .expect("session-event frame should parse");

        let ServerMessage::SessionEvent(event) = message else {
            panic!("expected a session event");
        };
        assert_eq!(event.session_id, "s-1");
        assert_eq!(event.seq, 3);
    }

    #[test]
    fn parse_detached_frame_keeps_reason_and_machine() {
        let message = parse_server_message(json!({
            "type": "session-detached",
            "sessionId": "s-1",
            "machineId": "m-9",
            "detachedAt": "2026-01-01T00:00:00Z",
            "reason": "idle",
        }))
        .expect("session-detached frame should parse");

        let ServerMessage::SessionDetached {
            session_id,
            attachment,
            reason,
        } = message
        else {
            panic!("expected a detach message");
        };
        assert_eq!(session_id, "s-1");
        assert_eq!(attachment.machine_id.as_deref(), Some("m-9"));
        assert_eq!(reason.as_deref(), Some("idle"));
    }

    #[test]
    fn parse_ignores_unknown_frame_types() {
        assert!(parse_server_message(json!({"type": "heartbeat"})).is_none());
        assert!(parse_server_message(json!({"no": "type"})).is_none());
    }

    #[test]
    fn parse_rejects_malformed_permission_result() {
        assert!(parse_server_message(json!({
            "type": "permission-result",
            "sessionId": "s-1",
            "requestId": "r-1",
            "outcome": "shrug",
        }))
        .is_none());
    }

    #[test]
    fn client_message_wire_shape_is_stable() {
        let subscribe = serde_json::to_value(ClientMessage::Subscribe {
            session_id: "s-1".to_string(),
        })
        .expect("serialize subscribe");
        assert_eq!(subscribe["type"], "subscribe");
        assert_eq!(subscribe["sessionId"], "s-1");

        let decision = serde_json::to_value(ClientMessage::SubmitPermissionDecision {
            session_id: "s-1".to_string(),
            request_id: "r-7".to_string(),
            outcome: PermissionOutcome::Approved,
        })
        .expect("serialize decision");
        assert_eq!(decision["type"], "submit-permission-decision");
        assert_eq!(decision["requestId"], "r-7");
        assert_eq!(decision["outcome"], "approved");
    }
}
