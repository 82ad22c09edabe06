use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use session_store::SessionSink;
use session_wire::{
    kind, PermissionRequest, PermissionResultPayload, SessionEvent, SessionMetaUpdate,
    StreamErrorPayload, TerminalOutputPayload, TextChunkPayload, ToolCallState,
};

/// Map one admitted event to its store mutation.
///
/// By the time an event reaches here it is guaranteed to be the next one in
/// sequence for its session; this function makes no ordering decisions.
/// Unknown kinds are dropped without error so newer servers stay compatible
/// with older clients; a known kind with a malformed payload is dropped with
/// a warning rather than stalling the stream.
pub fn dispatch_event(sink: &dyn SessionSink, event: &SessionEvent) {
    let session_id = event.session_id.as_str();

    match event.kind.as_str() {
        kind::USER_TEXT_CHUNK => {
            if let Some(chunk) = decode::<TextChunkPayload>(event) {
                sink.append_user_chunk(session_id, &chunk.text);
            }
        }
        kind::ASSISTANT_TEXT_CHUNK => {
            if let Some(chunk) = decode::<TextChunkPayload>(event) {
                sink.append_assistant_chunk(session_id, &chunk.text);
            }
        }
        kind::THOUGHT_CHUNK => {
            if let Some(chunk) = decode::<TextChunkPayload>(event) {
                sink.append_thought_chunk(session_id, &chunk.text);
            }
        }
        kind::TOOL_CALL_CREATED | kind::TOOL_CALL_UPDATED => {
            if let Some(call) = decode::<ToolCallState>(event) {
                sink.upsert_tool_call(session_id, call);
            }
        }
        kind::TERMINAL_OUTPUT_DELTA => {
            if let Some(output) = decode::<TerminalOutputPayload>(event) {
                sink.append_terminal_output(session_id, &output.call_id, &output.delta);
            }
        }
        kind::SESSION_METADATA_UPDATE => {
            if let Some(meta) = decode::<SessionMetaUpdate>(event) {
                sink.update_session_meta(session_id, meta);
            }
        }
        kind::PERMISSION_REQUEST => {
            if let Some(request) = decode::<PermissionRequest>(event) {
                sink.add_permission_request(session_id, request);
            }
        }
        kind::PERMISSION_RESULT => {
            if let Some(result) = decode::<PermissionResultPayload>(event) {
                sink.set_permission_outcome(session_id, &result.request_id, result.outcome);
            }
        }
        kind::STREAM_ERROR => {
            if let Some(error) = decode::<StreamErrorPayload>(event) {
                sink.set_stream_error(session_id, Some(&error.message));
            }
        }
        kind::TURN_END => {
            sink.mark_turn_complete(session_id);
        }
        unknown => {
            debug!(kind = unknown, seq = event.seq, "ignoring unknown event kind");
        }
    }
}

fn decode<T: DeserializeOwned>(event: &SessionEvent) -> Option<T> {
    match serde_json::from_value(event.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(error) => {
            warn!(
                kind = %event.kind,
                seq = event.seq,
                %error,
                "dropping event with malformed payload"
            );
            None
        }
    }
}
