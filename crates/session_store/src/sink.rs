use session_wire::{
    PermissionOutcome, PermissionRequest, SessionAttachment, SessionMetaUpdate, ToolCallState,
};

/// Mutation surface the synchronization engine drives against the external
/// session store.
///
/// Implementations may apply writes lazily (a UI store batching renders, a
/// bridge posting to another process); the engine keeps its own cursor cache
/// and never depends on these writes being observable synchronously. Methods
/// are infallible for the same reason: a sink that cannot persist a write has
/// no way to un-apply an admitted event, so failures belong inside the sink.
pub trait SessionSink: Send + Sync {
    /// Ensure a local record exists for `session_id` before events arrive.
    fn create_local_session(&self, session_id: &str);

    fn append_user_chunk(&self, session_id: &str, text: &str);
    fn append_assistant_chunk(&self, session_id: &str, text: &str);
    fn append_thought_chunk(&self, session_id: &str, text: &str);

    /// Append raw terminal output produced by one tool call.
    fn append_terminal_output(&self, session_id: &str, call_id: &str, delta: &str);

    /// Create or replace the stored state for `call.call_id`.
    fn upsert_tool_call(&self, session_id: &str, call: ToolCallState);

    /// Merge a partial metadata update; `None` fields are left untouched.
    fn update_session_meta(&self, session_id: &str, meta: SessionMetaUpdate);

    fn set_stream_error(&self, session_id: &str, message: Option<&str>);

    /// Record the end of one assistant turn.
    fn mark_turn_complete(&self, session_id: &str);

    fn add_permission_request(&self, session_id: &str, request: PermissionRequest);
    fn set_permission_outcome(&self, session_id: &str, request_id: &str, outcome: PermissionOutcome);

    /// Record the engine's cursor after an admitted event or a reset.
    fn update_session_cursor(&self, session_id: &str, revision: u64, seq: u64);

    /// Drop all revision-scoped content and restart the session's view at
    /// `revision` with nothing applied.
    fn reset_session_for_revision(&self, session_id: &str, revision: u64);

    fn mark_session_attached(&self, session_id: &str, attachment: &SessionAttachment);
    fn mark_session_detached(&self, session_id: &str, reason: &str);

    fn set_session_backfilling(&self, session_id: &str, active: bool);
}
