use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use session_wire::{
    PermissionOutcome, PermissionRequest, SessionAttachment, SessionMetaUpdate, ToolCallState,
};

use crate::sink::SessionSink;

/// Materialized view of one session as the in-memory store sees it.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub revision: Option<u64>,
    pub last_applied_seq: u64,
    pub user_text: String,
    pub assistant_text: String,
    pub thought_text: String,
    /// Terminal output concatenated per tool call id.
    pub terminal_output: BTreeMap<String, String>,
    pub tool_calls: BTreeMap<String, ToolCallState>,
    pub mode: Option<String>,
    pub title: Option<String>,
    pub available_commands: Option<Vec<String>>,
    pub stream_error: Option<String>,
    pub turns_completed: u64,
    pub permission_requests: Vec<PermissionRequest>,
    pub permission_outcomes: BTreeMap<String, PermissionOutcome>,
    pub attached: bool,
    pub attached_machine_id: Option<String>,
    pub attached_at: Option<OffsetDateTime>,
    pub detach_reason: Option<String>,
    pub backfilling: bool,
    /// How many revision resets this session has been through.
    pub resets: u64,
}

/// Threadsafe in-memory `SessionSink` used by tests and as the reference
/// store implementation.
///
/// `dispatch_count` counts content mutations only (chunks, tool calls,
/// metadata, permissions, turn ends); cursor and attachment bookkeeping do
/// not count, which lets tests assert exactly-once dispatch.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    dispatched: AtomicU64,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_id)
            .cloned()
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatched.load(Ordering::Acquire)
    }

    fn with_session<R>(&self, session_id: &str, mutate: impl FnOnce(&mut SessionRecord) -> R) -> R {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let record = sessions.entry(session_id.to_string()).or_default();
        mutate(record)
    }

    fn count_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::AcqRel);
    }
}

impl SessionSink for MemorySessionStore {
    fn create_local_session(&self, session_id: &str) {
        self.with_session(session_id, |_| {});
    }

    fn append_user_chunk(&self, session_id: &str, text: &str) {
        self.count_dispatch();
        self.with_session(session_id, |record| record.user_text.push_str(text));
    }

    fn append_assistant_chunk(&self, session_id: &str, text: &str) {
        self.count_dispatch();
        self.with_session(session_id, |record| record.assistant_text.push_str(text));
    }

    fn append_thought_chunk(&self, session_id: &str, text: &str) {
        self.count_dispatch();
        self.with_session(session_id, |record| record.thought_text.push_str(text));
    }

    fn append_terminal_output(&self, session_id: &str, call_id: &str, delta: &str) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            record
                .terminal_output
                .entry(call_id.to_string())
                .or_default()
                .push_str(delta);
        });
    }

    fn upsert_tool_call(&self, session_id: &str, call: ToolCallState) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            record.tool_calls.insert(call.call_id.clone(), call);
        });
    }

    fn update_session_meta(&self, session_id: &str, meta: SessionMetaUpdate) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            if let Some(mode) = meta.mode {
                record.mode = Some(mode);
            }
            if let Some(title) = meta.title {
                record.title = Some(title);
            }
            if let Some(commands) = meta.available_commands {
                record.available_commands = Some(commands);
            }
        });
    }

    fn set_stream_error(&self, session_id: &str, message: Option<&str>) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            record.stream_error = message.map(ToString::to_string);
        });
    }

    fn mark_turn_complete(&self, session_id: &str) {
        self.count_dispatch();
        self.with_session(session_id, |record| record.turns_completed += 1);
    }

    fn add_permission_request(&self, session_id: &str, request: PermissionRequest) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            if record
                .permission_requests
                .iter()
                .all(|existing| existing.request_id != request.request_id)
            {
                record.permission_requests.push(request);
            }
        });
    }

    fn set_permission_outcome(
        &self,
        session_id: &str,
        request_id: &str,
        outcome: PermissionOutcome,
    ) {
        self.count_dispatch();
        self.with_session(session_id, |record| {
            record
                .permission_outcomes
                .insert(request_id.to_string(), outcome);
        });
    }

    fn update_session_cursor(&self, session_id: &str, revision: u64, seq: u64) {
        self.with_session(session_id, |record| {
            record.revision = Some(revision);
            record.last_applied_seq = seq;
        });
    }

    fn reset_session_for_revision(&self, session_id: &str, revision: u64) {
        self.with_session(session_id, |record| {
            let attachment = (
                record.attached,
                record.attached_machine_id.take(),
                record.attached_at.take(),
                record.detach_reason.take(),
            );
            let resets = record.resets + 1;
            *record = SessionRecord {
                revision: Some(revision),
                attached: attachment.0,
                attached_machine_id: attachment.1,
                attached_at: attachment.2,
                detach_reason: attachment.3,
                resets,
                ..SessionRecord::default()
            };
        });
    }

    fn mark_session_attached(&self, session_id: &str, attachment: &SessionAttachment) {
        self.with_session(session_id, |record| {
            record.attached = true;
            record.detach_reason = None;
            record.attached_machine_id = attachment.machine_id.clone();
            record.attached_at = attachment
                .timestamp
                .as_deref()
                .and_then(|value| OffsetDateTime::parse(value, &Rfc3339).ok());
        });
    }

    fn mark_session_detached(&self, session_id: &str, reason: &str) {
        self.with_session(session_id, |record| {
            record.attached = false;
            record.detach_reason = Some(reason.to_string());
        });
    }

    fn set_session_backfilling(&self, session_id: &str, active: bool) {
        self.with_session(session_id, |record| record.backfilling = active);
    }
}
