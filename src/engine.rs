use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use session_store::SessionSink;
use session_wire::{SessionAttachment, SessionEvent};

use crate::config::SyncConfig;
use crate::cursor::{Admission, SessionCursor, SyncStatus};
use crate::dispatch::dispatch_event;
use crate::pending::{InsertOutcome, PendingBuffer};

/// Asynchronous work the runtime must carry out on the engine's behalf.
///
/// The engine itself is pure and synchronous: every method runs to
/// completion without awaiting, mutating the cursor map and the sink in
/// lock-step, and hands back directives instead of doing I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDirective {
    StartBackfill {
        session_id: String,
        revision: u64,
        after_seq: u64,
    },
    CancelBackfill {
        session_id: String,
    },
}

#[derive(Debug)]
struct SessionSyncState {
    cursor: SessionCursor,
    pending: PendingBuffer,
    status: SyncStatus,
    attached: bool,
    /// True while a backfill is armed for this session; gap events do not
    /// re-arm one until the current attempt resolves.
    backfill_armed: bool,
}

impl SessionSyncState {
    fn new(capacity: usize) -> Self {
        Self {
            cursor: SessionCursor::default(),
            pending: PendingBuffer::new(capacity),
            status: SyncStatus::Uninitialized,
            attached: false,
            backfill_armed: false,
        }
    }
}

/// The session event synchronization engine.
///
/// Owns the per-session cursor, pending buffer, and status machine for every
/// subscribed session; entry lifecycle is tied 1:1 to subscription
/// lifecycle. All state lives on one logical thread — the runtime funnels
/// live events, backfill results, and commands through it serially, so no
/// locking is needed beyond the backfill generation fence the runtime keeps.
pub struct SyncEngine {
    sessions: HashMap<String, SessionSyncState>,
    sink: Arc<dyn SessionSink>,
    config: SyncConfig,
    ever_connected: bool,
}

impl SyncEngine {
    pub fn new(sink: Arc<dyn SessionSink>, config: SyncConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            sink,
            config,
            ever_connected: false,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Begin tracking a session. Idempotent.
    pub fn subscribe(&mut self, session_id: &str) {
        if !self.sessions.contains_key(session_id) {
            self.sink.create_local_session(session_id);
            self.sessions.insert(
                session_id.to_string(),
                SessionSyncState::new(self.config.pending_buffer_capacity),
            );
        }
    }

    /// Stop tracking a session, discarding its cursor and buffer.
    pub fn unsubscribe(&mut self, session_id: &str) -> Vec<SyncDirective> {
        if self.sessions.remove(session_id).is_some() {
            vec![SyncDirective::CancelBackfill {
                session_id: session_id.to_string(),
            }]
        } else {
            Vec::new()
        }
    }

    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn subscribed_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self.sessions.keys().cloned().collect();
        sessions.sort();
        sessions
    }

    pub fn cursor(&self, session_id: &str) -> Option<SessionCursor> {
        self.sessions.get(session_id).map(|state| state.cursor)
    }

    pub fn status(&self, session_id: &str) -> Option<SyncStatus> {
        self.sessions.get(session_id).map(|state| state.status)
    }

    pub fn pending_len(&self, session_id: &str) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, |state| state.pending.len())
    }

    /// Admit one event, live or backfilled; both paths converge here.
    pub fn ingest(&mut self, event: SessionEvent) -> Vec<SyncDirective> {
        let mut directives = Vec::new();
        let sink = Arc::clone(&self.sink);
        let session_id = event.session_id.clone();
        let capacity = self.config.pending_buffer_capacity;
        let state = self.sessions.entry(session_id.clone()).or_insert_with(|| {
            // Cursor created implicitly on first event for the session.
            sink.create_local_session(&session_id);
            SessionSyncState::new(capacity)
        });

        loop {
            match state.cursor.classify(&event) {
                Admission::Initialize => {
                    state.cursor.initialize(event.revision);
                    sink.update_session_cursor(&session_id, event.revision, 0);
                    trace!(session_id, revision = event.revision, "cursor initialized");
                    continue;
                }
                Admission::Apply => {
                    dispatch_event(sink.as_ref(), &event);
                    state.cursor.advance(event.seq);
                    sink.update_session_cursor(&session_id, event.revision, event.seq);
                    flush_consecutive(&session_id, state, sink.as_ref());
                    state.status = if state.pending.is_empty() {
                        SyncStatus::Synced
                    } else {
                        SyncStatus::GapPending
                    };
                }
                Admission::Buffer => match state.pending.insert(event.clone()) {
                    InsertOutcome::Inserted => {
                        trace!(
                            session_id,
                            seq = event.seq,
                            after = state.cursor.last_applied_seq,
                            "buffered out-of-order event"
                        );
                        if state.status != SyncStatus::Resetting {
                            state.status = SyncStatus::GapPending;
                        }
                        if !state.backfill_armed {
                            state.backfill_armed = true;
                            directives.push(SyncDirective::StartBackfill {
                                session_id: session_id.clone(),
                                revision: state
                                    .cursor
                                    .revision
                                    .unwrap_or(event.revision),
                                after_seq: state.cursor.last_applied_seq,
                            });
                        }
                    }
                    InsertOutcome::Duplicate => {
                        trace!(session_id, seq = event.seq, "duplicate buffered event");
                    }
                    InsertOutcome::Overflow => {
                        let revision = state.cursor.revision.unwrap_or(event.revision);
                        warn!(
                            session_id,
                            revision,
                            capacity,
                            "pending buffer overflow, forcing full reset"
                        );
                        reset_session(&session_id, state, sink.as_ref(), revision, Some(&event));
                        directives.push(SyncDirective::StartBackfill {
                            session_id: session_id.clone(),
                            revision,
                            after_seq: 0,
                        });
                    }
                },
                Admission::Reset { revision } => {
                    debug!(
                        session_id,
                        from = ?state.cursor.revision,
                        to = revision,
                        "revision bump, resetting session view"
                    );
                    reset_session(&session_id, state, sink.as_ref(), revision, Some(&event));
                    directives.push(SyncDirective::StartBackfill {
                        session_id: session_id.clone(),
                        revision,
                        after_seq: 0,
                    });
                }
                Admission::DiscardStale => {
                    trace!(
                        session_id,
                        revision = event.revision,
                        seq = event.seq,
                        "discarding event from superseded revision"
                    );
                }
                Admission::DiscardDuplicate => {
                    trace!(
                        session_id,
                        seq = event.seq,
                        applied = state.cursor.last_applied_seq,
                        "discarding already-applied event"
                    );
                }
            }
            break;
        }

        directives
    }

    /// Rebuild a session's view at `revision` from seq 0. Used by the
    /// revision-mismatch path; the caller arms the follow-up backfill.
    pub fn reset_to_revision(&mut self, session_id: &str, revision: u64) {
        let sink = Arc::clone(&self.sink);
        if let Some(state) = self.sessions.get_mut(session_id) {
            reset_session(session_id, state, sink.as_ref(), revision, None);
        }
    }

    /// A backfill for this session finished normally. Applies any buffered
    /// events that became consecutive and decides whether a residual gap
    /// warrants another round.
    ///
    /// `after_seq_at_start` guards against re-arming when the previous round
    /// made no progress, which would otherwise loop against a server that
    /// does not yet have the gap events.
    pub fn handle_backfill_complete(
        &mut self,
        session_id: &str,
        after_seq_at_start: u64,
    ) -> Vec<SyncDirective> {
        let sink = Arc::clone(&self.sink);
        let Some(state) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        state.backfill_armed = false;
        flush_consecutive(session_id, state, sink.as_ref());

        if state.pending.is_empty() {
            if state.status != SyncStatus::Uninitialized {
                state.status = SyncStatus::Synced;
            }
            return Vec::new();
        }

        state.status = SyncStatus::GapPending;
        let made_progress = state.cursor.last_applied_seq > after_seq_at_start;
        if !made_progress {
            debug!(
                session_id,
                buffered = state.pending.len(),
                lowest = ?state.pending.lowest_seq(),
                "backfill made no progress, waiting for live traffic"
            );
            return Vec::new();
        }

        state.backfill_armed = true;
        vec![SyncDirective::StartBackfill {
            session_id: session_id.to_string(),
            revision: state.cursor.revision.unwrap_or(0),
            after_seq: state.cursor.last_applied_seq,
        }]
    }

    /// A backfill failed. Best-effort: apply whatever buffered events are
    /// already consecutive so live traffic is not starved, but do not
    /// re-arm; the caller decides whether to retry.
    pub fn handle_backfill_failed(&mut self, session_id: &str) {
        let sink = Arc::clone(&self.sink);
        if let Some(state) = self.sessions.get_mut(session_id) {
            state.backfill_armed = false;
            flush_consecutive(session_id, state, sink.as_ref());
            if state.pending.is_empty() && state.status == SyncStatus::GapPending {
                state.status = SyncStatus::Synced;
            }
        }
    }

    /// The revision-mismatch retry limit is exhausted: stop chasing the server,
    /// apply whatever is buffered and consecutive, and settle.
    pub fn degrade_after_mismatch(&mut self, session_id: &str) {
        let sink = Arc::clone(&self.sink);
        if let Some(state) = self.sessions.get_mut(session_id) {
            state.backfill_armed = false;
            flush_consecutive(session_id, state, sink.as_ref());
            state.status = if state.pending.is_empty() {
                SyncStatus::Synced
            } else {
                SyncStatus::GapPending
            };
        }
    }

    /// Mark a backfill armed without emitting a directive; used when the
    /// runtime starts one directly (mismatch restart).
    pub fn mark_backfill_armed(&mut self, session_id: &str) {
        if let Some(state) = self.sessions.get_mut(session_id) {
            state.backfill_armed = true;
            if state.status != SyncStatus::Resetting {
                state.status = SyncStatus::GapPending;
            }
        }
    }

    /// Transport (re)connected. Returns whether this was a reconnect and
    /// the backfills to arm; the runtime re-subscribes separately.
    ///
    /// Every connect arms a backfill per subscribed session: on a cold
    /// start the cursor is unset and the fetch bootstraps at revision 0,
    /// on a reconnect it resumes from the last applied seq.
    pub fn on_connect(&mut self) -> (bool, Vec<SyncDirective>) {
        let reconnect = self.ever_connected;
        self.ever_connected = true;

        let mut directives = Vec::new();
        let mut session_ids: Vec<String> = self.sessions.keys().cloned().collect();
        session_ids.sort();
        for session_id in session_ids {
            if let Some(state) = self.sessions.get_mut(&session_id) {
                state.backfill_armed = true;
                if state.status == SyncStatus::Synced {
                    state.status = SyncStatus::GapPending;
                }
                directives.push(SyncDirective::StartBackfill {
                    revision: state.cursor.revision.unwrap_or(0),
                    after_seq: state.cursor.last_applied_seq,
                    session_id,
                });
            }
        }
        (reconnect, directives)
    }

    /// Transport dropped; every attached session becomes detached.
    pub fn on_disconnect(&mut self, reason: &str) {
        debug!(reason, "transport disconnected");
        for (session_id, state) in &mut self.sessions {
            if state.attached {
                state.attached = false;
                self.sink
                    .mark_session_detached(session_id, "transport_disconnect");
            }
        }
    }

    pub fn on_attached(&mut self, session_id: &str, attachment: &SessionAttachment) {
        if let Some(state) = self.sessions.get_mut(session_id) {
            state.attached = true;
        }
        self.sink.mark_session_attached(session_id, attachment);
    }

    pub fn on_detached(&mut self, session_id: &str, reason: Option<&str>) {
        if let Some(state) = self.sessions.get_mut(session_id) {
            state.attached = false;
        }
        self.sink
            .mark_session_detached(session_id, reason.unwrap_or("server_detach"));
    }
}

/// Apply buffered events that are now consecutive with the cursor, pruning
/// anything the cursor has already passed. This is the convergence point
/// for out-of-order live delivery and backfilled pages.
fn flush_consecutive(session_id: &str, state: &mut SessionSyncState, sink: &dyn SessionSink) {
    state.pending.discard_through(state.cursor.last_applied_seq);
    while let Some(next) = state.pending.take_next(state.cursor.last_applied_seq + 1) {
        dispatch_event(sink, &next);
        state.cursor.advance(next.seq);
        if let Some(revision) = state.cursor.revision {
            sink.update_session_cursor(session_id, revision, next.seq);
        }
    }
}

fn reset_session(
    session_id: &str,
    state: &mut SessionSyncState,
    sink: &dyn SessionSink,
    revision: u64,
    trigger: Option<&SessionEvent>,
) {
    state.pending.clear();
    if let Some(event) = trigger {
        state.pending.insert(event.clone());
    }
    state.cursor.initialize(revision);
    state.status = SyncStatus::Resetting;
    state.backfill_armed = true;
    sink.reset_session_for_revision(session_id, revision);
    sink.update_session_cursor(session_id, revision, 0);
}
