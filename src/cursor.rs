use session_wire::SessionEvent;

/// Synchronization progress for one session: how far the ordered event log
/// has been applied, and under which revision.
///
/// This is the engine's synchronous shadow of the store's copy. Admission
/// decisions consult this value only; the store's copy may lag behind for
/// the duration of a deferred write and must never be read back for
/// ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCursor {
    /// `None` until the first event or backfill page is observed.
    pub revision: Option<u64>,
    /// Highest contiguously applied seq within `revision`; 0 means none.
    pub last_applied_seq: u64,
}

/// Admission decision for one incoming event against a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Cursor has no revision yet; adopt the event's revision at seq 0 and
    /// classify the event again.
    Initialize,
    /// Event is the next in sequence; dispatch it and advance.
    Apply,
    /// Event is ahead of the cursor; park it and close the gap by backfill.
    Buffer,
    /// Event belongs to a newer revision; the current view is obsolete.
    Reset { revision: u64 },
    /// Event belongs to a superseded revision.
    DiscardStale,
    /// Event was already applied under this revision.
    DiscardDuplicate,
}

impl SessionCursor {
    /// Classify an incoming event. Pure and synchronous; side effects are
    /// the caller's job.
    pub fn classify(&self, event: &SessionEvent) -> Admission {
        let Some(revision) = self.revision else {
            return Admission::Initialize;
        };

        if event.revision > revision {
            return Admission::Reset {
                revision: event.revision,
            };
        }
        if event.revision < revision {
            return Admission::DiscardStale;
        }
        if event.seq <= self.last_applied_seq {
            return Admission::DiscardDuplicate;
        }
        if event.seq == self.last_applied_seq + 1 {
            Admission::Apply
        } else {
            Admission::Buffer
        }
    }

    /// Adopt `revision` with nothing applied yet.
    pub fn initialize(&mut self, revision: u64) {
        self.revision = Some(revision);
        self.last_applied_seq = 0;
    }

    /// Record that the event at `seq` was dispatched.
    pub fn advance(&mut self, seq: u64) {
        debug_assert_eq!(seq, self.last_applied_seq + 1, "cursor must advance by one");
        self.last_applied_seq = seq;
    }
}

/// Per-session synchronization status:
/// `Uninitialized → Synced ⇄ GapPending → Resetting → Synced`.
///
/// There is no terminal state; unsubscribing discards the machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Uninitialized,
    Synced,
    GapPending,
    Resetting,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use session_wire::SessionEvent;

    use super::{Admission, SessionCursor};

    fn event(revision: u64, seq: u64) -> SessionEvent {
        SessionEvent::new("s-1", revision, seq, "turn-end", json!(null))
    }

    #[test]
    fn unset_cursor_initializes() {
        let cursor = SessionCursor::default();
        assert_eq!(cursor.classify(&event(3, 5)), Admission::Initialize);
    }

    #[test]
    fn classification_covers_the_decision_table() {
        let mut cursor = SessionCursor::default();
        cursor.initialize(2);
        cursor.advance(1);
        cursor.advance(2);

        assert_eq!(cursor.classify(&event(3, 1)), Admission::Reset { revision: 3 });
        assert_eq!(cursor.classify(&event(1, 9)), Admission::DiscardStale);
        assert_eq!(cursor.classify(&event(2, 2)), Admission::DiscardDuplicate);
        assert_eq!(cursor.classify(&event(2, 3)), Admission::Apply);
        assert_eq!(cursor.classify(&event(2, 5)), Admission::Buffer);
    }

    #[test]
    fn initialize_resets_applied_seq() {
        let mut cursor = SessionCursor::default();
        cursor.initialize(1);
        cursor.advance(1);
        cursor.initialize(2);
        assert_eq!(cursor.last_applied_seq, 0);
        assert_eq!(cursor.classify(&event(2, 1)), Admission::Apply);
    }
}
