/// Out-of-band notifications emitted by the runtime for UI surfaces that
/// want to show sync progress. Purely informational; engine state does not
/// depend on anyone observing these.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotification {
    /// A backfill finished; `fetched` events were pulled from the server.
    BackfillCompleted { session_id: String, fetched: u64 },
    /// A backfill stopped on a fetch error or too many revision mismatches.
    BackfillFailed { session_id: String, error: String },
    /// The server moved the session to a new revision and the local view
    /// was rebuilt from seq 0.
    RevisionReset { session_id: String, revision: u64 },
    /// The transport reconnected and these sessions were re-subscribed and
    /// re-armed for catch-up. Not emitted on the first connect.
    ReconnectRecovery { sessions: Vec<String> },
}

/// Callback invoked with each [`SyncNotification`].
pub type NotifyFn = Box<dyn FnMut(SyncNotification) + Send>;

/// A notify callback that drops everything.
pub fn noop_notify() -> NotifyFn {
    Box::new(|_| {})
}
