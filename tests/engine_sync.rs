use std::sync::Arc;

use serde_json::json;

use session_sync::{
    kind, MemorySessionStore, SessionEvent, SyncConfig, SyncDirective, SyncEngine, SyncStatus,
};

fn chunk(session_id: &str, revision: u64, seq: u64, text: &str) -> SessionEvent {
    SessionEvent::new(
        session_id,
        revision,
        seq,
        kind::ASSISTANT_TEXT_CHUNK,
        json!({ "text": text }),
    )
}

fn engine_with_store(config: SyncConfig) -> (SyncEngine, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let engine = SyncEngine::new(store.clone(), config);
    (engine, store)
}

#[test]
fn consecutive_events_apply_in_order() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    for (seq, text) in [(1, "a"), (2, "b"), (3, "c")] {
        let directives = engine.ingest(chunk("s-1", 1, seq, text));
        assert!(directives.is_empty());
    }

    let record = store.snapshot("s-1").expect("session exists");
    assert_eq!(record.assistant_text, "abc");
    assert_eq!(record.revision, Some(1));
    assert_eq!(record.last_applied_seq, 3);
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Synced));
}

#[test]
fn duplicate_delivery_dispatches_once() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 2, "b"));
    let before = store.dispatch_count();
    engine.ingest(chunk("s-1", 1, 2, "b"));
    engine.ingest(chunk("s-1", 1, 1, "a"));

    assert_eq!(store.dispatch_count(), before);
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "ab");
}

#[test]
fn out_of_order_delivery_converges_to_in_order_result() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    let directives = engine.ingest(chunk("s-1", 1, 3, "c"));
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 1,
            after_seq: 1,
        }]
    );
    assert_eq!(engine.status("s-1"), Some(SyncStatus::GapPending));
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "a");

    // The missing event arriving live closes the gap without the backfill.
    let directives = engine.ingest(chunk("s-1", 1, 2, "b"));
    assert!(directives.is_empty());
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "abc");
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Synced));
    assert_eq!(engine.pending_len("s-1"), 0);
}

#[test]
fn gap_closed_by_backfilled_page() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    for (seq, text) in [(1, "a"), (2, "b"), (3, "c")] {
        engine.ingest(chunk("s-1", 1, seq, text));
    }
    let directives = engine.ingest(chunk("s-1", 1, 5, "e"));
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 1,
            after_seq: 3,
        }]
    );

    // Backfilled events flow through the same admission path.
    engine.ingest(chunk("s-1", 1, 4, "d"));
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "abcde");
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Synced));

    let directives = engine.handle_backfill_complete("s-1", 3);
    assert!(directives.is_empty());
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Synced));
}

#[test]
fn only_one_backfill_is_armed_per_gap() {
    let (mut engine, _store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    let first = engine.ingest(chunk("s-1", 1, 5, "e"));
    assert_eq!(first.len(), 1);
    let second = engine.ingest(chunk("s-1", 1, 7, "g"));
    assert!(second.is_empty());
    assert_eq!(engine.pending_len("s-1"), 2);
}

#[test]
fn backfill_without_progress_does_not_rearm() {
    let (mut engine, _store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 5, "e"));

    // Server had nothing new; waiting on live traffic avoids a fetch loop.
    let directives = engine.handle_backfill_complete("s-1", 1);
    assert!(directives.is_empty());
    assert_eq!(engine.status("s-1"), Some(SyncStatus::GapPending));
}

#[test]
fn backfill_with_progress_and_residual_gap_rearms() {
    let (mut engine, _store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 5, "e"));
    engine.ingest(chunk("s-1", 1, 2, "b")); // applied, gap 3..=4 remains

    let directives = engine.handle_backfill_complete("s-1", 1);
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 1,
            after_seq: 2,
        }]
    );
}

#[test]
fn stale_revision_events_are_dropped() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 2, 1, "new"));
    let before = store.dispatch_count();
    let directives = engine.ingest(chunk("s-1", 1, 9, "old"));

    assert!(directives.is_empty());
    assert_eq!(store.dispatch_count(), before);
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "new");
}

#[test]
fn newer_revision_resets_the_session_view() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 2, "b"));

    let directives = engine.ingest(chunk("s-1", 2, 5, "z"));
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 2,
            after_seq: 0,
        }]
    );
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Resetting));

    let record = store.snapshot("s-1").expect("session exists");
    assert!(record.assistant_text.is_empty());
    assert_eq!(record.revision, Some(2));
    assert_eq!(record.resets, 1);

    // The trigger is replayed once the backfill fills in 1..=4.
    for (seq, text) in [(1, "v"), (2, "w"), (3, "x"), (4, "y")] {
        engine.ingest(chunk("s-1", 2, seq, text));
    }
    engine.handle_backfill_complete("s-1", 0);
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "vwxyz");
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Synced));
}

#[test]
fn pending_overflow_forces_full_reset() {
    let config = SyncConfig::default().with_pending_buffer_capacity(2);
    let (mut engine, store) = engine_with_store(config);

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 10, "j"));
    engine.ingest(chunk("s-1", 1, 11, "k"));
    let directives = engine.ingest(chunk("s-1", 1, 12, "l"));

    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 1,
            after_seq: 0,
        }]
    );
    assert_eq!(engine.status("s-1"), Some(SyncStatus::Resetting));
    let record = store.snapshot("s-1").expect("session exists");
    assert!(record.assistant_text.is_empty());
    assert_eq!(record.resets, 1);
    // The overflowing event survives into the rebuilt buffer.
    assert_eq!(engine.pending_len("s-1"), 1);
}

#[test]
fn first_connect_bootstraps_and_reconnect_resumes_from_cursor() {
    let (mut engine, _store) = engine_with_store(SyncConfig::default());
    engine.subscribe("s-1");

    // With no cursor yet, the connect-time backfill bootstraps at
    // revision 0; the server's first page corrects the revision.
    let (reconnect, directives) = engine.on_connect();
    assert!(!reconnect);
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 0,
            after_seq: 0,
        }]
    );

    engine.handle_backfill_complete("s-1", 0);
    for seq in 1..=7 {
        engine.ingest(chunk("s-1", 1, seq, "x"));
    }
    engine.on_disconnect("socket closed");

    let (reconnect, directives) = engine.on_connect();
    assert!(reconnect);
    assert_eq!(
        directives,
        vec![SyncDirective::StartBackfill {
            session_id: "s-1".to_string(),
            revision: 1,
            after_seq: 7,
        }]
    );
}

#[test]
fn disconnect_detaches_attached_sessions() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());
    engine.subscribe("s-1");
    engine.on_attached("s-1", &session_sync::SessionAttachment::default());
    assert!(store.snapshot("s-1").unwrap().attached);

    engine.on_disconnect("socket closed");
    let record = store.snapshot("s-1").expect("session exists");
    assert!(!record.attached);
    assert_eq!(record.detach_reason.as_deref(), Some("transport_disconnect"));
}

#[test]
fn unsubscribe_discards_state_and_cancels_backfill() {
    let (mut engine, _store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 3, "c"));

    let directives = engine.unsubscribe("s-1");
    assert_eq!(
        directives,
        vec![SyncDirective::CancelBackfill {
            session_id: "s-1".to_string(),
        }]
    );
    assert!(!engine.is_subscribed("s-1"));
    assert_eq!(engine.pending_len("s-1"), 0);
    assert!(engine.unsubscribe("s-1").is_empty());
}

#[test]
fn mismatch_degrade_flushes_what_it_can() {
    let (mut engine, store) = engine_with_store(SyncConfig::default());

    engine.ingest(chunk("s-1", 1, 1, "a"));
    engine.ingest(chunk("s-1", 1, 3, "c"));
    engine.ingest(chunk("s-1", 1, 2, "b"));
    engine.ingest(chunk("s-1", 1, 6, "f"));

    engine.degrade_after_mismatch("s-1");
    assert_eq!(store.snapshot("s-1").unwrap().assistant_text, "abc");
    assert_eq!(engine.status("s-1"), Some(SyncStatus::GapPending));
}
