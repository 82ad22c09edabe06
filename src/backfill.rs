use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use events_api::{BackfillSource, CancellationSignal, EventsApiError};
use session_wire::SessionEvent;

/// Outcome of a backfill task, stamped with the generation it belongs to.
/// The runtime drops any message whose generation is no longer current for
/// its session, so results from superseded attempts can never touch state.
#[derive(Debug)]
pub enum BackfillMessage {
    Page {
        session_id: String,
        generation: u64,
        events: Vec<SessionEvent>,
    },
    RevisionMismatch {
        session_id: String,
        generation: u64,
        actual_revision: u64,
    },
    Completed {
        session_id: String,
        generation: u64,
        fetched: u64,
    },
    Failed {
        session_id: String,
        generation: u64,
        error: String,
    },
}

struct ActiveBackfill {
    generation: u64,
    cancellation: CancellationSignal,
    after_seq_at_start: u64,
    mismatch_retries: u32,
    task: JoinHandle<()>,
}

/// Tracks at most one in-flight backfill per session. Starting a new one
/// supersedes the old: the prior task is cancelled and its generation
/// retired, making its remaining messages inert.
pub struct BackfillCoordinator {
    source: Arc<dyn BackfillSource>,
    page_limit: u32,
    messages: UnboundedSender<BackfillMessage>,
    active: HashMap<String, ActiveBackfill>,
    next_generation: u64,
}

impl BackfillCoordinator {
    pub fn new(
        source: Arc<dyn BackfillSource>,
        page_limit: u32,
        messages: UnboundedSender<BackfillMessage>,
    ) -> Self {
        Self {
            source,
            page_limit,
            messages,
            active: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Start (or restart) a backfill for the session, superseding any
    /// in-flight attempt. `mismatch_retries` carries the revision-mismatch
    /// count across restarts of the same recovery.
    pub fn start(&mut self, session_id: &str, revision: u64, after_seq: u64, mismatch_retries: u32) {
        self.cancel(session_id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let cancellation: CancellationSignal = Arc::new(AtomicBool::new(false));

        debug!(
            session_id,
            revision, after_seq, generation, "starting backfill"
        );
        let task = tokio::spawn(run_backfill(
            Arc::clone(&self.source),
            self.messages.clone(),
            session_id.to_string(),
            revision,
            after_seq,
            self.page_limit,
            generation,
            Arc::clone(&cancellation),
        ));
        self.active.insert(
            session_id.to_string(),
            ActiveBackfill {
                generation,
                cancellation,
                after_seq_at_start: after_seq,
                mismatch_retries,
                task,
            },
        );
    }

    /// Cancel the in-flight backfill for the session, if any.
    pub fn cancel(&mut self, session_id: &str) {
        if let Some(active) = self.active.remove(session_id) {
            trace!(
                session_id,
                generation = active.generation,
                "cancelling backfill"
            );
            active.cancellation.store(true, Ordering::Relaxed);
            active.task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        let session_ids: Vec<String> = self.active.keys().cloned().collect();
        for session_id in session_ids {
            self.cancel(&session_id);
        }
    }

    /// Whether `generation` is the live attempt for the session.
    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.active
            .get(session_id)
            .is_some_and(|active| active.generation == generation)
    }

    pub fn after_seq_at_start(&self, session_id: &str) -> u64 {
        self.active
            .get(session_id)
            .map_or(0, |active| active.after_seq_at_start)
    }

    pub fn mismatch_retries(&self, session_id: &str) -> u32 {
        self.active
            .get(session_id)
            .map_or(0, |active| active.mismatch_retries)
    }

    /// Retire the session's attempt once its terminal message is handled.
    pub fn finish(&mut self, session_id: &str, generation: u64) {
        if self.is_current(session_id, generation) {
            self.active.remove(session_id);
        }
    }
}

impl Drop for BackfillCoordinator {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Fetch pages from `after_seq` until the server reports no more, streaming
/// each page back to the runtime. Stops early on cancellation (silently),
/// revision mismatch, or a request error.
#[allow(clippy::too_many_arguments)]
async fn run_backfill(
    source: Arc<dyn BackfillSource>,
    messages: UnboundedSender<BackfillMessage>,
    session_id: String,
    revision: u64,
    after_seq: u64,
    page_limit: u32,
    generation: u64,
    cancellation: CancellationSignal,
) {
    let mut cursor = after_seq;
    let mut fetched = 0u64;
    loop {
        let page = match source
            .fetch_page(
                &session_id,
                revision,
                cursor,
                page_limit,
                &cancellation,
            )
            .await
        {
            Ok(page) => page,
            Err(EventsApiError::Cancelled) => return,
            Err(err) => {
                let _ = messages.send(BackfillMessage::Failed {
                    session_id,
                    generation,
                    error: err.to_string(),
                });
                return;
            }
        };

        if page.revision != revision {
            let _ = messages.send(BackfillMessage::RevisionMismatch {
                session_id,
                generation,
                actual_revision: page.revision,
            });
            return;
        }

        let next_cursor = page.continue_after().unwrap_or(cursor);
        let has_more = page.has_more;
        fetched += page.events.len() as u64;
        if !page.events.is_empty() {
            let _ = messages.send(BackfillMessage::Page {
                session_id: session_id.clone(),
                generation,
                events: page.events,
            });
        }

        if !has_more || next_cursor <= cursor {
            let _ = messages.send(BackfillMessage::Completed {
                session_id,
                generation,
                fetched,
            });
            return;
        }
        cursor = next_cursor;
    }
}
