use serde::{Deserialize, Serialize};

use crate::event::SessionEvent;

/// One page of the paginated backfill endpoint response.
///
/// `revision` is the revision the server served the page from; when it does
/// not match the requested revision the caller must treat the page as a
/// revision-mismatch signal, not as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsPage {
    pub session_id: String,
    pub revision: u64,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub next_after_seq: Option<u64>,
    #[serde(default)]
    pub has_more: bool,
}

impl EventsPage {
    /// Cursor to continue pagination from: the server hint when present,
    /// otherwise the last event in the page.
    pub fn continue_after(&self) -> Option<u64> {
        self.next_after_seq
            .or_else(|| self.events.last().map(|event| event.seq))
    }
}
