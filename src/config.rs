/// Default bound on buffered out-of-order events per session.
pub const DEFAULT_PENDING_BUFFER_CAPACITY: usize = 1000;
/// Default bound on consecutive revision-mismatch resets per backfill.
pub const DEFAULT_REVISION_MISMATCH_RETRY_LIMIT: u32 = 3;
/// Default page size requested during backfill.
pub const DEFAULT_BACKFILL_PAGE_LIMIT: u32 = 200;

/// Tunables for the synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-session pending buffer capacity; overflow forces a full reset.
    pub pending_buffer_capacity: usize,
    /// How many times a backfill may chase a moving server revision before
    /// giving up and applying whatever is already buffered.
    pub revision_mismatch_retry_limit: u32,
    /// Maximum events requested per backfill page.
    pub backfill_page_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pending_buffer_capacity: DEFAULT_PENDING_BUFFER_CAPACITY,
            revision_mismatch_retry_limit: DEFAULT_REVISION_MISMATCH_RETRY_LIMIT,
            backfill_page_limit: DEFAULT_BACKFILL_PAGE_LIMIT,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_buffer_capacity(mut self, capacity: usize) -> Self {
        self.pending_buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_revision_mismatch_retry_limit(mut self, limit: u32) -> Self {
        self.revision_mismatch_retry_limit = limit;
        self
    }

    pub fn with_backfill_page_limit(mut self, limit: u32) -> Self {
        self.backfill_page_limit = limit.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::SyncConfig;

    #[test]
    fn defaults_match_reference_constants() {
        let config = SyncConfig::default();
        assert_eq!(config.pending_buffer_capacity, 1000);
        assert_eq!(config.revision_mismatch_retry_limit, 3);
        assert_eq!(config.backfill_page_limit, 200);
    }

    #[test]
    fn capacity_and_limit_are_clamped_to_at_least_one() {
        let config = SyncConfig::new()
            .with_pending_buffer_capacity(0)
            .with_backfill_page_limit(0);
        assert_eq!(config.pending_buffer_capacity, 1);
        assert_eq!(config.backfill_page_limit, 1);
    }
}
