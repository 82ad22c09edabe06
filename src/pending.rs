use std::collections::BTreeMap;

use session_wire::SessionEvent;

/// Outcome of offering an event to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An event with this seq is already buffered.
    Duplicate,
    /// The buffer is full. The caller must treat this as unrecoverable
    /// drift and reset the session; nothing was inserted.
    Overflow,
}

/// Bounded, seq-ordered parking lot for events that arrived ahead of the
/// cursor. Holds events for a single revision; a revision reset clears it.
#[derive(Debug, Clone)]
pub struct PendingBuffer {
    buffered: BTreeMap<u64, SessionEvent>,
    capacity: usize,
}

impl PendingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffered: BTreeMap::new(),
            capacity,
        }
    }

    pub fn insert(&mut self, event: SessionEvent) -> InsertOutcome {
        if self.buffered.contains_key(&event.seq) {
            return InsertOutcome::Duplicate;
        }
        if self.buffered.len() >= self.capacity {
            return InsertOutcome::Overflow;
        }
        self.buffered.insert(event.seq, event);
        InsertOutcome::Inserted
    }

    /// Remove and return the event at exactly `seq`, if buffered.
    pub fn take_next(&mut self, seq: u64) -> Option<SessionEvent> {
        self.buffered.remove(&seq)
    }

    /// Drop everything at or below `seq`; those events are already applied.
    pub fn discard_through(&mut self, seq: u64) {
        self.buffered = self.buffered.split_off(&(seq + 1));
    }

    pub fn clear(&mut self) {
        self.buffered.clear();
    }

    pub fn len(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered.is_empty()
    }

    /// Lowest buffered seq, for gap diagnostics.
    pub fn lowest_seq(&self) -> Option<u64> {
        self.buffered.keys().next().copied()
    }
}
