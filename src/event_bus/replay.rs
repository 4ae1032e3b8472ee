//! Bounded, sequence-keyed replay buffer backing the propagation bus.
//!
//! The log retains the most recent envelopes so a late-joining observer can
//! resynchronize from its last seen sequence instead of requiring a full
//! state dump. Trimming is the only deletion path, and it never removes
//! entries newer than the oldest registered subscriber checkpoint.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use super::event::EventEnvelope;

pub const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Append-only ring of recent envelopes with checkpoint-aware trimming.
#[derive(Debug, Default)]
pub struct ReplayLog {
    entries: VecDeque<EventEnvelope>,
    capacity: usize,
    /// Last acknowledged sequence per registered subscriber.
    checkpoints: FxHashMap<String, u64>,
}

impl ReplayLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            checkpoints: FxHashMap::default(),
        }
    }

    /// Append an envelope and trim what the capacity and checkpoints allow.
    pub fn append(&mut self, envelope: EventEnvelope) {
        self.entries.push_back(envelope);
        self.trim();
    }

    /// All retained envelopes with sequence strictly greater than `sequence`,
    /// in sequence order.
    #[must_use]
    pub fn since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.entries
            .iter()
            .filter(|e| e.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Record how far a named subscriber has caught up. Entries newer than
    /// the oldest checkpoint are pinned against trimming until that
    /// subscriber advances.
    pub fn register_checkpoint(&mut self, subscriber: impl Into<String>, sequence: u64) {
        self.checkpoints.insert(subscriber.into(), sequence);
        // Advancing a checkpoint may unpin entries.
        self.trim();
    }

    /// Drop a subscriber's checkpoint, releasing its pin.
    pub fn remove_checkpoint(&mut self, subscriber: &str) {
        self.checkpoints.remove(subscriber);
        self.trim();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest retained sequence, if any envelope is retained.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.back().map(|e| e.sequence)
    }

    fn trim(&mut self) {
        let pin = self.checkpoints.values().min().copied();
        while self.entries.len() > self.capacity {
            let front_sequence = match self.entries.front() {
                Some(front) => front.sequence,
                None => break,
            };
            // An entry still ahead of the slowest subscriber stays retained
            // even over capacity; the buffer shrinks back once the
            // checkpoint advances.
            if let Some(pin) = pin
                && front_sequence > pin
            {
                break;
            }
            self.entries.pop_front();
        }
    }
}
