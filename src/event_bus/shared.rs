//! Shared durable channel for cross-context propagation.
//!
//! Multiple execution contexts of the same logical account (for example, two
//! open sessions each running their own [`PropagationBus`]) stay consistent
//! by mirroring every publish into one [`SharedEventLog`]. The log owns the
//! sequence counter, so envelopes from all attached contexts interleave into
//! a single monotonic stream; any context can resynchronize via
//! [`since`](SharedEventLog::since) or follow live via
//! [`subscribe`](SharedEventLog::subscribe).
//!
//! [`PropagationBus`]: super::PropagationBus

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::event::EventEnvelope;

/// Append-only, sequence-keyed store shared between execution contexts.
#[derive(Debug)]
pub struct SharedEventLog {
    entries: Mutex<VecDeque<EventEnvelope>>,
    capacity: usize,
    sequence: AtomicU64,
    notify: broadcast::Sender<EventEnvelope>,
}

impl SharedEventLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (notify, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            sequence: AtomicU64::new(0),
            notify,
        }
    }

    /// Hand out the next sequence number. Contexts attached to the same log
    /// share this counter, which is what makes the merged stream monotonic.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mirror an already-sequenced envelope into the shared log and notify
    /// live followers in other contexts.
    pub(crate) fn mirror(&self, envelope: &EventEnvelope) {
        {
            let mut entries = self.entries.lock().expect("shared log poisoned");
            entries.push_back(envelope.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        // No followers is fine; contexts may attach later and replay.
        let _ = self.notify.send(envelope.clone());
    }

    /// All retained envelopes with sequence strictly greater than `sequence`.
    #[must_use]
    pub fn since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.entries
            .lock()
            .expect("shared log poisoned")
            .iter()
            .filter(|e| e.sequence > sequence)
            .cloned()
            .collect()
    }

    /// Follow the merged stream live. Each receiver sees envelopes from all
    /// attached contexts in sequence order.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.notify.subscribe()
    }

    /// Highest sequence handed out so far.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("shared log poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
