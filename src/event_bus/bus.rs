use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::stream;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::timeout;

use super::event::{EventEnvelope, LifecycleEvent};
use super::replay::{DEFAULT_REPLAY_CAPACITY, ReplayLog};
use super::shared::SharedEventLog;
use super::sink::{EventSink, StdOutSink};

const BROADCAST_CAPACITY: usize = 1024;

/// Errors that can occur when publishing an event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("propagation bus closed")]
    Closed,
}

/// The state propagation bus: sequencing, replay, sink fan-out, and
/// subscriber broadcast for workflow lifecycle events.
///
/// Every [`publish`](Self::publish) stamps a monotonically increasing
/// sequence number and wall-clock timestamp, appends the envelope to the
/// bounded replay log, mirrors it to the shared cross-context log when one
/// is attached, and delivers it to sinks (via a background listener task)
/// and to live subscribers (order-preserving per subscriber).
///
/// Delivery to subscribers is at-least-once: a lagged subscriber is told how
/// many envelopes it missed and can recover them through
/// [`replay_since`](Self::replay_since), deduplicating on
/// `(workflow_id, sequence)`.
///
/// # Example
///
/// ```rust,no_run
/// use ledgerflow::event_bus::{LifecycleEvent, MemorySink, PropagationBus};
///
/// # async fn example() {
/// let bus = PropagationBus::with_sink(MemorySink::new());
/// bus.listen_for_events();
///
/// bus.publish(LifecycleEvent::WorkflowCreated {
///     workflow_id: "wf-1".into(),
/// })
/// .unwrap();
///
/// // A late joiner replays everything it missed.
/// let missed = bus.replay_since(0);
/// assert_eq!(missed.len(), 1);
/// # }
/// ```
pub struct PropagationBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    fanout: (flume::Sender<EventEnvelope>, flume::Receiver<EventEnvelope>),
    listener: Arc<Mutex<Option<ListenerState>>>,
    broadcast: broadcast::Sender<EventEnvelope>,
    replay: Mutex<ReplayLog>,
    shared: Option<Arc<SharedEventLog>>,
    sequence: AtomicU64,
    dropped_events: Arc<AtomicUsize>,
}

impl Default for PropagationBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl PropagationBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create a bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let (broadcast, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            fanout: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
            broadcast,
            replay: Mutex::new(ReplayLog::new(DEFAULT_REPLAY_CAPACITY)),
            shared: None,
            sequence: AtomicU64::new(0),
            dropped_events: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the replay log capacity (envelopes retained for late joiners).
    #[must_use]
    pub fn with_replay_capacity(self, capacity: usize) -> Self {
        *self.replay.lock().expect("replay log poisoned") = ReplayLog::new(capacity);
        self
    }

    /// Attach a shared cross-context log. Sequencing moves to the shared
    /// counter so envelopes from every attached context form one monotonic
    /// stream.
    #[must_use]
    pub fn with_shared_log(mut self, shared: Arc<SharedEventLog>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Dynamically add a sink (useful for per-session streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().expect("sinks poisoned").push(Box::new(sink));
    }

    /// Stamp, record, mirror, and deliver a lifecycle event.
    ///
    /// Returns the sequenced envelope so callers can log or chain on it.
    pub fn publish(&self, event: LifecycleEvent) -> Result<EventEnvelope, PublishError> {
        let sequence = match &self.shared {
            Some(shared) => shared.next_sequence(),
            None => self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        let envelope = EventEnvelope {
            sequence,
            recorded_at: Utc::now(),
            event,
        };

        self.replay
            .lock()
            .expect("replay log poisoned")
            .append(envelope.clone());
        if let Some(shared) = &self.shared {
            shared.mirror(&envelope);
        }
        // No live subscribers is fine; the replay log covers late joiners.
        let _ = self.broadcast.send(envelope.clone());
        self.fanout
            .0
            .send(envelope.clone())
            .map_err(|_| PublishError::Closed)?;
        Ok(envelope)
    }

    /// Subscribe to live delivery. Per-subscriber order follows publish
    /// order; dropping the stream unsubscribes.
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            receiver: self.broadcast.subscribe(),
            dropped: Arc::clone(&self.dropped_events),
        }
    }

    /// Retained envelopes with sequence strictly greater than `sequence`,
    /// in order: the resynchronization path for late-joining observers.
    #[must_use]
    pub fn replay_since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.replay
            .lock()
            .expect("replay log poisoned")
            .since(sequence)
    }

    /// Record how far a named subscriber has caught up; the replay log will
    /// not trim past the slowest checkpoint.
    pub fn register_checkpoint(&self, subscriber: impl Into<String>, sequence: u64) {
        self.replay
            .lock()
            .expect("replay log poisoned")
            .register_checkpoint(subscriber, sequence);
    }

    /// Drop a subscriber's checkpoint, releasing its trim pin.
    pub fn remove_checkpoint(&self, subscriber: &str) {
        self.replay
            .lock()
            .expect("replay log poisoned")
            .remove_checkpoint(subscriber);
    }

    /// Highest sequence stamped so far on this bus (or its shared log).
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        match &self.shared {
            Some(shared) => shared.last_sequence(),
            None => self.sequence.load(Ordering::SeqCst),
        }
    }

    /// Envelopes subscribers have missed through lag, in total.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Spawn a background task that forwards published envelopes to all
    /// sinks. Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return; // Already listening
        }

        let receiver = self.fanout.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(envelope) => {
                            let mut sinks_guard = sinks.lock().expect("sinks poisoned");
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&envelope) {
                                    tracing::warn!(error = %e, "event sink error");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for PropagationBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Live subscription handle. Order-preserving; dropping it unsubscribes.
#[derive(Debug)]
pub struct EventStream {
    receiver: broadcast::Receiver<EventEnvelope>,
    dropped: Arc<AtomicUsize>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Result<EventEnvelope, broadcast::error::RecvError> {
        match self.receiver.recv().await {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                self.dropped.fetch_add(missed as usize, Ordering::Relaxed);
                Err(broadcast::error::RecvError::Lagged(missed))
            }
            Err(err) => Err(err),
        }
    }

    pub fn try_recv(&mut self) -> Result<EventEnvelope, broadcast::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(envelope) => Ok(envelope),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                self.dropped.fetch_add(missed as usize, Ordering::Relaxed);
                Err(broadcast::error::TryRecvError::Lagged(missed))
            }
            Err(err) => Err(err),
        }
    }

    pub fn into_inner(self) -> broadcast::Receiver<EventEnvelope> {
        self.receiver
    }

    /// Adapt the stream for `futures_util` consumers; lagged gaps are
    /// skipped (recover them through replay).
    pub fn into_async_stream(self) -> impl futures_util::stream::Stream<Item = EventEnvelope> {
        stream::unfold(self, |mut stream| async move {
            loop {
                match stream.recv().await {
                    Ok(envelope) => return Some((envelope, stream)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Next envelope, or `None` on timeout or bus shutdown.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<EventEnvelope> {
        loop {
            match timeout(duration, self.recv()).await {
                Ok(Ok(envelope)) => return Some(envelope),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return None,
            }
        }
    }
}
