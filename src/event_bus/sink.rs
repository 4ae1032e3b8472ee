use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::event::EventEnvelope;
use crate::telemetry::{PlainFormatter, TelemetryFormatter};

/// Abstraction over an output target that consumes full event envelopes.
pub trait EventSink: Sync + Send {
    /// Handle a sequenced event. Sink decides how to serialize/format it.
    fn handle(&mut self, envelope: &EventEnvelope) -> IoResult<()>;
}

/// Stdout sink with optional formatting.
pub struct StdOutSink<F: TelemetryFormatter = PlainFormatter> {
    handle: Stdout,
    formatter: F,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
            formatter: PlainFormatter::new(),
        }
    }
}

impl<F: TelemetryFormatter> StdOutSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            handle: io::stdout(),
            formatter,
        }
    }
}

impl<F: TelemetryFormatter> EventSink for StdOutSink<F> {
    fn handle(&mut self, envelope: &EventEnvelope) -> IoResult<()> {
        let rendered = self.formatter.render_envelope(envelope).join_lines();
        self.handle.write_all(rendered.as_bytes())?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured envelopes.
    pub fn snapshot(&self) -> Vec<EventEnvelope> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured envelopes.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, envelope: &EventEnvelope) -> IoResult<()> {
        self.entries.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers.
///
/// Envelopes are forwarded to a tokio mpsc channel without blocking. Useful
/// for dashboards, SSE endpoints, or live logging.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, envelope: &EventEnvelope) -> IoResult<()> {
        self.tx
            .send(envelope.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
