//! Runtime configuration with environment resolution.

use std::time::Duration;

use crate::engine::DEFAULT_HISTORY_LIMIT;
use crate::event_bus::{DEFAULT_REPLAY_CAPACITY, MemorySink, PropagationBus, StdOutSink};
use crate::scheduler::DEFAULT_SCAN_INTERVAL;

/// Top-level configuration for an [`AutomationRuntime`](crate::runtime::AutomationRuntime).
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// The logical account the engine operates for.
    pub account_id: String,
    /// Fixed interval of the scheduler loop's due-job scan.
    pub scan_interval: Duration,
    /// Executions retained in the engine's ledger.
    pub execution_history_limit: usize,
    pub event_bus: EventBusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            account_id: Self::resolve_account_id(None),
            scan_interval: DEFAULT_SCAN_INTERVAL,
            execution_history_limit: DEFAULT_HISTORY_LIMIT,
            event_bus: EventBusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    fn resolve_account_id(provided: Option<String>) -> String {
        if let Some(account_id) = provided {
            return account_id;
        }
        dotenvy::dotenv().ok();
        std::env::var("LEDGERFLOW_ACCOUNT_ID").unwrap_or_else(|_| "primary".to_string())
    }

    pub fn new(account_id: Option<String>) -> Self {
        Self {
            account_id: Self::resolve_account_id(account_id),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    #[must_use]
    pub fn with_execution_history_limit(mut self, limit: usize) -> Self {
        self.execution_history_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_memory_event_bus(self) -> Self {
        self.with_event_bus(EventBusConfig::with_memory_sink())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Event-bus construction settings.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    /// Envelopes retained in the replay buffer for late joiners.
    pub replay_capacity: usize,
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn new(replay_capacity: usize, sinks: Vec<SinkConfig>) -> Self {
        Self {
            replay_capacity: if replay_capacity == 0 {
                DEFAULT_REPLAY_CAPACITY
            } else {
                replay_capacity
            },
            sinks,
        }
    }

    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self::new(DEFAULT_REPLAY_CAPACITY, vec![SinkConfig::StdOut])
    }

    #[must_use]
    pub fn with_memory_sink() -> Self {
        Self::new(
            DEFAULT_REPLAY_CAPACITY,
            vec![SinkConfig::StdOut, SinkConfig::Memory],
        )
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    /// Build a bus from this configuration. The listener task is not
    /// started; callers decide when fan-out begins.
    #[must_use]
    pub fn build_bus(&self) -> PropagationBus {
        let bus = PropagationBus::with_sinks(vec![]).with_replay_capacity(self.replay_capacity);
        for sink in &self.sinks {
            match sink {
                SinkConfig::StdOut => bus.add_sink(StdOutSink::default()),
                SinkConfig::Memory => bus.add_sink(MemorySink::new()),
            }
        }
        bus
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}
