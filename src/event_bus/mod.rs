//! State propagation: sequenced lifecycle events with replay and
//! cross-context mirroring.
//!
//! The module is organised around [`PropagationBus`] (sequencing, sink
//! fan-out, subscriber broadcast, bounded replay) and [`SharedEventLog`]
//! (the durable channel multiple execution contexts mirror into).

pub mod bus;
pub mod event;
pub mod replay;
pub mod shared;
pub mod sink;

pub use bus::{EventStream, PropagationBus, PublishError};
pub use event::{EventEnvelope, LifecycleEvent};
pub use replay::{DEFAULT_REPLAY_CAPACITY, ReplayLog};
pub use shared::SharedEventLog;
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
