use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{ExecutionId, ScheduleId, StepId, StepStatus, WorkflowId};

/// Workflow lifecycle event, prior to sequencing.
///
/// Events are published by the store (definition changes), the engine
/// (execution transitions), and the schedule runner. The bus wraps each one
/// in an [`EventEnvelope`] carrying the sequence number and wall-clock
/// timestamp observers use for ordering, replay, and deduplication.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LifecycleEvent {
    WorkflowCreated {
        workflow_id: WorkflowId,
    },
    WorkflowUpdated {
        workflow_id: WorkflowId,
    },
    WorkflowDeleted {
        workflow_id: WorkflowId,
    },
    ExecutionStarted {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    },
    StepCompleted {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
        step_id: StepId,
        status: StepStatus,
    },
    ExecutionCompleted {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    },
    ExecutionFailed {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
        error: String,
    },
    ExecutionSkipped {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
        reason: String,
    },
    ExecutionCancelled {
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    },
    ScheduleExecuted {
        schedule_id: ScheduleId,
        transaction_id: String,
    },
    ScheduleSkipped {
        schedule_id: ScheduleId,
        reason: String,
    },
    ScheduleFailed {
        schedule_id: ScheduleId,
        error: String,
    },
}

impl LifecycleEvent {
    /// Stable label identifying the event variant.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleEvent::WorkflowCreated { .. } => "workflow_created",
            LifecycleEvent::WorkflowUpdated { .. } => "workflow_updated",
            LifecycleEvent::WorkflowDeleted { .. } => "workflow_deleted",
            LifecycleEvent::ExecutionStarted { .. } => "execution_started",
            LifecycleEvent::StepCompleted { .. } => "step_completed",
            LifecycleEvent::ExecutionCompleted { .. } => "execution_completed",
            LifecycleEvent::ExecutionFailed { .. } => "execution_failed",
            LifecycleEvent::ExecutionSkipped { .. } => "execution_skipped",
            LifecycleEvent::ExecutionCancelled { .. } => "execution_cancelled",
            LifecycleEvent::ScheduleExecuted { .. } => "schedule_executed",
            LifecycleEvent::ScheduleSkipped { .. } => "schedule_skipped",
            LifecycleEvent::ScheduleFailed { .. } => "schedule_failed",
        }
    }

    /// The workflow this event concerns, when it concerns one.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            LifecycleEvent::WorkflowCreated { workflow_id }
            | LifecycleEvent::WorkflowUpdated { workflow_id }
            | LifecycleEvent::WorkflowDeleted { workflow_id }
            | LifecycleEvent::ExecutionStarted { workflow_id, .. }
            | LifecycleEvent::StepCompleted { workflow_id, .. }
            | LifecycleEvent::ExecutionCompleted { workflow_id, .. }
            | LifecycleEvent::ExecutionFailed { workflow_id, .. }
            | LifecycleEvent::ExecutionSkipped { workflow_id, .. }
            | LifecycleEvent::ExecutionCancelled { workflow_id, .. } => Some(workflow_id),
            _ => None,
        }
    }

    /// The execution this event concerns, when it concerns one.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            LifecycleEvent::ExecutionStarted { execution_id, .. }
            | LifecycleEvent::StepCompleted { execution_id, .. }
            | LifecycleEvent::ExecutionCompleted { execution_id, .. }
            | LifecycleEvent::ExecutionFailed { execution_id, .. }
            | LifecycleEvent::ExecutionSkipped { execution_id, .. }
            | LifecycleEvent::ExecutionCancelled { execution_id, .. } => Some(execution_id),
            _ => None,
        }
    }

    /// The scheduled transaction this event concerns, when it concerns one.
    #[must_use]
    pub fn schedule_id(&self) -> Option<&str> {
        match self {
            LifecycleEvent::ScheduleExecuted { schedule_id, .. }
            | LifecycleEvent::ScheduleSkipped { schedule_id, .. }
            | LifecycleEvent::ScheduleFailed { schedule_id, .. } => Some(schedule_id),
            _ => None,
        }
    }
}

/// A sequenced, timestamped lifecycle event as delivered to observers.
///
/// Sequence numbers increase monotonically per bus (per shared log when a
/// bus mirrors to one), so observers can deduplicate at-least-once delivery
/// on `(workflow_id, sequence)` and resynchronize with
/// [`replay_since`](crate::event_bus::PropagationBus::replay_since).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: LifecycleEvent,
}

impl EventEnvelope {
    /// Identity observers use to drop duplicate deliveries.
    #[must_use]
    pub fn dedup_key(&self) -> (Option<&str>, u64) {
        (self.event.workflow_id(), self.sequence)
    }

    /// Convert the envelope to a structured JSON value with a normalized
    /// schema:
    ///
    /// ```json
    /// {
    ///   "sequence": 7,
    ///   "recorded_at": "2025-11-03T12:34:56.789Z",
    ///   "kind": "execution_started",
    ///   "event": { /* variant fields */ }
    /// }
    /// ```
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        json!({
            "sequence": self.sequence,
            "recorded_at": self.recorded_at.to_rfc3339(),
            "kind": self.event.label(),
            "event": serde_json::to_value(&self.event).unwrap_or(Value::Null),
        })
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.event.workflow_id(), self.event.schedule_id()) {
            (Some(wf), _) => write!(f, "[#{} {}] {}", self.sequence, self.event.label(), wf),
            (None, Some(sched)) => {
                write!(f, "[#{} {}] {}", self.sequence, self.event.label(), sched)
            }
            (None, None) => write!(f, "[#{}] {}", self.sequence, self.event.label()),
        }
    }
}
