//! Workflow definitions: the authoritative description of an automated
//! financial routine.
//!
//! A [`WorkflowDefinition`] is owned exclusively by the
//! [`WorkflowStore`](crate::store::WorkflowStore); every read returns a
//! clone and every mutation goes through a store API. The
//! [`WorkflowDraft`]/[`WorkflowPatch`] pair describes creation input and
//! partial updates so callers never hand the store a full record with stale
//! counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::Step;
use crate::types::{Frequency, ScheduleAnchor, StepKind, WorkflowId, new_id};

/// A named, ordered sequence of trigger/condition/action steps executed as a
/// unit, together with its execution statistics.
///
/// Statistics semantics:
/// - `execution_count` counts terminal Completed/Failed runs. Skipped and
///   cancelled runs are planned outcomes and do not count.
/// - `success_rate` is recomputed as `success_count / execution_count * 100`
///   after every recorded outcome, so it is bounded to `[0, 100]` by
///   construction and only drops when a run fails.
/// - `next_execution` is present when the first trigger step declares a
///   recurrence; the scheduler loop uses it to find due workflows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub success_count: u64,
    pub success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execution: Option<DateTime<Utc>>,
}

impl WorkflowDefinition {
    /// The recurrence declared by the first trigger step, if any.
    ///
    /// A trigger step opts into scheduling with a `"schedule"` config object:
    /// `{"frequency": "weekly", "day_of_week": "Mon"}`. Workflows without one
    /// only run ad hoc.
    #[must_use]
    pub fn trigger_schedule(&self) -> Option<RecurringSchedule> {
        let trigger = self.steps.iter().find(|s| s.kind == StepKind::Trigger)?;
        let schedule = trigger.config.get("schedule")?;
        RecurringSchedule::from_config(schedule)
    }
}

/// Recurrence parsed out of a trigger step's configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecurringSchedule {
    pub frequency: Frequency,
    pub anchor: ScheduleAnchor,
}

impl RecurringSchedule {
    /// Parse a `"schedule"` config object. Returns `None` when the object is
    /// malformed: a workflow with an unreadable schedule is treated as ad
    /// hoc rather than fired at a guessed cadence.
    #[must_use]
    pub fn from_config(value: &Value) -> Option<Self> {
        let frequency = Frequency::decode(value.get("frequency")?.as_str()?)?;
        let day_of_week = value
            .get("day_of_week")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        let day_of_month = value
            .get("day_of_month")
            .and_then(Value::as_u64)
            .map(|d| d as u32);
        Some(Self {
            frequency,
            anchor: ScheduleAnchor {
                day_of_week,
                day_of_month,
            },
        })
    }
}

/// Creation input for a workflow. The store assigns id, timestamps, and zero
/// counters; callers only describe the workflow itself.
///
/// # Examples
///
/// ```rust
/// use ledgerflow::step::Step;
/// use ledgerflow::workflow::WorkflowDraft;
///
/// let draft = WorkflowDraft::new("monthly sweep")
///     .with_description("move spare cash into savings")
///     .with_step(Step::trigger("on schedule"))
///     .with_step(Step::action("sweep"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct WorkflowDraft {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub steps: Vec<Step>,
}

impl WorkflowDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            enabled: true,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// Materialize the draft into a fresh definition. Store-internal: callers
    /// go through [`WorkflowStore::create`](crate::store::WorkflowStore::create)
    /// so validation and event publication are never bypassed.
    pub(crate) fn into_definition(self, now: DateTime<Utc>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: new_id(),
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            steps: self.steps,
            created_at: now,
            last_executed: None,
            execution_count: 0,
            success_count: 0,
            success_rate: 100.0,
            next_execution: None,
        }
    }
}

/// Partial update applied by [`WorkflowStore::update`](crate::store::WorkflowStore::update).
///
/// Absent fields leave the stored value untouched. Counters and timestamps
/// are never patchable; they belong to the store.
#[derive(Clone, Debug, Default)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub steps: Option<Vec<Step>>,
}

impl WorkflowPatch {
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn replace_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Whether the patch changes anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.enabled.is_none()
            && self.steps.is_none()
    }
}
