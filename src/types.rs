//! Core types for the Ledgerflow automation engine.
//!
//! This module defines the fundamental vocabulary used throughout the system
//! for identifying workflows, classifying steps, and tracking execution
//! outcomes. These are the core domain concepts that define what an automated
//! financial workflow *is*.
//!
//! # Key Types
//!
//! - [`StepKind`]: classifies a workflow step (trigger, condition, action)
//! - [`StepStatus`]: lifecycle of a step within one execution
//! - [`ExecutionStatus`]: terminal and non-terminal states of a run
//! - [`Frequency`] / [`ScheduleAnchor`]: recurrence vocabulary shared by the
//!   schedule calculator and scheduled transactions
//!
//! # Examples
//!
//! ```rust
//! use ledgerflow::types::{StepKind, StepStatus};
//!
//! let kind = StepKind::Action;
//! assert_eq!(kind.encode(), "Action");
//! assert_eq!(StepKind::decode("Action"), Some(StepKind::Action));
//!
//! // Step transitions are monotonic
//! assert!(StepStatus::Pending.can_transition(StepStatus::Running));
//! assert!(!StepStatus::Completed.can_transition(StepStatus::Running));
//! ```

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a workflow definition (uuid v4 string).
pub type WorkflowId = String;

/// Identifier of one concrete execution of a workflow.
pub type ExecutionId = String;

/// Identifier of a scheduled transaction record.
pub type ScheduleId = String;

/// Identifier of a step template within a workflow definition.
pub type StepId = String;

/// Mint a fresh id. All entity ids in the engine share this format.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Classifies the role a step plays within a workflow.
///
/// Steps execute in declared order; their kind determines how the execution
/// engine resolves them:
///
/// - [`Trigger`](Self::Trigger) steps resolve immediately, carrying the
///   trigger payload forward as context. No side effect.
/// - [`Condition`](Self::Condition) steps consult the condition gate; a
///   denial ends the run without further side effects.
/// - [`Action`](Self::Action) steps dispatch an external operation through
///   the bank transfer gateway.
///
/// # Persistence
///
/// `StepKind` supports serialization through both serde and the
/// [`encode`](Self::encode)/[`decode`](Self::decode) string forms used by the
/// archive layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Entry event of the workflow; resolved immediately with the payload.
    Trigger,
    /// Precondition checked against a single account snapshot.
    Condition,
    /// External side effect dispatched through the gateway.
    Action,
}

impl StepKind {
    /// Encode a StepKind into its persisted string form.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use ledgerflow::types::StepKind;
    /// assert_eq!(StepKind::Trigger.encode(), "Trigger");
    /// ```
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            StepKind::Trigger => "Trigger",
            StepKind::Condition => "Condition",
            StepKind::Action => "Action",
        }
    }

    /// Decode a persisted string form back into a StepKind.
    ///
    /// Unknown encodings are rejected rather than guessed: a step whose kind
    /// cannot be identified must not be executed.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "Trigger" => Some(StepKind::Trigger),
            "Condition" => Some(StepKind::Condition),
            "Action" => Some(StepKind::Action),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Lifecycle of a step within one execution.
///
/// Transitions are monotonic: `Pending → Running → {Completed | Failed}`.
/// No other transition is legal; [`can_transition`](Self::can_transition)
/// encodes the rule and the engine asserts it on every status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Whether moving from `self` to `next` is a legal step transition.
    #[must_use]
    pub fn can_transition(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    /// Whether this status is terminal for the step.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one execution of a workflow.
///
/// `Running` is the only non-terminal state. `Skipped` is the terminal state
/// of a run ended by a condition-gate denial: it is a planned outcome, not a
/// failure, and never lowers the workflow's success rate. `Cancelled` is the
/// terminal state of an externally cancelled run; side effects already
/// submitted are not undone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the execution has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Direction of a scheduled money movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deposit => f.write_str("deposit"),
            TransactionKind::Withdrawal => f.write_str("withdrawal"),
        }
    }
}

/// Recurrence cadence for schedules and recurring workflow triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    /// Decode the persisted lowercase form.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "quarterly" => Some(Frequency::Quarterly),
            _ => None,
        }
    }

    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

/// Optional anchor refining where in the period a recurrence fires.
///
/// Weekly schedules use `day_of_week` (defaulting to Monday when absent);
/// monthly and quarterly schedules use `day_of_month`, clamped by the
/// calculator to the target month's last valid day.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAnchor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

impl ScheduleAnchor {
    #[must_use]
    pub fn weekly(day: Weekday) -> Self {
        Self {
            day_of_week: Some(day),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn monthly(day: u32) -> Self {
        Self {
            day_of_month: Some(day),
            ..Default::default()
        }
    }
}
