//! Step templates and per-run step records.
//!
//! A [`Step`] is an immutable template on a workflow definition: a kind, a
//! name, and a kind-specific configuration map. Executions never mutate the
//! template; each run takes a [`StepRecord`] copy so concurrent and
//! historical runs never share mutable state.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{StepId, StepKind, StepStatus, new_id};

/// Immutable step template declared on a workflow definition.
///
/// The configuration map's schema depends on [`StepKind`]:
///
/// - Trigger: optional `"schedule"` object (`frequency`, `day_of_week`,
///   `day_of_month`) describing a recurrence.
/// - Condition: optional `"min_balance"`, `"max_balance"`,
///   `"profit_threshold"` numbers.
/// - Action: `"operation"` (`"deposit"`, `"withdrawal"`, `"notification"`),
///   `"amount"`, `"account_id"`, `"message"`.
///
/// # Examples
///
/// ```rust
/// use ledgerflow::step::Step;
/// use ledgerflow::types::StepKind;
/// use serde_json::json;
///
/// let step = Step::action("top up")
///     .with_config_entry("operation", json!("deposit"))
///     .with_config_entry("amount", json!(50.0))
///     .with_config_entry("account_id", json!("acct-1"));
///
/// assert_eq!(step.kind, StepKind::Action);
/// assert_eq!(step.config_f64("amount"), Some(50.0));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub kind: StepKind,
    pub name: String,
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
}

impl Step {
    /// General constructor; prefer the kind-specific conveniences below.
    pub fn new(kind: StepKind, name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind,
            name: name.into(),
            config: FxHashMap::default(),
        }
    }

    pub fn trigger(name: impl Into<String>) -> Self {
        Self::new(StepKind::Trigger, name)
    }

    pub fn condition(name: impl Into<String>) -> Self {
        Self::new(StepKind::Condition, name)
    }

    pub fn action(name: impl Into<String>) -> Self {
        Self::new(StepKind::Action, name)
    }

    /// Replace the whole configuration map.
    #[must_use]
    pub fn with_config(mut self, config: FxHashMap<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Insert a single configuration entry.
    #[must_use]
    pub fn with_config_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// String-typed config accessor.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Number-typed config accessor.
    #[must_use]
    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(Value::as_f64)
    }
}

/// Per-run copy of a step, carrying resolved status and result.
///
/// Created from the template at execution start with status `Pending`; the
/// engine drives it through the monotonic transition chain and attaches the
/// result payload (trigger payload, gateway transaction, gate reason).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl StepRecord {
    /// Snapshot a template into its initial per-run record.
    #[must_use]
    pub fn from_template(step: &Step) -> Self {
        Self {
            step: step.clone(),
            status: StepStatus::Pending,
            result: None,
        }
    }

    /// Advance the record's status, enforcing monotonicity.
    ///
    /// Illegal transitions are a programming error in the engine, not a
    /// recoverable runtime condition, so this is debug-asserted rather than
    /// surfaced as a `Result`.
    pub fn transition(&mut self, next: StepStatus) {
        debug_assert!(
            self.status.can_transition(next),
            "illegal step transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Mark the step completed with an optional result payload.
    pub fn complete(&mut self, result: Option<Value>) {
        self.transition(StepStatus::Completed);
        self.result = result;
    }

    /// Mark the step failed, recording the reason as its result.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.transition(StepStatus::Failed);
        self.result = Some(Value::String(reason.into()));
    }
}
