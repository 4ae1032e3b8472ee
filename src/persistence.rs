/*!
Persistence primitives for serializing/deserializing engine state: workflow
definitions, bounded execution history, scheduled-transaction records, and
the propagation bus's replay buffer, each as an independent collection.

Design Goals:
- Provide explicit serde-friendly structs decoupled from internal in-memory
  representations.
- Keep conversion logic localized (From / TryFrom impls) so callers stay
  lean and declarative.
- Reject unreadable data loudly: a step whose kind cannot be decoded or a
  timestamp that does not parse is an error, never a guess.

Conversions perform no I/O; the [`EngineArchive`] save/load helpers are the
only functions that touch the filesystem.
*/

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::conditions::Conditions;
use crate::engine::Execution;
use crate::event_bus::{EventEnvelope, LifecycleEvent};
use crate::scheduled::ScheduledTransaction;
use crate::step::{Step, StepRecord};
use crate::types::{ExecutionStatus, Frequency, ScheduleAnchor, StepKind, StepStatus, TransactionKind};
use crate::utils::json_ext::JsonSerializable;
use crate::workflow::WorkflowDefinition;

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("unknown step kind: {0}")]
    #[diagnostic(
        code(ledgerflow::persistence::step_kind),
        help("Persisted step kinds must be one of Trigger, Condition, Action.")
    )]
    UnknownStepKind(String),

    #[error("unknown frequency: {0}")]
    #[diagnostic(code(ledgerflow::persistence::frequency))]
    UnknownFrequency(String),

    #[error("invalid timestamp in field '{field}': {value}")]
    #[diagnostic(code(ledgerflow::persistence::timestamp))]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(ledgerflow::persistence::serde),
        help("Ensure the JSON structure matches the Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("archive I/O failed: {source}")]
    #[diagnostic(code(ledgerflow::persistence::io))]
    Io {
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Blanket implementation of JsonSerializable for all suitable types using
/// PersistenceError.
impl<T> JsonSerializable<PersistenceError> for T
where
    T: serde::Serialize + for<'de> serde::de::DeserializeOwned,
{
    fn to_json_string(&self) -> std::result::Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::Serde { source: e })
    }

    fn from_json_str(s: &str) -> std::result::Result<Self, PersistenceError> {
        serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn parse_ts(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

/// Persisted shape of a step template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStep {
    pub id: String,
    /// Kind encoded as a string using StepKind::encode().
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub config: FxHashMap<String, Value>,
}

/// Persisted shape of a per-run step record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStepRecord {
    pub step: PersistedStep,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

/// Persisted shape of a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    #[serde(default)]
    pub steps: Vec<PersistedStep>,
    /// RFC3339 string form (keeps chrono::DateTime out of the serialized shape).
    pub created_at: String,
    #[serde(default)]
    pub last_executed: Option<String>,
    pub execution_count: u64,
    pub success_count: u64,
    pub success_rate: f64,
    #[serde(default)]
    pub next_execution: Option<String>,
}

/// Persisted shape of one execution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedExecution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub steps: Vec<PersistedStepRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Persisted shape of a scheduled transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedSchedule {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub target_account: String,
    /// Frequency encoded as a string using Frequency::encode().
    pub frequency: String,
    #[serde(default)]
    pub anchor: Option<ScheduleAnchor>,
    pub enabled: bool,
    pub next_execution: String,
    #[serde(default)]
    pub last_execution: Option<String>,
    #[serde(default)]
    pub conditions: Option<Conditions>,
    pub created_at: String,
}

/// Persisted shape of a replay-buffer entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedEnvelope {
    pub sequence: u64,
    pub recorded_at: String,
    pub event: LifecycleEvent,
}

/// Full persisted state: independent collections plus the replay buffer
/// keyed by sequence number.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineArchive {
    #[serde(default)]
    pub workflows: Vec<PersistedWorkflow>,
    #[serde(default)]
    pub executions: Vec<PersistedExecution>,
    #[serde(default)]
    pub schedules: Vec<PersistedSchedule>,
    #[serde(default)]
    pub replay: Vec<PersistedEnvelope>,
}

impl EngineArchive {
    /// Write the archive as pretty-printed JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PersistenceError::Serde { source: e })?;
        fs::write(path, json).map_err(|e| PersistenceError::Io { source: e })
    }

    /// Read an archive back from disk.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| PersistenceError::Io { source: e })?;
        serde_json::from_str(&json).map_err(|e| PersistenceError::Serde { source: e })
    }
}

/* ---------- Step conversions ---------- */

impl From<&Step> for PersistedStep {
    fn from(step: &Step) -> Self {
        PersistedStep {
            id: step.id.clone(),
            kind: step.kind.encode().to_string(),
            name: step.name.clone(),
            config: step.config.clone(),
        }
    }
}

impl TryFrom<PersistedStep> for Step {
    type Error = PersistenceError;

    fn try_from(p: PersistedStep) -> Result<Self> {
        let kind = StepKind::decode(&p.kind).ok_or(PersistenceError::UnknownStepKind(p.kind))?;
        Ok(Step {
            id: p.id,
            kind,
            name: p.name,
            config: p.config,
        })
    }
}

impl From<&StepRecord> for PersistedStepRecord {
    fn from(record: &StepRecord) -> Self {
        PersistedStepRecord {
            step: PersistedStep::from(&record.step),
            status: record.status,
            result: record.result.clone(),
        }
    }
}

impl TryFrom<PersistedStepRecord> for StepRecord {
    type Error = PersistenceError;

    fn try_from(p: PersistedStepRecord) -> Result<Self> {
        Ok(StepRecord {
            step: Step::try_from(p.step)?,
            status: p.status,
            result: p.result,
        })
    }
}

/* ---------- WorkflowDefinition conversions ---------- */

impl From<&WorkflowDefinition> for PersistedWorkflow {
    fn from(w: &WorkflowDefinition) -> Self {
        PersistedWorkflow {
            id: w.id.clone(),
            name: w.name.clone(),
            description: w.description.clone(),
            enabled: w.enabled,
            steps: w.steps.iter().map(PersistedStep::from).collect(),
            created_at: format_ts(w.created_at),
            last_executed: w.last_executed.map(format_ts),
            execution_count: w.execution_count,
            success_count: w.success_count,
            success_rate: w.success_rate,
            next_execution: w.next_execution.map(format_ts),
        }
    }
}

impl TryFrom<PersistedWorkflow> for WorkflowDefinition {
    type Error = PersistenceError;

    fn try_from(p: PersistedWorkflow) -> Result<Self> {
        let steps = p
            .steps
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(WorkflowDefinition {
            id: p.id,
            name: p.name,
            description: p.description,
            enabled: p.enabled,
            steps,
            created_at: parse_ts("created_at", &p.created_at)?,
            last_executed: p
                .last_executed
                .as_deref()
                .map(|v| parse_ts("last_executed", v))
                .transpose()?,
            execution_count: p.execution_count,
            success_count: p.success_count,
            success_rate: p.success_rate.clamp(0.0, 100.0),
            next_execution: p
                .next_execution
                .as_deref()
                .map(|v| parse_ts("next_execution", v))
                .transpose()?,
        })
    }
}

/* ---------- Execution conversions ---------- */

impl From<&Execution> for PersistedExecution {
    fn from(e: &Execution) -> Self {
        PersistedExecution {
            id: e.id.clone(),
            workflow_id: e.workflow_id.clone(),
            status: e.status,
            started_at: format_ts(e.started_at),
            finished_at: e.finished_at.map(format_ts),
            steps: e.steps.iter().map(PersistedStepRecord::from).collect(),
            error: e.error.clone(),
        }
    }
}

impl TryFrom<PersistedExecution> for Execution {
    type Error = PersistenceError;

    fn try_from(p: PersistedExecution) -> Result<Self> {
        let steps = p
            .steps
            .into_iter()
            .map(StepRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Execution {
            id: p.id,
            workflow_id: p.workflow_id,
            status: p.status,
            started_at: parse_ts("started_at", &p.started_at)?,
            finished_at: p
                .finished_at
                .as_deref()
                .map(|v| parse_ts("finished_at", v))
                .transpose()?,
            steps,
            error: p.error,
        })
    }
}

/* ---------- ScheduledTransaction conversions ---------- */

impl From<&ScheduledTransaction> for PersistedSchedule {
    fn from(s: &ScheduledTransaction) -> Self {
        PersistedSchedule {
            id: s.id.clone(),
            user_id: s.user_id.clone(),
            kind: s.kind,
            amount: s.amount,
            currency: s.currency.clone(),
            target_account: s.target_account.clone(),
            frequency: s.frequency.encode().to_string(),
            anchor: s.anchor,
            enabled: s.enabled,
            next_execution: format_ts(s.next_execution),
            last_execution: s.last_execution.map(format_ts),
            conditions: s.conditions,
            created_at: format_ts(s.created_at),
        }
    }
}

impl TryFrom<PersistedSchedule> for ScheduledTransaction {
    type Error = PersistenceError;

    fn try_from(p: PersistedSchedule) -> Result<Self> {
        let frequency = Frequency::decode(&p.frequency)
            .ok_or(PersistenceError::UnknownFrequency(p.frequency))?;
        Ok(ScheduledTransaction {
            id: p.id,
            user_id: p.user_id,
            kind: p.kind,
            amount: p.amount,
            currency: p.currency,
            target_account: p.target_account,
            frequency,
            anchor: p.anchor,
            enabled: p.enabled,
            next_execution: parse_ts("next_execution", &p.next_execution)?,
            last_execution: p
                .last_execution
                .as_deref()
                .map(|v| parse_ts("last_execution", v))
                .transpose()?,
            conditions: p.conditions,
            created_at: parse_ts("created_at", &p.created_at)?,
        })
    }
}

/* ---------- EventEnvelope conversions ---------- */

impl From<&EventEnvelope> for PersistedEnvelope {
    fn from(e: &EventEnvelope) -> Self {
        PersistedEnvelope {
            sequence: e.sequence,
            recorded_at: format_ts(e.recorded_at),
            event: e.event.clone(),
        }
    }
}

impl TryFrom<PersistedEnvelope> for EventEnvelope {
    type Error = PersistenceError;

    fn try_from(p: PersistedEnvelope) -> Result<Self> {
        Ok(EventEnvelope {
            sequence: p.sequence,
            recorded_at: parse_ts("recorded_at", &p.recorded_at)?,
            event: p.event,
        })
    }
}
