//! Execution engine: runs a workflow's ordered steps with success/failure
//! tracking.
//!
//! One [`ExecutionEngine`] serves one logical user account. `execute`
//! snapshots the workflow's step templates into a fresh [`Execution`], walks
//! them strictly in declared order, and resolves each according to its kind:
//! trigger steps complete immediately carrying the trigger payload forward,
//! condition steps consult the gate against a single account snapshot, and
//! action steps dispatch through the bank transfer gateway. The engine
//! enforces at-most-one concurrent execution per workflow and publishes a
//! lifecycle event at every major transition.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::conditions::{Conditions, GateDecision};
use crate::event_bus::{LifecycleEvent, PropagationBus};
use crate::gateway::{AccountStateProvider, BankTransferGateway, TransactionStatus};
use crate::step::{Step, StepRecord};
use crate::store::{StoreError, WorkflowStore};
use crate::types::{ExecutionId, ExecutionStatus, StepKind, WorkflowId, new_id};
use crate::workflow::WorkflowDefinition;

/// Executions retained in the ledger by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One concrete run of a workflow, with its own step-status snapshot and
/// terminal outcome. Immutable once terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("workflow not found: {id}")]
    #[diagnostic(code(ledgerflow::engine::not_found))]
    NotFound { id: WorkflowId },

    #[error("workflow disabled: {id}")]
    #[diagnostic(
        code(ledgerflow::engine::disabled),
        help("Enable the workflow before executing it.")
    )]
    Disabled { id: WorkflowId },

    #[error("workflow already running: {id}")]
    #[diagnostic(
        code(ledgerflow::engine::already_running),
        help("At most one execution per workflow may be in flight; re-submit later.")
    )]
    AlreadyRunning { id: WorkflowId },

    #[error("invalid workflow: {message}")]
    #[diagnostic(code(ledgerflow::engine::validation))]
    Validation { message: String },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => EngineError::NotFound { id },
            StoreError::Validation { message } => EngineError::Validation { message },
        }
    }
}

/// How a run of the step list ended.
enum RunOutcome {
    Completed,
    Failed(String),
    Skipped(String),
    Cancelled,
}

/// Runtime execution engine for financial workflows.
///
/// # Concurrency
///
/// A per-workflow in-flight guard is acquired at `execute` entry and
/// released when the execution reaches a terminal state (on every path,
/// via `Drop`). A second concurrent call for the same workflow fails
/// immediately with [`EngineError::AlreadyRunning`] rather than queuing.
pub struct ExecutionEngine {
    store: Arc<WorkflowStore>,
    gateway: Arc<dyn BankTransferGateway>,
    accounts: Arc<dyn AccountStateProvider>,
    bus: Arc<PropagationBus>,
    /// The logical account this engine operates for.
    account_id: String,
    ledger: Mutex<ExecutionLedger>,
    in_flight: Mutex<FxHashSet<WorkflowId>>,
    cancellations: Mutex<FxHashSet<ExecutionId>>,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<WorkflowStore>,
        gateway: Arc<dyn BankTransferGateway>,
        accounts: Arc<dyn AccountStateProvider>,
        bus: Arc<PropagationBus>,
        account_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            accounts,
            bus,
            account_id: account_id.into(),
            ledger: Mutex::new(ExecutionLedger::new(DEFAULT_HISTORY_LIMIT)),
            in_flight: Mutex::new(FxHashSet::default()),
            cancellations: Mutex::new(FxHashSet::default()),
        }
    }

    /// Cap the number of retained executions.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.ledger = Mutex::new(ExecutionLedger::new(limit.max(1)));
        self
    }

    /// Run one execution of the given workflow.
    ///
    /// Returns the execution id once the run reaches a terminal state; the
    /// run's outcome (including failures inside steps) lives on the
    /// [`Execution`] record and the propagation bus, not in this result.
    /// Errors here mean the run never started: unknown id, disabled
    /// workflow, or an execution already in flight.
    #[instrument(skip(self, trigger_payload), err)]
    pub async fn execute(
        &self,
        workflow_id: &str,
        trigger_payload: Option<Value>,
    ) -> Result<ExecutionId, EngineError> {
        let workflow = self.store.get(workflow_id)?;
        if !workflow.enabled {
            return Err(EngineError::Disabled {
                id: workflow_id.to_string(),
            });
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, workflow_id)?;

        let execution_id = new_id();
        let mut steps: Vec<StepRecord> =
            workflow.steps.iter().map(StepRecord::from_template).collect();
        self.ledger
            .lock()
            .expect("execution ledger poisoned")
            .insert(Execution {
                id: execution_id.clone(),
                workflow_id: workflow.id.clone(),
                status: ExecutionStatus::Running,
                started_at: Utc::now(),
                finished_at: None,
                steps: steps.clone(),
                error: None,
            });
        self.publish(LifecycleEvent::ExecutionStarted {
            workflow_id: workflow.id.clone(),
            execution_id: execution_id.clone(),
        });
        tracing::info!(workflow = %workflow.id, execution = %execution_id, "execution started");

        let outcome = self
            .run_steps(&workflow, &execution_id, &mut steps, trigger_payload)
            .await;
        self.finalize(&workflow, &execution_id, steps, outcome);
        Ok(execution_id)
    }

    /// Request cancellation of an in-flight execution.
    ///
    /// Checked before each step begins: subsequent steps will not start, but
    /// a side effect already submitted is never retroactively undone.
    /// Returns whether the request landed on a non-terminal execution.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let running = self
            .ledger
            .lock()
            .expect("execution ledger poisoned")
            .get(execution_id)
            .is_some_and(|e| !e.status.is_terminal());
        if running {
            self.cancellations
                .lock()
                .expect("cancellation set poisoned")
                .insert(execution_id.to_string());
        }
        running
    }

    /// Fetch one execution record.
    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.ledger
            .lock()
            .expect("execution ledger poisoned")
            .get(execution_id)
            .cloned()
    }

    /// All retained executions of one workflow, oldest first.
    pub fn executions_for(&self, workflow_id: &str) -> Vec<Execution> {
        self.ledger
            .lock()
            .expect("execution ledger poisoned")
            .for_workflow(workflow_id)
    }

    /// The most recent executions across all workflows, newest first.
    pub fn recent_executions(&self, limit: usize) -> Vec<Execution> {
        self.ledger
            .lock()
            .expect("execution ledger poisoned")
            .recent(limit)
    }

    /// Reload execution history from an archive, oldest first.
    pub(crate) fn restore(&self, executions: Vec<Execution>) {
        let mut ledger = self.ledger.lock().expect("execution ledger poisoned");
        for execution in executions {
            ledger.insert(execution);
        }
    }

    async fn run_steps(
        &self,
        workflow: &WorkflowDefinition,
        execution_id: &str,
        steps: &mut [StepRecord],
        trigger_payload: Option<Value>,
    ) -> RunOutcome {
        // Context flows from the trigger through later steps.
        let context = trigger_payload.unwrap_or(Value::Null);

        for record in steps.iter_mut() {
            if self.cancellation_requested(execution_id) {
                tracing::info!(execution = %execution_id, "execution cancelled between steps");
                return RunOutcome::Cancelled;
            }

            record.transition(crate::types::StepStatus::Running);
            let outcome = match record.step.kind {
                StepKind::Trigger => {
                    record.complete(Some(context.clone()));
                    None
                }
                StepKind::Condition => self.run_condition(record).await,
                StepKind::Action => self.run_action(record, &context).await,
            };

            self.publish(LifecycleEvent::StepCompleted {
                workflow_id: workflow.id.clone(),
                execution_id: execution_id.to_string(),
                step_id: record.step.id.clone(),
                status: record.status,
            });

            // Fail-fast: nothing after a denied gate or failed action runs.
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
        RunOutcome::Completed
    }

    /// Resolve a condition step. A denial is a planned skip; a provider
    /// failure is an execution failure.
    async fn run_condition(&self, record: &mut StepRecord) -> Option<RunOutcome> {
        let conditions = Conditions::from_config(&record.step.config);
        let snapshot = match self.accounts.snapshot(&self.account_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(step = %record.step.name, error = %message, "account snapshot failed");
                record.fail(message.clone());
                return Some(RunOutcome::Failed(message));
            }
        };
        match conditions.evaluate(&snapshot) {
            GateDecision::Allow => {
                record.complete(None);
                None
            }
            GateDecision::Deny { reason } => {
                record.fail(reason.clone());
                Some(RunOutcome::Skipped(reason))
            }
        }
    }

    /// Dispatch an action step to the gateway (or resolve it locally for
    /// notifications).
    async fn run_action(&self, record: &mut StepRecord, context: &Value) -> Option<RunOutcome> {
        match self.dispatch_action(&record.step, context).await {
            Ok(result) => {
                record.complete(Some(result));
                None
            }
            Err(message) => {
                tracing::warn!(step = %record.step.name, error = %message, "action step failed");
                record.fail(message.clone());
                Some(RunOutcome::Failed(message))
            }
        }
    }

    async fn dispatch_action(&self, step: &Step, context: &Value) -> Result<Value, String> {
        let operation = step
            .config_str("operation")
            .ok_or_else(|| format!("step '{}' has no operation", step.name))?;
        match operation {
            "deposit" | "withdrawal" => {
                let amount = step
                    .config_f64("amount")
                    .ok_or_else(|| format!("step '{}' has no amount", step.name))?;
                let account = step.config_str("account_id").unwrap_or(&self.account_id);
                let submitted = match operation {
                    "deposit" => self.gateway.initiate_deposit(account, amount).await,
                    _ => self.gateway.initiate_withdrawal(account, amount).await,
                };
                let result = submitted.map_err(|e| e.to_string())?;

                match result.status {
                    TransactionStatus::Failed | TransactionStatus::Cancelled => Err(result
                        .error
                        .unwrap_or_else(|| format!("{operation} {} {}", result.id, result.status))),
                    _ => serde_json::to_value(&result).map_err(|e| e.to_string()),
                }
            }
            "notification" => {
                let message = step.config_str("message").unwrap_or(&step.name);
                Ok(serde_json::json!({
                    "message": message,
                    "context": context,
                }))
            }
            other => Err(format!("unknown operation '{other}'")),
        }
    }

    /// Write the terminal record, book the outcome, and announce it.
    fn finalize(
        &self,
        workflow: &WorkflowDefinition,
        execution_id: &str,
        steps: Vec<StepRecord>,
        outcome: RunOutcome,
    ) {
        let (status, error) = match &outcome {
            RunOutcome::Completed => (ExecutionStatus::Completed, None),
            RunOutcome::Failed(message) => (ExecutionStatus::Failed, Some(message.clone())),
            RunOutcome::Skipped(reason) => (ExecutionStatus::Skipped, Some(reason.clone())),
            RunOutcome::Cancelled => (ExecutionStatus::Cancelled, None),
        };

        self.ledger
            .lock()
            .expect("execution ledger poisoned")
            .finish(execution_id, steps, status, error.clone());
        self.cancellations
            .lock()
            .expect("cancellation set poisoned")
            .remove(execution_id);

        // Only real terminal runs move the statistics; skips and
        // cancellations are planned outcomes.
        let booked = match status {
            ExecutionStatus::Completed => self.store.record_outcome(&workflow.id, true),
            ExecutionStatus::Failed => self.store.record_outcome(&workflow.id, false),
            _ => Ok(()),
        };
        if let Err(err) = booked {
            // The workflow may have been deleted while its last run was in
            // flight; the execution record itself still stands.
            tracing::debug!(workflow = %workflow.id, error = %err, "outcome not booked");
        }

        let event = match outcome {
            RunOutcome::Completed => LifecycleEvent::ExecutionCompleted {
                workflow_id: workflow.id.clone(),
                execution_id: execution_id.to_string(),
            },
            RunOutcome::Failed(e) => LifecycleEvent::ExecutionFailed {
                workflow_id: workflow.id.clone(),
                execution_id: execution_id.to_string(),
                error: e,
            },
            RunOutcome::Skipped(reason) => LifecycleEvent::ExecutionSkipped {
                workflow_id: workflow.id.clone(),
                execution_id: execution_id.to_string(),
                reason,
            },
            RunOutcome::Cancelled => LifecycleEvent::ExecutionCancelled {
                workflow_id: workflow.id.clone(),
                execution_id: execution_id.to_string(),
            },
        };
        self.publish(event);
        tracing::info!(workflow = %workflow.id, execution = %execution_id, %status, "execution finished");
    }

    fn cancellation_requested(&self, execution_id: &str) -> bool {
        self.cancellations
            .lock()
            .expect("cancellation set poisoned")
            .contains(execution_id)
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Err(err) = self.bus.publish(event) {
            tracing::debug!(error = %err, "failed to publish engine event");
        }
    }
}

/// Bounded ledger of execution records, newest-aware.
struct ExecutionLedger {
    records: FxHashMap<ExecutionId, Execution>,
    order: VecDeque<ExecutionId>,
    limit: usize,
}

impl ExecutionLedger {
    fn new(limit: usize) -> Self {
        Self {
            records: FxHashMap::default(),
            order: VecDeque::new(),
            limit,
        }
    }

    fn insert(&mut self, execution: Execution) {
        self.order.push_back(execution.id.clone());
        self.records.insert(execution.id.clone(), execution);
        self.evict();
    }

    fn finish(
        &mut self,
        execution_id: &str,
        steps: Vec<StepRecord>,
        status: ExecutionStatus,
        error: Option<String>,
    ) {
        if let Some(record) = self.records.get_mut(execution_id) {
            record.steps = steps;
            record.status = status;
            record.error = error;
            record.finished_at = Some(Utc::now());
        }
    }

    fn get(&self, execution_id: &str) -> Option<&Execution> {
        self.records.get(execution_id)
    }

    fn for_workflow(&self, workflow_id: &str) -> Vec<Execution> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    fn recent(&self, limit: usize) -> Vec<Execution> {
        self.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| self.records.get(id))
            .cloned()
            .collect()
    }

    fn evict(&mut self) {
        while self.order.len() > self.limit {
            // Never evict an in-flight record; history pressure waits for it.
            let evictable = self
                .order
                .iter()
                .position(|id| self.records.get(id).is_none_or(|e| e.status.is_terminal()));
            match evictable {
                Some(index) => {
                    if let Some(id) = self.order.remove(index) {
                        self.records.remove(&id);
                    }
                }
                None => break,
            }
        }
    }
}

/// Per-workflow execution lock: present in the set means in flight.
/// Released on drop so every exit path (completion, failure, panic
/// unwind) frees the workflow.
struct InFlightGuard<'a> {
    set: &'a Mutex<FxHashSet<WorkflowId>>,
    id: WorkflowId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(
        set: &'a Mutex<FxHashSet<WorkflowId>>,
        workflow_id: &str,
    ) -> Result<Self, EngineError> {
        let mut in_flight = set.lock().expect("in-flight set poisoned");
        if !in_flight.insert(workflow_id.to_string()) {
            return Err(EngineError::AlreadyRunning {
                id: workflow_id.to_string(),
            });
        }
        Ok(Self {
            set,
            id: workflow_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight set poisoned")
            .remove(&self.id);
    }
}
