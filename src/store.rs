//! Authoritative in-memory table of workflow definitions.
//!
//! The [`WorkflowStore`] is the single writer of workflow state: every
//! component reads through its accessor API and every mutation goes through
//! a store method. Reads hand out clones, so no caller ever holds a
//! reference that could bypass store mutation. Definition changes are
//! published on the propagation bus injected at construction: an explicit
//! store object with injected collaborators rather than a global registry.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::event_bus::{LifecycleEvent, PropagationBus};
use crate::schedule::next_execution;
use crate::step::Step;
use crate::types::{StepKind, WorkflowId};
use crate::workflow::{WorkflowDefinition, WorkflowDraft, WorkflowPatch};

/// Action operations the engine knows how to dispatch.
pub(crate) const KNOWN_OPERATIONS: &[&str] = &["deposit", "withdrawal", "notification"];

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("workflow not found: {id}")]
    #[diagnostic(code(ledgerflow::store::not_found))]
    NotFound { id: WorkflowId },

    #[error("invalid workflow: {message}")]
    #[diagnostic(
        code(ledgerflow::store::validation),
        help("Check step configuration: transfer actions need a positive amount.")
    )]
    Validation { message: String },
}

/// Single-writer store of workflow definitions and their execution
/// statistics.
///
/// # Statistics policy
///
/// `record_outcome` increments `execution_count` and recomputes
/// `success_rate` as `success_count / execution_count * 100`. The ratio
/// formula is applied uniformly (rather than a fixed decay on failure), so
/// the rate is bounded to `[0, 100]` by construction and only a failed
/// terminal execution can lower it.
pub struct WorkflowStore {
    workflows: Mutex<FxHashMap<WorkflowId, WorkflowDefinition>>,
    bus: Arc<PropagationBus>,
}

impl WorkflowStore {
    pub fn new(bus: Arc<PropagationBus>) -> Self {
        Self {
            workflows: Mutex::new(FxHashMap::default()),
            bus,
        }
    }

    /// Validate and store a new workflow definition.
    ///
    /// Assigns a fresh id, creation timestamp, and zero counters; computes
    /// the first `next_execution` when the draft's trigger declares a
    /// recurrence. Returns a clone of the stored record.
    #[instrument(skip(self, draft), err)]
    pub fn create(&self, draft: WorkflowDraft) -> Result<WorkflowDefinition, StoreError> {
        validate(&draft.name, &draft.steps)?;
        let now = Utc::now();
        let mut definition = draft.into_definition(now);
        if let Some(schedule) = definition.trigger_schedule() {
            definition.next_execution = Some(next_execution(
                schedule.frequency,
                Some(&schedule.anchor),
                now,
            ));
        }

        self.workflows
            .lock()
            .expect("workflow table poisoned")
            .insert(definition.id.clone(), definition.clone());

        self.publish(LifecycleEvent::WorkflowCreated {
            workflow_id: definition.id.clone(),
        });
        tracing::info!(workflow = %definition.id, name = %definition.name, "workflow created");
        Ok(definition)
    }

    /// Fetch a clone of one definition.
    pub fn get(&self, id: &str) -> Result<WorkflowDefinition, StoreError> {
        self.workflows
            .lock()
            .expect("workflow table poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    /// All definitions, oldest first.
    pub fn list(&self) -> Vec<WorkflowDefinition> {
        let mut all: Vec<_> = self
            .workflows
            .lock()
            .expect("workflow table poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|w| w.created_at);
        all
    }

    /// Enabled definitions, oldest first.
    pub fn list_enabled(&self) -> Vec<WorkflowDefinition> {
        let mut enabled: Vec<_> = self
            .workflows
            .lock()
            .expect("workflow table poisoned")
            .values()
            .filter(|w| w.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|w| w.created_at);
        enabled
    }

    /// Apply a partial update. Fails with `NotFound` for unknown (or
    /// previously deleted) ids; deletes are final.
    #[instrument(skip(self, patch), err)]
    pub fn update(&self, id: &str, patch: WorkflowPatch) -> Result<WorkflowDefinition, StoreError> {
        let mut table = self.workflows.lock().expect("workflow table poisoned");
        let existing = table
            .get(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let name = patch.name.as_deref().unwrap_or(&existing.name);
        let steps = patch.steps.as_deref().unwrap_or(&existing.steps);
        validate(name, steps)?;

        let record = table.get_mut(id).expect("present under held lock");
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(enabled) = patch.enabled {
            record.enabled = enabled;
        }
        if let Some(steps) = patch.steps {
            record.steps = steps;
            // A step change can add, move, or remove the recurrence.
            record.next_execution = record
                .trigger_schedule()
                .map(|s| next_execution(s.frequency, Some(&s.anchor), Utc::now()));
        }
        let updated = record.clone();
        drop(table);

        self.publish(LifecycleEvent::WorkflowUpdated {
            workflow_id: updated.id.clone(),
        });
        Ok(updated)
    }

    /// Remove a definition. Final: the id can never be resurrected.
    #[instrument(skip(self), err)]
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = self
            .workflows
            .lock()
            .expect("workflow table poisoned")
            .remove(id);
        match removed {
            Some(_) => {
                self.publish(LifecycleEvent::WorkflowDeleted {
                    workflow_id: id.to_string(),
                });
                tracing::info!(workflow = %id, "workflow deleted");
                Ok(())
            }
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Record a terminal Completed/Failed execution outcome.
    ///
    /// Skipped and cancelled runs are planned outcomes: the engine does not
    /// call this for them, so they neither count nor penalize.
    pub fn record_outcome(&self, id: &str, success: bool) -> Result<(), StoreError> {
        let mut table = self.workflows.lock().expect("workflow table poisoned");
        let record = table
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        record.execution_count += 1;
        if success {
            record.success_count += 1;
        }
        record.success_rate = record.success_count as f64 / record.execution_count as f64 * 100.0;
        record.last_executed = Some(Utc::now());
        Ok(())
    }

    /// Enabled recurring workflows whose next execution is due at `now`.
    pub fn due_recurring(&self, now: DateTime<Utc>) -> Vec<WorkflowDefinition> {
        self.workflows
            .lock()
            .expect("workflow table poisoned")
            .values()
            .filter(|w| w.enabled)
            .filter(|w| w.next_execution.is_some_and(|next| next <= now))
            .cloned()
            .collect()
    }

    /// Move a recurring workflow's next execution forward.
    pub fn advance_schedule(&self, id: &str, next: DateTime<Utc>) -> Result<(), StoreError> {
        let mut table = self.workflows.lock().expect("workflow table poisoned");
        let record = table
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        record.next_execution = Some(next);
        Ok(())
    }

    /// Reload definitions from an archive. Silent: restoring does not
    /// republish creation events.
    pub(crate) fn restore(&self, definitions: Vec<WorkflowDefinition>) {
        let mut table = self.workflows.lock().expect("workflow table poisoned");
        for definition in definitions {
            table.insert(definition.id.clone(), definition);
        }
    }

    fn publish(&self, event: LifecycleEvent) {
        if let Err(err) = self.bus.publish(event) {
            tracing::debug!(error = %err, "failed to publish store event");
        }
    }
}

/// Shared create/update validation.
fn validate(name: &str, steps: &[Step]) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Validation {
            message: "workflow name must not be empty".into(),
        });
    }
    if steps.is_empty() {
        return Err(StoreError::Validation {
            message: "workflow needs at least one step".into(),
        });
    }
    for step in steps {
        if step.kind != StepKind::Action {
            continue;
        }
        let operation = step.config_str("operation").unwrap_or_default();
        if !KNOWN_OPERATIONS.contains(&operation) {
            return Err(StoreError::Validation {
                message: format!("step '{}' has unknown operation '{operation}'", step.name),
            });
        }
        if operation != "notification" {
            match step.config_f64("amount") {
                Some(amount) if amount > 0.0 => {}
                Some(amount) => {
                    return Err(StoreError::Validation {
                        message: format!("step '{}' has non-positive amount {amount}", step.name),
                    });
                }
                None => {
                    return Err(StoreError::Validation {
                        message: format!("step '{}' is missing an amount", step.name),
                    });
                }
            }
        }
    }
    Ok(())
}
