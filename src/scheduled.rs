//! Scheduled transactions: simpler recurring single-action jobs.
//!
//! A [`ScheduledTransaction`] is a recurring deposit or withdrawal
//! independent of the full workflow model; it shares the schedule calculator
//! and the condition gate with workflows. The [`ScheduleStore`] owns the
//! records; the [`ScheduleRunner`] performs one attempt (gate, gateway,
//! bookkeeping) and is what both the scheduler loop and the run-now API call.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::conditions::{Conditions, GateDecision};
use crate::event_bus::{LifecycleEvent, PropagationBus};
use crate::gateway::{AccountStateProvider, BankTransferGateway, TransactionStatus};
use crate::schedule::next_execution;
use crate::types::{Frequency, ScheduleAnchor, ScheduleId, TransactionKind, new_id};

/// A recurring single-action money movement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTransaction {
    pub id: ScheduleId,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub target_account: String,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<ScheduleAnchor>,
    pub enabled: bool,
    pub next_execution: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
    pub created_at: DateTime<Utc>,
}

/// Creation input for a scheduled transaction.
#[derive(Clone, Debug)]
pub struct ScheduleDraft {
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub currency: String,
    pub target_account: String,
    pub frequency: Frequency,
    pub anchor: Option<ScheduleAnchor>,
    pub enabled: bool,
    pub conditions: Option<Conditions>,
}

impl ScheduleDraft {
    pub fn new(
        user_id: impl Into<String>,
        kind: TransactionKind,
        amount: f64,
        target_account: impl Into<String>,
        frequency: Frequency,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            amount,
            currency: "EUR".into(),
            target_account: target_account.into(),
            frequency,
            anchor: None,
            enabled: true,
            conditions: None,
        }
    }

    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    #[must_use]
    pub fn with_anchor(mut self, anchor: ScheduleAnchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    #[must_use]
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Partial update for a scheduled transaction. Absent fields are untouched.
#[derive(Clone, Debug, Default)]
pub struct SchedulePatch {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub target_account: Option<String>,
    pub frequency: Option<Frequency>,
    pub anchor: Option<Option<ScheduleAnchor>>,
    pub enabled: Option<bool>,
    pub conditions: Option<Option<Conditions>>,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ScheduleError {
    #[error("scheduled transaction not found: {id}")]
    #[diagnostic(code(ledgerflow::scheduled::not_found))]
    NotFound { id: ScheduleId },

    #[error("scheduled transaction disabled: {id}")]
    #[diagnostic(code(ledgerflow::scheduled::disabled))]
    Disabled { id: ScheduleId },

    #[error("invalid scheduled transaction: {message}")]
    #[diagnostic(code(ledgerflow::scheduled::validation))]
    Validation { message: String },
}

/// Single-writer store of scheduled-transaction records.
pub struct ScheduleStore {
    records: Mutex<FxHashMap<ScheduleId, ScheduledTransaction>>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(FxHashMap::default()),
        }
    }

    /// Validate and store a new record, computing its first due instant.
    #[instrument(skip(self, draft), err)]
    pub fn create(&self, draft: ScheduleDraft) -> Result<ScheduledTransaction, ScheduleError> {
        if draft.amount <= 0.0 {
            return Err(ScheduleError::Validation {
                message: format!("amount must be positive, got {}", draft.amount),
            });
        }
        if draft.target_account.trim().is_empty() {
            return Err(ScheduleError::Validation {
                message: "target account must not be empty".into(),
            });
        }
        let now = Utc::now();
        let record = ScheduledTransaction {
            id: new_id(),
            user_id: draft.user_id,
            kind: draft.kind,
            amount: draft.amount,
            currency: draft.currency,
            target_account: draft.target_account,
            frequency: draft.frequency,
            anchor: draft.anchor,
            enabled: draft.enabled,
            next_execution: next_execution(draft.frequency, draft.anchor.as_ref(), now),
            last_execution: None,
            conditions: draft.conditions,
            created_at: now,
        };
        self.records
            .lock()
            .expect("schedule table poisoned")
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<ScheduledTransaction, ScheduleError> {
        self.records
            .lock()
            .expect("schedule table poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })
    }

    /// All records owned by one user, oldest first.
    pub fn list(&self, user_id: &str) -> Vec<ScheduledTransaction> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .expect("schedule table poisoned")
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// All records regardless of owner, oldest first.
    pub fn list_all(&self) -> Vec<ScheduledTransaction> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .expect("schedule table poisoned")
            .values()
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Apply a partial update; a frequency or anchor change recomputes the
    /// next due instant from now.
    pub fn update(
        &self,
        id: &str,
        patch: SchedulePatch,
    ) -> Result<ScheduledTransaction, ScheduleError> {
        if let Some(amount) = patch.amount
            && amount <= 0.0
        {
            return Err(ScheduleError::Validation {
                message: format!("amount must be positive, got {amount}"),
            });
        }
        let mut records = self.records.lock().expect("schedule table poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })?;

        let mut cadence_changed = false;
        if let Some(amount) = patch.amount {
            record.amount = amount;
        }
        if let Some(currency) = patch.currency {
            record.currency = currency;
        }
        if let Some(target_account) = patch.target_account {
            record.target_account = target_account;
        }
        if let Some(frequency) = patch.frequency {
            record.frequency = frequency;
            cadence_changed = true;
        }
        if let Some(anchor) = patch.anchor {
            record.anchor = anchor;
            cadence_changed = true;
        }
        if let Some(enabled) = patch.enabled {
            record.enabled = enabled;
        }
        if let Some(conditions) = patch.conditions {
            record.conditions = conditions;
        }
        if cadence_changed {
            record.next_execution =
                next_execution(record.frequency, record.anchor.as_ref(), Utc::now());
        }
        Ok(record.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), ScheduleError> {
        self.records
            .lock()
            .expect("schedule table poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })
    }

    /// Flip the enabled flag, returning the updated record.
    pub fn toggle(&self, id: &str) -> Result<ScheduledTransaction, ScheduleError> {
        let mut records = self.records.lock().expect("schedule table poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })?;
        record.enabled = !record.enabled;
        Ok(record.clone())
    }

    /// Enabled records due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<ScheduledTransaction> {
        self.records
            .lock()
            .expect("schedule table poisoned")
            .values()
            .filter(|r| r.enabled && r.next_execution <= now)
            .cloned()
            .collect()
    }

    /// Book a successful attempt: stamp `last_execution` and advance.
    pub fn mark_executed(&self, id: &str, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let mut records = self.records.lock().expect("schedule table poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })?;
        record.last_execution = Some(now);
        record.next_execution = next_execution(record.frequency, record.anchor.as_ref(), now);
        Ok(())
    }

    /// Reload records from an archive.
    pub(crate) fn restore(&self, schedules: Vec<ScheduledTransaction>) {
        let mut records = self.records.lock().expect("schedule table poisoned");
        for schedule in schedules {
            records.insert(schedule.id.clone(), schedule);
        }
    }

    /// Advance past an attempted cycle without stamping `last_execution`.
    ///
    /// Every attempt advances, whether the gate denied or the gateway
    /// failed. Re-trying a persistently false condition every scan would
    /// hot-loop; the job simply waits for its next recurrence.
    pub fn advance(&self, id: &str, now: DateTime<Utc>) -> Result<(), ScheduleError> {
        let mut records = self.records.lock().expect("schedule table poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| ScheduleError::NotFound { id: id.to_string() })?;
        record.next_execution = next_execution(record.frequency, record.anchor.as_ref(), now);
        Ok(())
    }
}

/// Result of one attempt at a scheduled transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScheduleOutcome {
    /// The transfer was submitted to the gateway.
    Executed { transaction_id: String },
    /// A declared condition denied this cycle; not a failure.
    Skipped { reason: String },
    /// The gateway (or the account provider) failed.
    Failed { error: String },
}

impl ScheduleOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(self, ScheduleOutcome::Executed { .. })
    }

    #[must_use]
    pub fn skipped(&self) -> bool {
        matches!(self, ScheduleOutcome::Skipped { .. })
    }
}

/// Performs one attempt of a scheduled transaction: gate, gateway,
/// bookkeeping, event.
pub struct ScheduleRunner {
    schedules: Arc<ScheduleStore>,
    gateway: Arc<dyn BankTransferGateway>,
    accounts: Arc<dyn AccountStateProvider>,
    bus: Arc<PropagationBus>,
}

impl ScheduleRunner {
    pub fn new(
        schedules: Arc<ScheduleStore>,
        gateway: Arc<dyn BankTransferGateway>,
        accounts: Arc<dyn AccountStateProvider>,
        bus: Arc<PropagationBus>,
    ) -> Self {
        Self {
            schedules,
            gateway,
            accounts,
            bus,
        }
    }

    /// Attempt the scheduled transaction immediately.
    ///
    /// The schedule always advances past this attempt; only a submitted
    /// transfer stamps `last_execution`.
    #[instrument(skip(self), err)]
    pub async fn execute_now(&self, id: &str) -> Result<ScheduleOutcome, ScheduleError> {
        let schedule = self.schedules.get(id)?;
        if !schedule.enabled {
            return Err(ScheduleError::Disabled { id: id.to_string() });
        }

        let now = Utc::now();
        let outcome = self.attempt(&schedule).await;
        match &outcome {
            ScheduleOutcome::Executed { .. } => self.schedules.mark_executed(id, now)?,
            _ => self.schedules.advance(id, now)?,
        }

        let event = match &outcome {
            ScheduleOutcome::Executed { transaction_id } => LifecycleEvent::ScheduleExecuted {
                schedule_id: id.to_string(),
                transaction_id: transaction_id.clone(),
            },
            ScheduleOutcome::Skipped { reason } => LifecycleEvent::ScheduleSkipped {
                schedule_id: id.to_string(),
                reason: reason.clone(),
            },
            ScheduleOutcome::Failed { error } => LifecycleEvent::ScheduleFailed {
                schedule_id: id.to_string(),
                error: error.clone(),
            },
        };
        if let Err(err) = self.bus.publish(event) {
            tracing::debug!(error = %err, "failed to publish schedule event");
        }
        Ok(outcome)
    }

    async fn attempt(&self, schedule: &ScheduledTransaction) -> ScheduleOutcome {
        if let Some(conditions) = &schedule.conditions
            && !conditions.is_empty()
        {
            let snapshot = match self.accounts.snapshot(&schedule.user_id).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    return ScheduleOutcome::Failed {
                        error: err.to_string(),
                    };
                }
            };
            if let GateDecision::Deny { reason } = conditions.evaluate(&snapshot) {
                tracing::info!(schedule = %schedule.id, %reason, "scheduled transaction skipped");
                return ScheduleOutcome::Skipped { reason };
            }
        }

        let submitted = match schedule.kind {
            TransactionKind::Deposit => {
                self.gateway
                    .initiate_deposit(&schedule.target_account, schedule.amount)
                    .await
            }
            TransactionKind::Withdrawal => {
                self.gateway
                    .initiate_withdrawal(&schedule.target_account, schedule.amount)
                    .await
            }
        };
        match submitted {
            Ok(result) => match result.status {
                TransactionStatus::Failed | TransactionStatus::Cancelled => {
                    ScheduleOutcome::Failed {
                        error: result
                            .error
                            .unwrap_or_else(|| format!("transfer {} {}", result.id, result.status)),
                    }
                }
                _ => ScheduleOutcome::Executed {
                    transaction_id: result.id,
                },
            },
            Err(err) => ScheduleOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}
