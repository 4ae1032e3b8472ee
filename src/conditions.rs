//! Condition gate: precondition evaluation against one account snapshot.
//!
//! All declared checks are evaluated against a single [`AccountSnapshot`]
//! fetched once per evaluation; the gate never re-reads account state
//! mid-decision, so a decision is internally consistent even while balances
//! move underneath it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::AccountSnapshot;

/// Declared preconditions guarding an action.
///
/// Every field is optional; an empty set of conditions always allows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_threshold: Option<f64>,
}

impl Conditions {
    /// Parse conditions out of a condition step's configuration map.
    ///
    /// Missing keys simply leave the bound unset; non-numeric values are
    /// ignored the same way.
    #[must_use]
    pub fn from_config(config: &rustc_hash::FxHashMap<String, Value>) -> Self {
        Self {
            min_balance: config.get("min_balance").and_then(Value::as_f64),
            max_balance: config.get("max_balance").and_then(Value::as_f64),
            profit_threshold: config.get("profit_threshold").and_then(Value::as_f64),
        }
    }

    /// Whether any bound is declared at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_balance.is_none() && self.max_balance.is_none() && self.profit_threshold.is_none()
    }

    /// Evaluate the declared bounds against one consistent snapshot.
    ///
    /// Checks run in declaration order and the first violated bound decides
    /// the outcome; the reasons are stable strings surfaced to observers.
    #[must_use]
    pub fn evaluate(&self, snapshot: &AccountSnapshot) -> GateDecision {
        if let Some(min) = self.min_balance
            && snapshot.available_balance < min
        {
            return GateDecision::deny("below minimum balance");
        }
        if let Some(max) = self.max_balance
            && snapshot.available_balance > max
        {
            return GateDecision::deny("above maximum balance");
        }
        if let Some(threshold) = self.profit_threshold
            && (snapshot.total_balance - snapshot.invested_amount) < threshold
        {
            return GateDecision::deny("profit below threshold");
        }
        GateDecision::Allow
    }
}

/// Outcome of a gate evaluation.
///
/// A denial is a planned skip, not an error: callers record it as a skipped
/// outcome and never penalize the workflow's success rate for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny { reason: String },
}

impl GateDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        GateDecision::Deny {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    /// The denial reason, if denied.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            GateDecision::Allow => None,
            GateDecision::Deny { reason } => Some(reason),
        }
    }
}
