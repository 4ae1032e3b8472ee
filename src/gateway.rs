//! External boundaries: the bank transfer gateway and the account state
//! provider.
//!
//! The engine never talks to a bank integration directly. It consumes these
//! two traits, injected at construction, so the same execution logic runs
//! against a production integration, a sandbox, or the in-memory mocks the
//! test suite uses.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status of a transfer as reported by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of an initiated transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// Gateway-assigned transaction id.
    pub id: String,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Balances for a single account as the gateway sees them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub available: f64,
    pub current: f64,
}

/// One consistent view of a user's account used for gate evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub total_balance: f64,
    pub available_balance: f64,
    pub invested_amount: f64,
}

/// Errors surfaced by the bank transfer gateway.
#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    /// The gateway rejected or could not complete a transfer.
    #[error("transfer failed ({operation}): {message}")]
    #[diagnostic(code(ledgerflow::gateway::transfer))]
    Transfer {
        operation: &'static str,
        message: String,
    },

    /// The gateway could not be reached at all.
    #[error("gateway unavailable: {0}")]
    #[diagnostic(
        code(ledgerflow::gateway::unavailable),
        help("Check connectivity to the bank integration provider.")
    )]
    Unavailable(String),
}

/// Errors surfaced by the account state provider.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("unknown account: {user_id}")]
    #[diagnostic(code(ledgerflow::provider::unknown_account))]
    UnknownAccount { user_id: String },

    #[error("account state unavailable: {0}")]
    #[diagnostic(code(ledgerflow::provider::unavailable))]
    Unavailable(String),
}

/// The external boundary performing real money movement.
///
/// Implementations are expected to be idempotent at their own layer where
/// possible; the engine guarantees at-most-one concurrent execution per
/// workflow but not exactly-once delivery of transfers.
#[async_trait]
pub trait BankTransferGateway: Send + Sync {
    /// Initiate a deposit into the given account.
    async fn initiate_deposit(
        &self,
        account_id: &str,
        amount: f64,
    ) -> Result<TransactionResult, GatewayError>;

    /// Initiate a withdrawal from the given account.
    async fn initiate_withdrawal(
        &self,
        account_id: &str,
        amount: f64,
    ) -> Result<TransactionResult, GatewayError>;

    /// Current balances for the given account.
    async fn balance(&self, account_id: &str) -> Result<AccountBalance, GatewayError>;
}

/// Read-only provider of account snapshots for condition evaluation.
#[async_trait]
pub trait AccountStateProvider: Send + Sync {
    /// A single consistent snapshot of the user's account state.
    async fn snapshot(&self, user_id: &str) -> Result<AccountSnapshot, ProviderError>;
}
