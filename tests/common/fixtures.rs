use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ledgerflow::config::{EventBusConfig, RuntimeConfig};
use ledgerflow::gateway::{
    AccountBalance, AccountSnapshot, AccountStateProvider, BankTransferGateway, GatewayError,
    ProviderError, TransactionResult, TransactionStatus,
};
use ledgerflow::step::Step;
use ledgerflow::workflow::WorkflowDraft;
use serde_json::json;

/// Recording gateway double: every transfer is captured, optionally delayed,
/// optionally failed.
#[derive(Default)]
pub struct MockGateway {
    deposits: Mutex<Vec<(String, f64)>>,
    withdrawals: Mutex<Vec<(String, f64)>>,
    fail_transfers: AtomicBool,
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent transfer fail at the gateway.
    pub fn fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    /// Delay every transfer, to hold executions in flight.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn deposits(&self) -> Vec<(String, f64)> {
        self.deposits.lock().unwrap().clone()
    }

    pub fn withdrawals(&self) -> Vec<(String, f64)> {
        self.withdrawals.lock().unwrap().clone()
    }

    /// Transfers attempted, successful or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn transfer(
        &self,
        operation: &'static str,
        account_id: &str,
        amount: f64,
    ) -> Result<TransactionResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(GatewayError::Transfer {
                operation,
                message: "declined by mock".into(),
            });
        }
        let record = (account_id.to_string(), amount);
        if operation == "deposit" {
            self.deposits.lock().unwrap().push(record);
        } else {
            self.withdrawals.lock().unwrap().push(record);
        }
        Ok(TransactionResult {
            id: uuid::Uuid::new_v4().to_string(),
            status: TransactionStatus::Completed,
            error: None,
        })
    }
}

#[async_trait]
impl BankTransferGateway for MockGateway {
    async fn initiate_deposit(
        &self,
        account_id: &str,
        amount: f64,
    ) -> Result<TransactionResult, GatewayError> {
        self.transfer("deposit", account_id, amount).await
    }

    async fn initiate_withdrawal(
        &self,
        account_id: &str,
        amount: f64,
    ) -> Result<TransactionResult, GatewayError> {
        self.transfer("withdrawal", account_id, amount).await
    }

    async fn balance(&self, _account_id: &str) -> Result<AccountBalance, GatewayError> {
        Ok(AccountBalance {
            available: 1_000.0,
            current: 1_000.0,
        })
    }
}

/// Account-state double serving one adjustable snapshot.
pub struct StaticAccounts {
    snapshot: Mutex<AccountSnapshot>,
}

impl StaticAccounts {
    pub fn new(total: f64, available: f64, invested: f64) -> Self {
        Self {
            snapshot: Mutex::new(AccountSnapshot {
                total_balance: total,
                available_balance: available,
                invested_amount: invested,
            }),
        }
    }

    pub fn set_available(&self, available: f64) {
        self.snapshot.lock().unwrap().available_balance = available;
    }
}

#[async_trait]
impl AccountStateProvider for StaticAccounts {
    async fn snapshot(&self, _user_id: &str) -> Result<AccountSnapshot, ProviderError> {
        Ok(*self.snapshot.lock().unwrap())
    }
}

/// Runtime config for tests: quiet bus, tight history, fast scans.
pub fn test_config() -> RuntimeConfig {
    RuntimeConfig::new(Some("acct-test".into()))
        .with_scan_interval(Duration::from_millis(25))
        .with_event_bus(EventBusConfig::new(64, vec![]))
}

/// Trigger + condition(min_balance) + deposit(amount) draft used by the
/// gate scenarios.
pub fn gated_deposit_draft(min_balance: f64, amount: f64) -> WorkflowDraft {
    WorkflowDraft::new("gated deposit")
        .with_step(Step::trigger("manual"))
        .with_step(
            Step::condition("balance floor").with_config_entry("min_balance", json!(min_balance)),
        )
        .with_step(
            Step::action("deposit")
                .with_config_entry("operation", json!("deposit"))
                .with_config_entry("amount", json!(amount)),
        )
}

/// Trigger + deposit draft without any gate.
pub fn plain_deposit_draft(amount: f64) -> WorkflowDraft {
    WorkflowDraft::new("plain deposit")
        .with_step(Step::trigger("manual"))
        .with_step(
            Step::action("deposit")
                .with_config_entry("operation", json!("deposit"))
                .with_config_entry("amount", json!(amount)),
        )
}
