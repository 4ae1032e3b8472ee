mod common;

use std::sync::Arc;
use std::time::Duration;

use common::fixtures::{MockGateway, StaticAccounts, gated_deposit_draft, plain_deposit_draft};
use ledgerflow::engine::{EngineError, ExecutionEngine};
use ledgerflow::event_bus::PropagationBus;
use ledgerflow::step::Step;
use ledgerflow::store::WorkflowStore;
use ledgerflow::types::{ExecutionStatus, StepStatus};
use ledgerflow::workflow::WorkflowDraft;
use serde_json::json;

const ACCOUNT: &str = "acct-test";

struct Harness {
    engine: Arc<ExecutionEngine>,
    store: Arc<WorkflowStore>,
    gateway: Arc<MockGateway>,
    accounts: Arc<StaticAccounts>,
    bus: Arc<PropagationBus>,
}

fn harness() -> Harness {
    let bus = Arc::new(PropagationBus::with_sinks(vec![]));
    let store = Arc::new(WorkflowStore::new(Arc::clone(&bus)));
    let gateway = Arc::new(MockGateway::new());
    let accounts = Arc::new(StaticAccounts::new(1_000.0, 800.0, 0.0));
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&store),
        Arc::clone(&gateway) as Arc<dyn ledgerflow::gateway::BankTransferGateway>,
        Arc::clone(&accounts) as Arc<dyn ledgerflow::gateway::AccountStateProvider>,
        Arc::clone(&bus),
        ACCOUNT,
    ));
    Harness {
        engine,
        store,
        gateway,
        accounts,
        bus,
    }
}

#[tokio::test]
async fn full_run_completes_and_records_success() {
    let h = harness();
    let workflow = h.store.create(plain_deposit_draft(50.0)).unwrap();

    let execution_id = h.engine.execute(&workflow.id, None).await.unwrap();

    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.finished_at.is_some());
    assert!(execution.error.is_none());
    assert!(
        execution
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed)
    );

    assert_eq!(h.gateway.deposits(), vec![(ACCOUNT.to_string(), 50.0)]);

    let stats = h.store.get(&workflow.id).unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.success_rate, 100.0);
    assert!(stats.last_executed.is_some());
}

#[tokio::test]
async fn denied_gate_skips_without_side_effects() {
    let h = harness();
    h.accounts.set_available(50.0);
    let workflow = h
        .store
        .create(gated_deposit_draft(100.0, 50.0))
        .unwrap();

    let execution_id = h.engine.execute(&workflow.id, None).await.unwrap();

    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Skipped);
    assert_eq!(execution.error.as_deref(), Some("below minimum balance"));

    // Trigger resolved, condition failed, action never started.
    assert_eq!(execution.steps[0].status, StepStatus::Completed);
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert_eq!(execution.steps[2].status, StepStatus::Pending);

    // The gateway was never touched.
    assert_eq!(h.gateway.call_count(), 0);

    // A planned skip neither counts nor penalizes.
    let stats = h.store.get(&workflow.id).unwrap();
    assert_eq!(stats.execution_count, 0);
    assert_eq!(stats.success_rate, 100.0);
}

#[tokio::test]
async fn gateway_failure_fails_run_and_lowers_rate() {
    let h = harness();
    h.gateway.fail_transfers(true);
    let workflow = h.store.create(plain_deposit_draft(50.0)).unwrap();

    let execution_id = h.engine.execute(&workflow.id, None).await.unwrap();

    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(execution.error.as_deref().unwrap().contains("declined"));

    let stats = h.store.get(&workflow.id).unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn second_concurrent_execute_is_rejected() {
    let h = harness();
    h.gateway.set_delay(Duration::from_millis(100));
    let workflow = h.store.create(plain_deposit_draft(50.0)).unwrap();

    let first = {
        let engine = Arc::clone(&h.engine);
        let id = workflow.id.clone();
        tokio::spawn(async move { engine.execute(&id, None).await })
    };
    // Let the first call take the in-flight lock.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = h.engine.execute(&workflow.id, None).await;
    assert!(matches!(second, Err(EngineError::AlreadyRunning { .. })));

    let first = first.await.unwrap().unwrap();
    assert_eq!(
        h.engine.get_execution(&first).unwrap().status,
        ExecutionStatus::Completed
    );

    // Terminal state released the lock.
    h.gateway.set_delay(Duration::from_millis(0));
    h.engine.execute(&workflow.id, None).await.unwrap();
}

#[tokio::test]
async fn unknown_and_disabled_workflows_are_rejected() {
    let h = harness();
    assert!(matches!(
        h.engine.execute("missing", None).await,
        Err(EngineError::NotFound { .. })
    ));

    let disabled = h
        .store
        .create(plain_deposit_draft(50.0).with_enabled(false))
        .unwrap();
    assert!(matches!(
        h.engine.execute(&disabled.id, None).await,
        Err(EngineError::Disabled { .. })
    ));
    assert_eq!(h.gateway.call_count(), 0);
}

#[tokio::test]
async fn trigger_payload_flows_into_step_result() {
    let h = harness();
    let workflow = h.store.create(plain_deposit_draft(50.0)).unwrap();
    let payload = json!({"source": "market-event", "symbol": "ETF"});

    let execution_id = h
        .engine
        .execute(&workflow.id, Some(payload.clone()))
        .await
        .unwrap();

    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.steps[0].result.as_ref(), Some(&payload));
}

#[tokio::test]
async fn cancellation_stops_subsequent_steps() {
    let h = harness();
    h.gateway.set_delay(Duration::from_millis(100));
    let workflow = h
        .store
        .create(
            WorkflowDraft::new("two transfers")
                .with_step(Step::trigger("manual"))
                .with_step(
                    Step::action("first")
                        .with_config_entry("operation", json!("deposit"))
                        .with_config_entry("amount", json!(10.0)),
                )
                .with_step(
                    Step::action("second")
                        .with_config_entry("operation", json!("deposit"))
                        .with_config_entry("amount", json!(20.0)),
                ),
        )
        .unwrap();

    let handle = {
        let engine = Arc::clone(&h.engine);
        let id = workflow.id.clone();
        tokio::spawn(async move { engine.execute(&id, None).await })
    };

    // Find the in-flight execution and cancel it while the first transfer
    // is still held at the gateway.
    let mut execution_id = None;
    for _ in 0..50 {
        if let Some(execution) = h.engine.recent_executions(1).into_iter().next() {
            execution_id = Some(execution.id);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let execution_id = execution_id.expect("execution registered");
    assert!(h.engine.cancel(&execution_id));

    handle.await.unwrap().unwrap();
    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);

    // The submitted transfer is not undone; the second never starts.
    assert_eq!(h.gateway.deposits().len(), 1);
    assert_eq!(execution.steps[2].status, StepStatus::Pending);

    // Cancellation is a planned outcome.
    assert_eq!(h.store.get(&workflow.id).unwrap().execution_count, 0);
}

#[tokio::test]
async fn notification_actions_resolve_without_gateway() {
    let h = harness();
    let workflow = h
        .store
        .create(
            WorkflowDraft::new("notify")
                .with_step(Step::trigger("manual"))
                .with_step(
                    Step::action("tell user")
                        .with_config_entry("operation", json!("notification"))
                        .with_config_entry("message", json!("rebalance done")),
                ),
        )
        .unwrap();

    let execution_id = h.engine.execute(&workflow.id, None).await.unwrap();

    let execution = h.engine.get_execution(&execution_id).unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(h.gateway.call_count(), 0);
    let result = execution.steps[1].result.as_ref().unwrap();
    assert_eq!(result["message"], "rebalance done");
}

#[tokio::test]
async fn ledger_serves_recent_and_per_workflow_views() {
    let h = harness();
    let first = h.store.create(plain_deposit_draft(10.0)).unwrap();
    let second = h.store.create(plain_deposit_draft(20.0)).unwrap();

    let run_a = h.engine.execute(&first.id, None).await.unwrap();
    let run_b = h.engine.execute(&second.id, None).await.unwrap();
    let run_c = h.engine.execute(&first.id, None).await.unwrap();

    let recent = h.engine.recent_executions(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].id, run_c);
    assert_eq!(recent[1].id, run_b);

    let for_first: Vec<_> = h
        .engine
        .executions_for(&first.id)
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(for_first, vec![run_a, run_c]);
}

#[tokio::test]
async fn history_limit_evicts_oldest_terminal_runs() {
    let h = harness();
    let bus = Arc::new(PropagationBus::with_sinks(vec![]));
    let engine = ExecutionEngine::new(
        Arc::clone(&h.store),
        Arc::clone(&h.gateway) as Arc<dyn ledgerflow::gateway::BankTransferGateway>,
        Arc::clone(&h.accounts) as Arc<dyn ledgerflow::gateway::AccountStateProvider>,
        bus,
        ACCOUNT,
    )
    .with_history_limit(2);

    let workflow = h.store.create(plain_deposit_draft(10.0)).unwrap();
    let run_a = engine.execute(&workflow.id, None).await.unwrap();
    engine.execute(&workflow.id, None).await.unwrap();
    engine.execute(&workflow.id, None).await.unwrap();

    assert_eq!(engine.recent_executions(10).len(), 2);
    assert!(engine.get_execution(&run_a).is_none());
}

#[tokio::test]
async fn lifecycle_events_cover_every_major_transition() {
    let h = harness();
    let workflow = h.store.create(plain_deposit_draft(50.0)).unwrap();
    h.engine.execute(&workflow.id, None).await.unwrap();

    let labels: Vec<_> = h
        .bus
        .replay_since(0)
        .iter()
        .map(|e| e.event.label().to_string())
        .collect();
    assert_eq!(
        labels,
        vec![
            "workflow_created",
            "execution_started",
            "step_completed", // trigger
            "step_completed", // action
            "execution_completed",
        ]
    );

    // Sequences are strictly increasing.
    let sequences: Vec<_> = h.bus.replay_since(0).iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}
