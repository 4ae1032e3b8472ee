//! Top-level composition: wires store, engine, schedules, scheduler loop,
//! and propagation bus into one runtime serving the workflow and scheduling
//! APIs.
//!
//! # Architecture
//!
//! ```text
//! RuntimeConfig + BankTransferGateway + AccountStateProvider
//!                 ↓
//!      AutomationRuntime::new(...)
//!                 ↓
//!   PropagationBus ← WorkflowStore ← ExecutionEngine ← SchedulerLoop
//!                  ← ScheduleStore ← ScheduleRunner  ←
//! ```
//!
//! Each component takes its collaborators by `Arc` at construction; there
//! is no global registry. A process can host several isolated runtimes, and
//! runtimes attached to the same [`SharedEventLog`] observe each other's
//! lifecycle events.

use std::sync::Arc;

use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::engine::{EngineError, Execution, ExecutionEngine};
use crate::event_bus::{EventEnvelope, EventStream, PropagationBus, SharedEventLog};
use crate::gateway::{AccountStateProvider, BankTransferGateway};
use crate::persistence::{
    EngineArchive, PersistedEnvelope, PersistedExecution, PersistedSchedule, PersistedWorkflow,
    PersistenceError,
};
use crate::scheduled::{
    ScheduleDraft, ScheduleError, ScheduleOutcome, SchedulePatch, ScheduleRunner, ScheduleStore,
    ScheduledTransaction,
};
use crate::scheduler::{SchedulerLoop, TickReport};
use crate::store::{StoreError, WorkflowStore};
use crate::types::ExecutionId;
use crate::workflow::{WorkflowDefinition, WorkflowDraft, WorkflowPatch};

/// One execution context of the automation engine for one logical account.
pub struct AutomationRuntime {
    config: RuntimeConfig,
    bus: Arc<PropagationBus>,
    store: Arc<WorkflowStore>,
    schedules: Arc<ScheduleStore>,
    engine: Arc<ExecutionEngine>,
    runner: Arc<ScheduleRunner>,
    scheduler: SchedulerLoop,
}

impl AutomationRuntime {
    /// Build a standalone runtime.
    pub fn new(
        config: RuntimeConfig,
        gateway: Arc<dyn BankTransferGateway>,
        accounts: Arc<dyn AccountStateProvider>,
    ) -> Self {
        Self::build(config, gateway, accounts, None)
    }

    /// Build a runtime mirrored into a shared cross-context log, so other
    /// execution contexts of the same logical account observe its events.
    pub fn with_shared_log(
        config: RuntimeConfig,
        gateway: Arc<dyn BankTransferGateway>,
        accounts: Arc<dyn AccountStateProvider>,
        shared: Arc<SharedEventLog>,
    ) -> Self {
        Self::build(config, gateway, accounts, Some(shared))
    }

    fn build(
        config: RuntimeConfig,
        gateway: Arc<dyn BankTransferGateway>,
        accounts: Arc<dyn AccountStateProvider>,
        shared: Option<Arc<SharedEventLog>>,
    ) -> Self {
        let mut bus = config.event_bus.build_bus();
        if let Some(shared) = shared {
            bus = bus.with_shared_log(shared);
        }
        bus.listen_for_events();
        let bus = Arc::new(bus);

        let store = Arc::new(WorkflowStore::new(Arc::clone(&bus)));
        let schedules = Arc::new(ScheduleStore::new());
        let engine = Arc::new(
            ExecutionEngine::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                Arc::clone(&accounts),
                Arc::clone(&bus),
                config.account_id.clone(),
            )
            .with_history_limit(config.execution_history_limit),
        );
        let runner = Arc::new(ScheduleRunner::new(
            Arc::clone(&schedules),
            gateway,
            accounts,
            Arc::clone(&bus),
        ));
        let scheduler = SchedulerLoop::new(
            Arc::clone(&store),
            Arc::clone(&schedules),
            Arc::clone(&engine),
            Arc::clone(&runner),
            config.scan_interval,
        );

        Self {
            config,
            bus,
            store,
            schedules,
            engine,
            runner,
            scheduler,
        }
    }

    /* ---------- Workflow API ---------- */

    pub fn create_workflow(&self, draft: WorkflowDraft) -> Result<WorkflowDefinition, StoreError> {
        self.store.create(draft)
    }

    pub fn get_workflow(&self, id: &str) -> Result<WorkflowDefinition, StoreError> {
        self.store.get(id)
    }

    pub fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.store.list()
    }

    pub fn list_active_workflows(&self) -> Vec<WorkflowDefinition> {
        self.store.list_enabled()
    }

    pub fn update_workflow(
        &self,
        id: &str,
        patch: WorkflowPatch,
    ) -> Result<WorkflowDefinition, StoreError> {
        self.store.update(id, patch)
    }

    pub fn delete_workflow(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id)
    }

    pub async fn execute_workflow(
        &self,
        id: &str,
        payload: Option<Value>,
    ) -> Result<ExecutionId, EngineError> {
        self.engine.execute(id, payload).await
    }

    pub fn cancel_execution(&self, execution_id: &str) -> bool {
        self.engine.cancel(execution_id)
    }

    pub fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.engine.get_execution(execution_id)
    }

    pub fn list_executions(&self, workflow_id: &str) -> Vec<Execution> {
        self.engine.executions_for(workflow_id)
    }

    pub fn recent_executions(&self, limit: usize) -> Vec<Execution> {
        self.engine.recent_executions(limit)
    }

    /* ---------- Scheduling API ---------- */

    pub fn create_scheduled_transaction(
        &self,
        draft: ScheduleDraft,
    ) -> Result<ScheduledTransaction, ScheduleError> {
        self.schedules.create(draft)
    }

    pub fn list_scheduled_transactions(&self, user_id: &str) -> Vec<ScheduledTransaction> {
        self.schedules.list(user_id)
    }

    pub fn update_scheduled_transaction(
        &self,
        id: &str,
        patch: SchedulePatch,
    ) -> Result<ScheduledTransaction, ScheduleError> {
        self.schedules.update(id, patch)
    }

    pub fn delete_scheduled_transaction(&self, id: &str) -> Result<(), ScheduleError> {
        self.schedules.delete(id)
    }

    pub fn toggle_scheduled_transaction(
        &self,
        id: &str,
    ) -> Result<ScheduledTransaction, ScheduleError> {
        self.schedules.toggle(id)
    }

    pub async fn execute_scheduled_transaction_now(
        &self,
        id: &str,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        self.runner.execute_now(id).await
    }

    /* ---------- Scheduler & bus ---------- */

    /// Start the periodic due-job scan.
    pub fn start_scheduler(&self) {
        self.scheduler.start();
    }

    /// Stop the periodic scan; dispatched jobs keep running.
    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    /// Run one scan deterministically (tests, manual drains).
    pub fn tick_scheduler(&self, now: chrono::DateTime<chrono::Utc>) -> TickReport {
        self.scheduler.tick_once(now)
    }

    /// Subscribe to live lifecycle events.
    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Replay retained events with sequence strictly greater than `sequence`.
    pub fn replay_since(&self, sequence: u64) -> Vec<EventEnvelope> {
        self.bus.replay_since(sequence)
    }

    /// The underlying propagation bus.
    pub fn bus(&self) -> &Arc<PropagationBus> {
        &self.bus
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /* ---------- Persistence ---------- */

    /// Snapshot all persisted collections: definitions, bounded execution
    /// history (oldest first), schedules, and the replay buffer.
    pub fn export_archive(&self) -> EngineArchive {
        let mut executions = self
            .engine
            .recent_executions(self.config.execution_history_limit);
        executions.reverse();
        EngineArchive {
            workflows: self
                .store
                .list()
                .iter()
                .map(PersistedWorkflow::from)
                .collect(),
            executions: executions.iter().map(PersistedExecution::from).collect(),
            schedules: self
                .schedules
                .list_all()
                .iter()
                .map(PersistedSchedule::from)
                .collect(),
            replay: self
                .bus
                .replay_since(0)
                .iter()
                .map(PersistedEnvelope::from)
                .collect(),
        }
    }

    /// Reload state from an archive into this runtime's stores. Restoring
    /// is silent: no lifecycle events are republished; observers resync
    /// through the archived replay buffer instead.
    pub fn import_archive(&self, archive: EngineArchive) -> Result<(), PersistenceError> {
        let workflows = archive
            .workflows
            .into_iter()
            .map(WorkflowDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let executions = archive
            .executions
            .into_iter()
            .map(Execution::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let schedules = archive
            .schedules
            .into_iter()
            .map(ScheduledTransaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        self.store.restore(workflows);
        self.engine.restore(executions);
        self.schedules.restore(schedules);
        Ok(())
    }
}
