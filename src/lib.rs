//! # Ledgerflow: Financial Workflow Automation Engine
//!
//! Ledgerflow automates recurring financial operations (deposits,
//! withdrawals, rebalancing actions) on behalf of a user account, triggered
//! manually, on a schedule, or by external events.
//!
//! ## Core Concepts
//!
//! - **Workflows**: named, ordered sequences of typed steps
//!   (trigger → condition → action) executed as a unit
//! - **Executions**: one concrete run of a workflow, with its own
//!   step-status snapshot and terminal outcome
//! - **Schedules**: a pure calculator decides *when* a recurrence next
//!   fires; a condition gate decides *whether* it may
//! - **Propagation**: every lifecycle transition is published as a
//!   sequenced event with bounded replay, mirrored across execution contexts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ledgerflow::config::RuntimeConfig;
//! use ledgerflow::runtime::AutomationRuntime;
//! use ledgerflow::step::Step;
//! use ledgerflow::workflow::WorkflowDraft;
//! use serde_json::json;
//! # use ledgerflow::gateway::{BankTransferGateway, AccountStateProvider};
//! # async fn example(
//! #     gateway: Arc<dyn BankTransferGateway>,
//! #     accounts: Arc<dyn AccountStateProvider>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let runtime = AutomationRuntime::new(RuntimeConfig::default(), gateway, accounts);
//!
//! let workflow = runtime.create_workflow(
//!     WorkflowDraft::new("payday sweep")
//!         .with_step(Step::trigger("payday"))
//!         .with_step(
//!             Step::condition("only above buffer").with_config_entry("min_balance", json!(500.0)),
//!         )
//!         .with_step(
//!             Step::action("sweep to savings")
//!                 .with_config_entry("operation", json!("deposit"))
//!                 .with_config_entry("amount", json!(250.0)),
//!         ),
//! )?;
//!
//! let execution_id = runtime.execute_workflow(&workflow.id, None).await?;
//! let execution = runtime.get_execution(&execution_id);
//! println!("run ended: {:?}", execution.map(|e| e.status));
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! At most one execution per workflow is in flight at any time; a second
//! `execute_workflow` call for the same workflow fails immediately with
//! `AlreadyRunning`. The scheduler loop dispatches each due job as an
//! independent task, so one slow gateway call never delays detection of
//! other due jobs. The workflow store is the single writer of workflow
//! state; everything else reads through its API.
//!
//! ## Module Guide
//!
//! - [`types`] - Step/execution vocabulary and id types
//! - [`step`] / [`workflow`] - Step templates and workflow definitions
//! - [`schedule`] - Pure next-execution calculator
//! - [`conditions`] - Precondition gate over account snapshots
//! - [`gateway`] - External bank-transfer and account-state boundaries
//! - [`store`] - Single-writer table of workflow definitions
//! - [`engine`] - Step execution with outcome tracking
//! - [`scheduled`] - Recurring single-action transactions
//! - [`scheduler`] - Periodic due-job scan
//! - [`event_bus`] - Sequenced lifecycle events, replay, cross-context mirror
//! - [`persistence`] - Serde shapes and the JSON archive
//! - [`runtime`] - Top-level composition

pub mod conditions;
pub mod config;
pub mod engine;
pub mod event_bus;
pub mod gateway;
pub mod persistence;
pub mod runtime;
pub mod schedule;
pub mod scheduled;
pub mod scheduler;
pub mod step;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod utils;
pub mod workflow;
