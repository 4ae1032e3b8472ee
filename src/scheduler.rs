//! Periodic driver that scans for due jobs and dispatches them.
//!
//! The [`SchedulerLoop`] runs one fixed-interval tokio task. Each tick it
//! computes "now", collects due enabled scheduled transactions and due
//! enabled recurring workflows, and dispatches every due item as its own
//! spawned task, so a slow gateway call in one job can never delay detection
//! of the others, and one job's failure is logged and isolated, never
//! halting the loop.
//!
//! Advancement policy: a job's `next_execution` always moves forward when
//! the job is dispatched, whether the attempt then executes, is denied by
//! its gate, or fails. A persistently false condition therefore skips whole
//! cycles instead of being retried on every scan.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task;

use crate::engine::ExecutionEngine;
use crate::schedule::next_execution;
use crate::scheduled::{ScheduleRunner, ScheduleStore};
use crate::store::WorkflowStore;

/// Default scan interval.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// What one scan dispatched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub schedules_dispatched: usize,
    pub workflows_dispatched: usize,
}

/// Fixed-interval driver over the workflow store and schedule store.
pub struct SchedulerLoop {
    inner: Arc<LoopInner>,
    listener: Mutex<Option<LoopState>>,
}

struct LoopInner {
    store: Arc<WorkflowStore>,
    schedules: Arc<ScheduleStore>,
    engine: Arc<ExecutionEngine>,
    runner: Arc<ScheduleRunner>,
    interval: Duration,
}

struct LoopState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<WorkflowStore>,
        schedules: Arc<ScheduleStore>,
        engine: Arc<ExecutionEngine>,
        runner: Arc<ScheduleRunner>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                store,
                schedules,
                engine,
                runner,
                interval,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Spawn the periodic scan task. Idempotent: calling multiple times has
    /// no effect.
    pub fn start(&self) {
        let mut guard = self.listener.lock().expect("scheduler state poisoned");
        if guard.is_some() {
            return; // Already running
        }

        let inner = Arc::clone(&self.inner);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = task::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let report = inner.tick_once(Utc::now());
                        tracing::debug!(
                            schedules = report.schedules_dispatched,
                            workflows = report.workflows_dispatched,
                            "scheduler tick"
                        );
                    }
                }
            }
        });

        *guard = Some(LoopState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the scan task. Jobs already dispatched keep running.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("scheduler state poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }

    /// Run exactly one scan at the given instant. Dispatches due jobs as
    /// independent tasks and returns immediately; tests drive this directly
    /// for deterministic scans.
    pub fn tick_once(&self, now: DateTime<Utc>) -> TickReport {
        self.inner.tick_once(now)
    }
}

impl Drop for SchedulerLoop {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock()
            && let Some(state) = guard.take()
        {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

impl LoopInner {
    fn tick_once(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        for schedule in self.schedules.due(now) {
            report.schedules_dispatched += 1;
            let runner = Arc::clone(&self.runner);
            let schedule_id = schedule.id.clone();
            task::spawn(async move {
                match runner.execute_now(&schedule_id).await {
                    Ok(outcome) => {
                        tracing::debug!(schedule = %schedule_id, ?outcome, "scheduled transaction attempted");
                    }
                    Err(err) => {
                        // Isolated: the failure is this job's alone.
                        tracing::warn!(schedule = %schedule_id, error = %err, "scheduled transaction not attempted");
                    }
                }
            });
        }

        for workflow in self.store.due_recurring(now) {
            let Some(schedule) = workflow.trigger_schedule() else {
                // A due workflow without a readable recurrence would re-fire
                // on every scan; leave it alone until its steps are fixed.
                tracing::warn!(workflow = %workflow.id, "due workflow has no readable recurrence");
                continue;
            };
            report.workflows_dispatched += 1;
            // Advance before dispatch so a long run cannot double-fire on
            // the next scan.
            let next = next_execution(schedule.frequency, Some(&schedule.anchor), now);
            if let Err(err) = self.store.advance_schedule(&workflow.id, next) {
                tracing::warn!(workflow = %workflow.id, error = %err, "schedule not advanced");
                continue;
            }
            let engine = Arc::clone(&self.engine);
            let workflow_id = workflow.id.clone();
            task::spawn(async move {
                match engine.execute(&workflow_id, None).await {
                    Ok(execution_id) => {
                        tracing::debug!(workflow = %workflow_id, execution = %execution_id, "recurring run finished");
                    }
                    Err(err) => {
                        // Disabled mid-cycle or still running from the last
                        // fire; skip this cycle.
                        tracing::warn!(workflow = %workflow_id, error = %err, "recurring run not started");
                    }
                }
            });
        }

        report
    }
}
