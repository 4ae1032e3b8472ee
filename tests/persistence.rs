mod common;

use chrono::{TimeZone, Utc, Weekday};
use common::fixtures::plain_deposit_draft;
use ledgerflow::conditions::Conditions;
use ledgerflow::engine::Execution;
use ledgerflow::event_bus::{EventEnvelope, LifecycleEvent};
use ledgerflow::persistence::{
    EngineArchive, PersistedEnvelope, PersistedExecution, PersistedSchedule, PersistedStep,
    PersistedWorkflow, PersistenceError,
};
use ledgerflow::scheduled::ScheduledTransaction;
use ledgerflow::step::{Step, StepRecord};
use ledgerflow::types::{
    ExecutionStatus, Frequency, ScheduleAnchor, StepKind, StepStatus, TransactionKind, new_id,
};
use ledgerflow::utils::json_ext::JsonSerializable;
use ledgerflow::workflow::WorkflowDefinition;
use serde_json::json;

fn sample_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        id: new_id(),
        name: "sample".into(),
        description: "round trip".into(),
        enabled: true,
        steps: plain_deposit_draft(25.0).steps,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        last_executed: Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()),
        execution_count: 4,
        success_count: 3,
        success_rate: 75.0,
        next_execution: None,
    }
}

fn sample_schedule() -> ScheduledTransaction {
    ScheduledTransaction {
        id: new_id(),
        user_id: "user-1".into(),
        kind: TransactionKind::Withdrawal,
        amount: 120.0,
        currency: "EUR".into(),
        target_account: "acct-chk".into(),
        frequency: Frequency::Weekly,
        anchor: Some(ScheduleAnchor::weekly(Weekday::Fri)),
        enabled: true,
        next_execution: Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap(),
        last_execution: None,
        conditions: Some(Conditions {
            min_balance: Some(300.0),
            ..Default::default()
        }),
        created_at: Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap(),
    }
}

fn sample_execution(workflow: &WorkflowDefinition) -> Execution {
    let mut steps: Vec<StepRecord> = workflow.steps.iter().map(StepRecord::from_template).collect();
    for record in &mut steps {
        record.transition(StepStatus::Running);
        record.complete(Some(json!({"ok": true})));
    }
    Execution {
        id: new_id(),
        workflow_id: workflow.id.clone(),
        status: ExecutionStatus::Completed,
        started_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
        finished_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 5).unwrap()),
        steps,
        error: None,
    }
}

#[test]
fn workflow_round_trips_through_persisted_shape() {
    let workflow = sample_workflow();
    let persisted = PersistedWorkflow::from(&workflow);
    let restored = WorkflowDefinition::try_from(persisted).unwrap();
    assert_eq!(restored, workflow);
}

#[test]
fn execution_round_trips_through_persisted_shape() {
    let workflow = sample_workflow();
    let execution = sample_execution(&workflow);
    let persisted = PersistedExecution::from(&execution);
    let restored = Execution::try_from(persisted).unwrap();
    assert_eq!(restored, execution);
}

#[test]
fn schedule_round_trips_through_persisted_shape() {
    let schedule = sample_schedule();
    let persisted = PersistedSchedule::from(&schedule);
    assert_eq!(persisted.frequency, "weekly");
    let restored = ScheduledTransaction::try_from(persisted).unwrap();
    assert_eq!(restored, schedule);
}

#[test]
fn envelope_round_trips_through_persisted_shape() {
    let envelope = EventEnvelope {
        sequence: 42,
        recorded_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
        event: LifecycleEvent::ExecutionFailed {
            workflow_id: "wf-1".into(),
            execution_id: "ex-1".into(),
            error: "declined".into(),
        },
    };
    let persisted = PersistedEnvelope::from(&envelope);
    let restored = EventEnvelope::try_from(persisted).unwrap();
    assert_eq!(restored, envelope);
}

#[test]
fn unknown_step_kind_is_rejected_not_guessed() {
    let persisted = PersistedStep {
        id: new_id(),
        kind: "Teleport".into(),
        name: "bad".into(),
        config: Default::default(),
    };
    assert!(matches!(
        Step::try_from(persisted),
        Err(PersistenceError::UnknownStepKind(_))
    ));
}

#[test]
fn unknown_frequency_is_rejected() {
    let mut persisted = PersistedSchedule::from(&sample_schedule());
    persisted.frequency = "fortnightly".into();
    assert!(matches!(
        ScheduledTransaction::try_from(persisted),
        Err(PersistenceError::UnknownFrequency(_))
    ));
}

#[test]
fn invalid_timestamps_are_rejected() {
    let mut persisted = PersistedWorkflow::from(&sample_workflow());
    persisted.created_at = "yesterday-ish".into();
    assert!(matches!(
        WorkflowDefinition::try_from(persisted),
        Err(PersistenceError::InvalidTimestamp { field: "created_at", .. })
    ));
}

#[test]
fn persisted_shapes_serialize_via_json_helper() {
    let persisted = PersistedWorkflow::from(&sample_workflow());
    let json = persisted.to_json_string().unwrap();
    let back = PersistedWorkflow::from_json_str(&json).unwrap();
    assert_eq!(back, persisted);
}

#[test]
fn archive_saves_and_loads_all_collections() {
    let workflow = sample_workflow();
    let execution = sample_execution(&workflow);
    let schedule = sample_schedule();
    let envelope = EventEnvelope {
        sequence: 1,
        recorded_at: Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap(),
        event: LifecycleEvent::WorkflowCreated {
            workflow_id: workflow.id.clone(),
        },
    };

    let archive = EngineArchive {
        workflows: vec![PersistedWorkflow::from(&workflow)],
        executions: vec![PersistedExecution::from(&execution)],
        schedules: vec![PersistedSchedule::from(&schedule)],
        replay: vec![PersistedEnvelope::from(&envelope)],
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledgerflow-state.json");
    archive.save_to(&path).unwrap();

    let loaded = EngineArchive::load_from(&path).unwrap();
    assert_eq!(loaded, archive);
    assert_eq!(loaded.replay[0].sequence, 1);
}

#[test]
fn loading_a_missing_archive_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    assert!(matches!(
        EngineArchive::load_from(&missing),
        Err(PersistenceError::Io { .. })
    ));
}

#[test]
fn step_kind_encoding_survives_the_wire() {
    for kind in [StepKind::Trigger, StepKind::Condition, StepKind::Action] {
        let step = Step::new(kind, "probe");
        let persisted = PersistedStep::from(&step);
        assert_eq!(Step::try_from(persisted).unwrap().kind, kind);
    }
}
