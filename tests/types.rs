use ledgerflow::types::{ExecutionStatus, Frequency, StepKind, StepStatus, new_id};

#[test]
fn step_kind_encoding_round_trips() {
    for kind in [StepKind::Trigger, StepKind::Condition, StepKind::Action] {
        assert_eq!(StepKind::decode(kind.encode()), Some(kind));
    }
    assert_eq!(StepKind::decode("Teleport"), None);
    assert_eq!(StepKind::decode(""), None);
}

#[test]
fn step_transitions_are_monotonic() {
    use StepStatus::*;

    let legal = [(Pending, Running), (Running, Completed), (Running, Failed)];
    for (from, to) in legal {
        assert!(from.can_transition(to), "{from} -> {to} should be legal");
    }

    let statuses = [Pending, Running, Completed, Failed];
    for from in statuses {
        for to in statuses {
            let expected = legal.contains(&(from, to));
            assert_eq!(
                from.can_transition(to),
                expected,
                "{from} -> {to} legality mismatch"
            );
        }
    }

    assert!(!Pending.is_terminal());
    assert!(!Running.is_terminal());
    assert!(Completed.is_terminal());
    assert!(Failed.is_terminal());
}

#[test]
fn running_is_the_only_non_terminal_execution_status() {
    assert!(!ExecutionStatus::Running.is_terminal());
    for status in [
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Skipped,
        ExecutionStatus::Cancelled,
    ] {
        assert!(status.is_terminal(), "{status} should be terminal");
    }
}

#[test]
fn frequency_encoding_round_trips() {
    for frequency in [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::Quarterly,
    ] {
        assert_eq!(Frequency::decode(frequency.encode()), Some(frequency));
    }
    assert_eq!(Frequency::decode("fortnightly"), None);
}

#[test]
fn ids_are_unique() {
    let a = new_id();
    let b = new_id();
    assert_ne!(a, b);
    assert!(!a.is_empty());
}
