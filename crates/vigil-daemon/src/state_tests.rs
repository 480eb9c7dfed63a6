use super::*;
use super::LifecycleState::*;

const TABLE: &[(LifecycleState, &[LifecycleState])] = &[
    (Initializing, &[Active, Idle, Sleeping, StopRequested, Stopping]),
    (Sleeping, &[Active, Idle, StopRequested, Stopping]),
    (Idle, &[Active, Sleeping, StopRequested, Stopping]),
    (Active, &[Idle, Sleeping, StopRequested, Stopping]),
    (StopRequested, &[Stopping, Stopped]),
    (Stopping, &[Stopped]),
    (Stopped, &[]),
];

/// Drive a fresh cell into `target` along legal transitions.
fn cell_in(target: LifecycleState, policy: TransitionPolicy) -> LifecycleCell {
    let cell = LifecycleCell::new(policy);
    let path: &[LifecycleState] = match target {
        Initializing => &[],
        Sleeping => &[Sleeping],
        Idle => &[Idle],
        Active => &[Active],
        StopRequested => &[StopRequested],
        Stopping => &[Stopping],
        Stopped => &[Stopping, Stopped],
    };
    for step in path {
        assert!(cell.set(*step).unwrap().is_changed());
    }
    assert_eq!(cell.get(), target);
    cell
}

#[test]
fn test_discriminants() {
    assert_eq!(Initializing as u8, 0x01);
    assert_eq!(Stopped as u8, 0x07);
    for state in LifecycleState::ALL {
        assert_eq!(LifecycleState::try_from(state as u8).unwrap(), state);
    }
}

#[test]
fn test_display_and_parse() {
    assert_eq!(StopRequested.to_string(), "stop_requested");
    assert_eq!("Sleeping".parse::<LifecycleState>().unwrap(), Sleeping);
    assert_eq!(" stopped ".parse::<LifecycleState>().unwrap(), Stopped);
    assert!("napping".parse::<LifecycleState>().is_err());
}

#[test]
fn test_table_matches_allowed_transitions() {
    for (from, allowed) in TABLE {
        for to in LifecycleState::ALL {
            assert_eq!(
                from.can_transition_to(to),
                allowed.contains(&to),
                "{} -> {}",
                from,
                to
            );
        }
    }
}

#[test]
fn test_every_pair_lenient() {
    for (from, allowed) in TABLE {
        for to in LifecycleState::ALL {
            let cell = cell_in(*from, TransitionPolicy::Lenient);
            let outcome = cell.set(to).unwrap();

            if to == *from {
                assert_eq!(outcome, Transition::Unchanged(*from));
                assert_eq!(cell.get(), *from);
            } else if allowed.contains(&to) {
                assert_eq!(outcome, Transition::Changed { from: *from, to });
                assert_eq!(cell.get(), to);
            } else {
                assert_eq!(outcome, Transition::Rejected { from: *from, to });
                assert_eq!(cell.get(), *from, "{} -> {} must be ignored", from, to);
            }
        }
    }
}

#[test]
fn test_every_illegal_pair_strict() {
    for (from, allowed) in TABLE {
        for to in LifecycleState::ALL {
            if to == *from || allowed.contains(&to) {
                continue;
            }
            let cell = cell_in(*from, TransitionPolicy::Strict);
            let err = cell.set(to).unwrap_err();
            assert_eq!(err, IllegalTransition { from: *from, to });
            assert_eq!(cell.get(), *from);
        }
    }
}

#[test]
fn test_same_state_is_not_a_rejection() {
    for state in LifecycleState::ALL {
        let cell = cell_in(state, TransitionPolicy::Strict);
        let outcome = cell.set(state).unwrap();
        assert!(!outcome.is_rejected());
        assert!(!outcome.is_changed());
        assert_eq!(outcome.current(), state);
    }
}

#[test]
fn test_active_while_stopping_is_ignored() {
    let cell = cell_in(Stopping, TransitionPolicy::Lenient);
    let outcome = cell.set(Active).unwrap();

    assert!(outcome.is_rejected());
    assert_eq!(cell.get(), Stopping);
}

#[test]
fn test_set_raw() {
    let cell = LifecycleCell::default();
    assert!(cell.set_raw(0x02).unwrap().is_changed());
    assert_eq!(cell.get(), Sleeping);

    let err = cell.set_raw(0x09).unwrap_err();
    assert!(matches!(err, crate::DaemonError::InvalidState(_)));
    assert_eq!(cell.get(), Sleeping);

    assert!(matches!(
        cell.set_raw(0x00),
        Err(crate::DaemonError::InvalidState(_))
    ));
}

#[test]
fn test_set_raw_strict_illegal() {
    let cell = cell_in(Stopped, TransitionPolicy::Strict);
    assert!(matches!(
        cell.set_raw(Active as u8),
        Err(crate::DaemonError::IllegalTransition(_))
    ));
}

#[test]
fn test_policy_can_change() {
    let cell = cell_in(Stopped, TransitionPolicy::Lenient);
    assert!(cell.set(Active).is_ok());

    cell.set_policy(TransitionPolicy::Strict);
    assert_eq!(cell.policy(), TransitionPolicy::Strict);
    assert!(cell.set(Active).is_err());
}

#[test]
fn test_predicates() {
    assert!(Initializing.is_running());
    assert!(Idle.is_running());
    assert!(Active.is_running());
    assert!(!Sleeping.is_running());
    assert!(!StopRequested.is_running());

    assert!(Sleeping.is_sleeping());
    assert!(Idle.is_idle());
    assert!(Active.is_active());
    assert!(StopRequested.is_waiting_to_stop());
    assert!(Stopping.is_stopping());
    assert!(Stopped.is_stopped());

    assert!(Stopped.is_terminal());
    assert!(!Stopping.is_terminal());
}

#[tokio::test]
async fn test_changes_are_published() {
    let cell = LifecycleCell::default();
    let mut rx = cell.subscribe();

    cell.set(Active).unwrap();
    cell.set(Active).unwrap();
    cell.set(Initializing).unwrap();
    cell.set_with_intent(StopRequested, Some(Intent::Stop)).unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!((first.previous, first.current), (Initializing, Active));
    assert_eq!(first.intent, None);

    // The no-op and the rejected write publish nothing.
    let second = rx.recv().await.unwrap();
    assert_eq!((second.previous, second.current), (Active, StopRequested));
    assert_eq!(second.intent, Some(Intent::Stop));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_state_change_serializes() {
    let change = StateChange {
        previous: Sleeping,
        current: Active,
        intent: None,
        at: Utc::now(),
    };
    let json = serde_json::to_value(&change).unwrap();
    assert_eq!(json["previous"], "sleeping");
    assert_eq!(json["current"], "active");
    assert!(json["intent"].is_null());
}
