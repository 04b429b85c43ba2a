//! Property-based tests for the engine and the range selector.
//!
//! These tests use proptest to check the engine against a simple model of
//! the camera legality table across many random transition sequences.

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thermal_fsm::core::{State, StateTransition, TransitionTable};
use thermal_fsm::device::{CameraState, CONNECTION_STATES, DISCOVERY_STATES, STREAM_STATES};
use thermal_fsm::range::{match_range, TemperatureRange};
use thermal_fsm::StateMachine;

prop_compose! {
    fn arbitrary_state()(index in 0..CameraState::ALL.len()) -> CameraState {
        CameraState::ALL[index]
    }
}

prop_compose! {
    fn arbitrary_range()(low in -40i32..200, width in 0i32..400) -> TemperatureRange {
        TemperatureRange::new(f64::from(low), f64::from(low + width))
    }
}

fn level(state: CameraState) -> usize {
    if DISCOVERY_STATES.contains(&state) {
        1
    } else if CONNECTION_STATES.contains(&state) {
        2
    } else if STREAM_STATES.contains(&state) {
        3
    } else {
        0
    }
}

fn coverage(range: &TemperatureRange, min: i32, max: i32) -> i32 {
    let (low, high) = (range.low as i32, range.high as i32);
    if low > max || high < min {
        return 0;
    }
    (max - min) - (low - min).max(0) - (max - high).max(0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engine_follows_legality_table(targets in prop::collection::vec(arbitrary_state(), 1..40)) {
        let table = TransitionTable::from_rules(CameraState::rules());
        let pre_hooks = Arc::new(AtomicUsize::new(0));

        let mut builder = StateMachine::builder(CameraState::Idle).rules(CameraState::rules());
        for &state in CameraState::ALL {
            let counter = Arc::clone(&pre_hooks);
            builder = builder.pre_hook(state, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        let machine = builder.build().unwrap();

        let mut current = CameraState::Idle;
        let mut accepted = Vec::new();
        for target in targets {
            let expected = current != target && table.is_legal(current, target);
            prop_assert_eq!(machine.set_state(target), expected);
            if expected {
                accepted.push(target);
                current = target;
            }
            prop_assert_eq!(machine.current_state(), current);
        }

        prop_assert_eq!(pre_hooks.load(Ordering::SeqCst), accepted.len());
        let history = machine.history();
        let recorded: Vec<CameraState> = history.transitions().map(|t| t.to).collect();
        prop_assert_eq!(recorded, accepted);
    }

    #[test]
    fn self_transition_never_records(state in arbitrary_state()) {
        let machine = StateMachine::builder(state)
            .rules(CameraState::rules())
            .build()
            .unwrap();

        prop_assert!(!machine.set_state(state));
        prop_assert!(machine.history().is_empty());
        prop_assert!(!machine.is_legal(state, state));
    }

    #[test]
    fn cleanup_unwinds_exactly_the_levels_left(
        targets in prop::collection::vec(arbitrary_state(), 1..40)
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recorder = |level: usize| {
            let log = Arc::clone(&log);
            move |_: &StateTransition<CameraState>| log.lock().unwrap().push(level)
        };

        let machine = StateMachine::builder(CameraState::Idle)
            .rules(CameraState::rules())
            .cleanup(1, false, DISCOVERY_STATES, recorder(1))
            .cleanup(2, true, CONNECTION_STATES, recorder(2))
            .cleanup(3, true, STREAM_STATES, recorder(3))
            .build()
            .unwrap();

        let mut expected = Vec::new();
        for target in targets {
            let from = machine.current_state();
            if machine.set_state(target) {
                expected.extend((level(target) + 1..=level(from)).rev());
            }
        }

        prop_assert!(machine.flush(Duration::from_secs(5)));
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
    }

    #[test]
    fn history_is_bounded_and_ordered(
        capacity in 1usize..8,
        targets in prop::collection::vec(arbitrary_state(), 1..40)
    ) {
        let machine = StateMachine::builder(CameraState::Idle)
            .rules(CameraState::rules())
            .history_capacity(capacity)
            .build()
            .unwrap();
        for target in targets {
            machine.set_state(target);
        }

        let history = machine.history();
        prop_assert!(history.len() <= capacity);
        let sequences: Vec<u64> = history.transitions().map(|t| t.sequence).collect();
        prop_assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
        if let Some(last) = history.last() {
            prop_assert_eq!(last.to, machine.current_state());
        }
    }

    #[test]
    fn selected_range_has_maximal_coverage(
        ranges in prop::collection::vec(arbitrary_range(), 2..8),
        min in -20i32..20,
        width in 1i32..60
    ) {
        let max = min + width;
        let index = match_range(&ranges, min, max).unwrap();
        prop_assert!(index < ranges.len());

        let chosen = coverage(&ranges[index], min, max);
        prop_assert!(ranges.iter().all(|range| coverage(range, min, max) <= chosen));
    }

    #[test]
    fn exact_target_listed_first_always_wins(
        others in prop::collection::vec(arbitrary_range(), 1..8),
        min in -20i32..20,
        width in 1i32..60
    ) {
        let max = min + width;
        let mut ranges = vec![TemperatureRange::new(f64::from(min), f64::from(max))];
        ranges.extend(others);
        prop_assert_eq!(match_range(&ranges, min, max), Some(0));
    }

    #[test]
    fn state_names_match_debug(state in arbitrary_state()) {
        prop_assert_eq!(state.name(), format!("{state:?}"));
    }
}
