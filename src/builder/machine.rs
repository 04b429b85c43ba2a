//! Builder for constructing state machines.

use crate::builder::error::{BuildError, HookKind};
use crate::core::{State, StateHistory, StateTransition, TransitionRule, TransitionTable};
use crate::core::DEFAULT_HISTORY_CAPACITY;
use crate::engine::{
    CleanupAction, CleanupFn, CleanupRegistry, Deliveries, Hook, HookTable, Inner, Observer,
    Shared, StateMachine, Worker,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<BuildError>>;

struct CleanupRegistration<S: State> {
    level: usize,
    synchronize: bool,
    states: Vec<S>,
    action: CleanupFn<S>,
}

/// Builder for constructing a [`StateMachine`] with a fluent API.
///
/// Registrations are only recorded; [`build`](Self::build) validates all of
/// them at once and reports every violation. After `build` the rules, hooks
/// and cleanup registry are frozen.
pub struct StateMachineBuilder<S: State> {
    initial: S,
    rules: Vec<TransitionRule<S>>,
    pre_hooks: Vec<(S, Hook)>,
    post_hooks: Vec<(S, Hook)>,
    cleanups: Vec<CleanupRegistration<S>>,
    observer: Option<Observer<S>>,
    history_capacity: usize,
    worker_name: String,
}

impl<S: State> StateMachineBuilder<S> {
    /// Create a new builder for a machine starting in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            rules: Vec::new(),
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            cleanups: Vec::new(),
            observer: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            worker_name: "state-worker".to_string(),
        }
    }

    /// Declare the legal sources of one destination state.
    pub fn rule(mut self, rule: TransitionRule<S>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Declare several rules at once.
    pub fn rules(mut self, rules: impl IntoIterator<Item = TransitionRule<S>>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Run `hook` synchronously, under the engine lock, just before leaving `state`.
    pub fn pre_hook<F>(mut self, state: S, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.pre_hooks.push((state, Arc::new(hook)));
        self
    }

    /// Run `hook` on the worker after `state` has been entered.
    pub fn post_hook<F>(mut self, state: S, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.post_hooks.push((state, Arc::new(hook)));
        self
    }

    /// Register the cleanup action for `level` and assign `states` to it.
    ///
    /// Levels must be registered as 1, 2, 3, ... in call order. When `synchronize`
    /// is set the action runs with the engine lock held.
    pub fn cleanup<F>(
        mut self,
        level: usize,
        synchronize: bool,
        states: impl IntoIterator<Item = S>,
        action: F,
    ) -> Self
    where
        F: Fn(&StateTransition<S>) + Send + Sync + 'static,
    {
        self.cleanups.push(CleanupRegistration {
            level,
            synchronize,
            states: states.into_iter().collect(),
            action: Arc::new(action),
        });
        self
    }

    /// Notify `observer` with the new state after every accepted transition.
    pub fn on_state_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(S) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Number of transitions kept in the engine's history.
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Thread name of the engine worker.
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Validate every registration and build the machine.
    pub fn build(self) -> Result<StateMachine<S>, BuildError> {
        let checks = vec![
            check_rules(&self.rules),
            check_hooks(&self.pre_hooks, HookKind::Pre),
            check_hooks(&self.post_hooks, HookKind::Post),
            check_cleanup_levels(&self.cleanups),
        ];

        if let Validation::Failure(errors) = Validation::all_vec(checks) {
            return Err(BuildError::from_violations(errors.iter().cloned().collect()));
        }

        let worker = Worker::spawn(&self.worker_name)
            .map_err(|e| BuildError::WorkerSpawn(e.to_string()))?;

        let mut levels = HashMap::new();
        let mut actions = Vec::with_capacity(self.cleanups.len());
        for registration in self.cleanups {
            for state in registration.states {
                levels.insert(state, registration.level);
            }
            actions.push(CleanupAction {
                action: registration.action,
                synchronize: registration.synchronize,
            });
        }

        Ok(StateMachine::from_shared(Shared {
            inner: Arc::new(Mutex::new(Inner {
                current: self.initial,
                sequence: 0,
                history: StateHistory::with_capacity(self.history_capacity),
            })),
            table: TransitionTable::from_rules(self.rules),
            hooks: HookTable {
                pre: self.pre_hooks.into_iter().collect(),
                post: self.post_hooks.into_iter().collect(),
            },
            cleanup: CleanupRegistry { actions, levels },
            observer: self.observer,
            deliveries: Mutex::new(Deliveries::new()),
            worker,
        }))
    }
}

fn check_rules<S: State>(rules: &[TransitionRule<S>]) -> Check {
    let mut seen = Vec::with_capacity(rules.len());
    let checks = rules
        .iter()
        .map(|rule| {
            if seen.contains(&rule.to) {
                Validation::fail(BuildError::DuplicateRule {
                    state: rule.to.name().to_string(),
                })
            } else {
                seen.push(rule.to);
                Validation::success(())
            }
        })
        .collect::<Vec<_>>();
    Validation::all_vec(checks).map(|_| ())
}

fn check_hooks<S: State>(hooks: &[(S, Hook)], kind: HookKind) -> Check {
    let mut seen = Vec::with_capacity(hooks.len());
    let checks = hooks
        .iter()
        .map(|(state, _)| {
            if seen.contains(state) {
                Validation::fail(BuildError::DuplicateHook {
                    state: state.name().to_string(),
                    kind,
                })
            } else {
                seen.push(*state);
                Validation::success(())
            }
        })
        .collect::<Vec<_>>();
    Validation::all_vec(checks).map(|_| ())
}

fn check_cleanup_levels<S: State>(cleanups: &[CleanupRegistration<S>]) -> Check {
    let mut assigned: HashMap<S, usize> = HashMap::new();
    let mut checks = Vec::new();

    for (index, registration) in cleanups.iter().enumerate() {
        let expected = index + 1;
        checks.push(if registration.level == expected {
            Validation::success(())
        } else {
            Validation::fail(BuildError::CleanupLevelOutOfOrder {
                expected,
                found: registration.level,
            })
        });

        for state in &registration.states {
            checks.push(match assigned.get(state) {
                Some(&existing) => Validation::fail(BuildError::CleanupLevelConflict {
                    state: state.name().to_string(),
                    existing,
                    requested: registration.level,
                }),
                None => {
                    assigned.insert(*state, registration.level);
                    Validation::success(())
                }
            });
        }
    }

    Validation::all_vec(checks).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Sources;
    use crate::state_enum;

    state_enum! {
        enum TestState {
            Initial,
            Processing,
            Complete,
            Failed,
        }
        final: [Complete, Failed]
        error: [Failed]
    }

    fn base() -> StateMachineBuilder<TestState> {
        StateMachineBuilder::new(TestState::Initial)
            .rule(TransitionRule::new(
                TestState::Processing,
                Sources::Only(vec![TestState::Initial]),
            ))
            .rule(TransitionRule::new(TestState::Initial, Sources::Any))
    }

    #[test]
    fn builder_accepts_minimal_machine() {
        let machine = base().build().unwrap();
        assert_eq!(machine.current_state(), TestState::Initial);
    }

    #[test]
    fn builder_rejects_out_of_order_levels() {
        let result = base()
            .cleanup(2, false, [TestState::Processing], |_| {})
            .build();

        assert!(matches!(
            result,
            Err(BuildError::CleanupLevelOutOfOrder {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn builder_rejects_state_on_two_levels() {
        let result = base()
            .cleanup(1, false, [TestState::Processing], |_| {})
            .cleanup(2, true, [TestState::Processing], |_| {})
            .build();

        assert!(matches!(
            result,
            Err(BuildError::CleanupLevelConflict {
                existing: 1,
                requested: 2,
                ..
            })
        ));
    }

    #[test]
    fn builder_rejects_duplicate_hooks() {
        let result = base()
            .post_hook(TestState::Processing, || {})
            .post_hook(TestState::Processing, || {})
            .build();

        assert!(matches!(
            result,
            Err(BuildError::DuplicateHook {
                kind: HookKind::Post,
                ..
            })
        ));
    }

    #[test]
    fn builder_accumulates_all_violations() {
        let result = base()
            .rule(TransitionRule::new(TestState::Initial, Sources::none()))
            .pre_hook(TestState::Initial, || {})
            .pre_hook(TestState::Initial, || {})
            .cleanup(3, false, [TestState::Complete], |_| {})
            .build();

        match result {
            Err(BuildError::Multiple(errors)) => {
                assert_eq!(errors.len(), 3);
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, BuildError::DuplicateRule { .. })));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, BuildError::DuplicateHook { .. })));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, BuildError::CleanupLevelOutOfOrder { .. })));
            }
            Err(other) => panic!("expected multiple violations, got {other}"),
            Ok(_) => panic!("expected build failure"),
        }
    }

    #[test]
    fn cleanup_levels_are_assigned_to_states() {
        let machine = base()
            .cleanup(1, false, [TestState::Processing], |_| {})
            .cleanup(2, true, [TestState::Complete, TestState::Failed], |_| {})
            .build()
            .unwrap();

        assert_eq!(machine.cleanup_level(TestState::Initial), 0);
        assert_eq!(machine.cleanup_level(TestState::Processing), 1);
        assert_eq!(machine.cleanup_level(TestState::Failed), 2);
    }
}
