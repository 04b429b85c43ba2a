//! Thread-safe state machine engine.

use super::hooks::{CleanupRegistry, HookTable};
use super::worker::Worker;
use crate::builder::StateMachineBuilder;
use crate::core::{State, StateHistory, StateTransition, TransitionTable};
use chrono::Utc;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error};

/// Callback notified with the new state after every accepted transition.
pub type Observer<S> = Arc<dyn Fn(S) + Send + Sync>;

/// Mutable engine state, guarded by the engine lock.
pub(crate) struct Inner<S: State> {
    pub(crate) current: S,
    pub(crate) sequence: u64,
    pub(crate) history: StateHistory<S>,
}

/// Observer notifications not yet delivered, in transition order.
pub(crate) struct Deliveries<S> {
    queue: VecDeque<S>,
    draining: bool,
}

impl<S> Deliveries<S> {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            draining: false,
        }
    }
}

pub(crate) struct Shared<S: State> {
    pub(crate) inner: Arc<Mutex<Inner<S>>>,
    pub(crate) table: TransitionTable<S>,
    pub(crate) hooks: HookTable<S>,
    pub(crate) cleanup: CleanupRegistry<S>,
    pub(crate) observer: Option<Observer<S>>,
    pub(crate) deliveries: Mutex<Deliveries<S>>,
    pub(crate) worker: Worker,
}

pub(crate) fn lock_inner<S: State>(inner: &Mutex<Inner<S>>) -> MutexGuard<'_, Inner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Generic finite-state-machine engine.
///
/// Holds the current state, a frozen legality table, per-state hooks and a
/// layered cleanup registry. All hook and cleanup work is serialized on one
/// worker thread owned by the engine. Handles are cheap to clone and all
/// clones drive the same machine.
///
/// The observer sees every accepted transition exactly once, in the order
/// the transitions were made, even when they are made from different
/// threads. It runs on whichever thread is delivering at the time, which
/// may be the worker, so it must not block.
///
/// Construct one through [`StateMachine::builder`].
///
/// # Example
///
/// ```rust
/// use thermal_fsm::core::{Sources, TransitionRule};
/// use thermal_fsm::engine::StateMachine;
/// use thermal_fsm::state_enum;
///
/// state_enum! {
///     enum Valve { Closed, Opening, Open }
/// }
///
/// let machine = StateMachine::builder(Valve::Closed)
///     .rule(TransitionRule::new(Valve::Opening, Sources::Only(vec![Valve::Closed])))
///     .rule(TransitionRule::new(Valve::Open, Sources::Only(vec![Valve::Opening])))
///     .rule(TransitionRule::new(Valve::Closed, Sources::Any))
///     .build()
///     .unwrap();
///
/// assert!(!machine.set_state(Valve::Open));
/// assert!(machine.set_state(Valve::Opening));
/// assert!(machine.set_state(Valve::Open));
/// assert!(!machine.set_state(Valve::Open));
/// assert_eq!(machine.current_state(), Valve::Open);
/// ```
pub struct StateMachine<S: State> {
    shared: Arc<Shared<S>>,
}

impl<S: State> Clone for StateMachine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: State> StateMachine<S> {
    /// Start building a machine that begins in `initial`.
    pub fn builder(initial: S) -> StateMachineBuilder<S> {
        StateMachineBuilder::new(initial)
    }

    pub(crate) fn from_shared(shared: Shared<S>) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Snapshot of the current state.
    pub fn current_state(&self) -> S {
        lock_inner(&self.shared.inner).current
    }

    pub fn is_state(&self, state: S) -> bool {
        self.current_state() == state
    }

    /// Attempt a transition to `target`.
    ///
    /// Returns `false` without side effects when `target` is the current
    /// state or the transition is illegal. Otherwise runs the outgoing
    /// state's pre-hook, queues cleanup for the levels being left, switches
    /// the state, queues the target's post-hook, notifies the observer and
    /// returns `true`.
    ///
    /// Must not be called from a pre-hook or a synchronized cleanup action:
    /// both already hold the engine lock.
    pub fn set_state(&self, target: S) -> bool {
        self.lock().set_state(target)
    }

    /// Hold the engine lock for a multi-step check-and-transition.
    ///
    /// Synchronized cleanup actions and other `set_state` callers wait until
    /// the returned guard is dropped.
    pub fn lock(&self) -> Critical<'_, S> {
        Critical {
            shared: &self.shared,
            guard: Some(lock_inner(&self.shared.inner)),
            changed: false,
        }
    }

    /// Queue a task on the engine worker, behind every cleanup and post-hook
    /// queued before it.
    pub fn run_on_worker<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.worker.execute(task);
    }

    /// Wait until every task queued before this call has run.
    ///
    /// Returns `false` if that takes longer than `timeout`. Calling this
    /// from the worker itself always times out.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (tx, rx) = mpsc::channel();
        self.run_on_worker(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(timeout).is_ok()
    }

    /// Copy of the retained transition log.
    pub fn history(&self) -> StateHistory<S> {
        lock_inner(&self.shared.inner).history.clone()
    }

    pub fn is_legal(&self, from: S, to: S) -> bool {
        from != to && self.shared.table.is_legal(from, to)
    }

    /// Cleanup level owed by `state`; 0 means nothing to clean up.
    pub fn cleanup_level(&self, state: S) -> usize {
        self.shared.cleanup.level(state)
    }
}

/// The engine lock, held.
///
/// Transitions made through a `Critical` behave exactly like
/// [`StateMachine::set_state`], except that observer notifications are
/// deferred until the guard is dropped and the lock released.
pub struct Critical<'a, S: State> {
    shared: &'a Shared<S>,
    guard: Option<MutexGuard<'a, Inner<S>>>,
    changed: bool,
}

impl<S: State> Critical<'_, S> {
    pub fn current_state(&self) -> S {
        match &self.guard {
            Some(inner) => inner.current,
            None => lock_inner(&self.shared.inner).current,
        }
    }

    pub fn is_state(&self, state: S) -> bool {
        self.current_state() == state
    }

    /// Attempt a transition while holding the lock. See [`StateMachine::set_state`].
    pub fn set_state(&mut self, target: S) -> bool {
        let shared = self.shared;
        let Some(inner) = self.guard.as_mut() else {
            return false;
        };

        let current = inner.current;
        if current == target {
            return false;
        }
        if !shared.table.is_legal(current, target) {
            debug!(
                from = current.name(),
                to = target.name(),
                "illegal state transition"
            );
            return false;
        }

        if let Some(pre) = shared.hooks.pre(current) {
            pre();
        }

        inner.sequence += 1;
        let transition = StateTransition {
            from: current,
            to: target,
            timestamp: Utc::now(),
            sequence: inner.sequence,
        };
        schedule_cleanup(shared, transition);

        inner.current = target;
        inner.history.record(transition);

        if let Some(post) = shared.hooks.post(target) {
            let post = Arc::clone(post);
            shared.worker.execute(move || post());
        }

        if shared.observer.is_some() {
            lock_deliveries(&shared.deliveries).queue.push_back(target);
        }

        debug!(from = current.name(), to = target.name(), "state changed");
        self.changed = true;
        true
    }
}

impl<S: State> Drop for Critical<'_, S> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if self.changed {
            deliver(self.shared);
        }
    }
}

fn schedule_cleanup<S: State>(shared: &Shared<S>, transition: StateTransition<S>) {
    let from_level = shared.cleanup.level(transition.from);
    let to_level = shared.cleanup.level(transition.to);
    if from_level <= to_level {
        return;
    }

    let actions = shared.cleanup.unwind(from_level, to_level);
    let inner = Arc::clone(&shared.inner);
    shared.worker.execute(move || {
        for (level, cleanup) in actions {
            debug!(level, from = transition.from.name(), "running cleanup");
            if cleanup.synchronize {
                let _guard = lock_inner(&inner);
                (cleanup.action)(&transition);
            } else {
                (cleanup.action)(&transition);
            }
        }
    });
}

fn lock_deliveries<S>(deliveries: &Mutex<Deliveries<S>>) -> MutexGuard<'_, Deliveries<S>> {
    deliveries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain pending notifications unless another thread already is.
///
/// Queueing happens under the engine lock, so the queue is in transition
/// order. Only one thread drains at a time, which keeps delivery in that
/// order. The observer runs with no lock held and may call back into the
/// machine.
fn deliver<S: State>(shared: &Shared<S>) {
    let Some(observer) = &shared.observer else {
        return;
    };
    let mut deliveries = lock_deliveries(&shared.deliveries);
    if deliveries.draining {
        return;
    }
    deliveries.draining = true;
    while let Some(state) = deliveries.queue.pop_front() {
        drop(deliveries);
        notify(observer, state);
        deliveries = lock_deliveries(&shared.deliveries);
    }
    deliveries.draining = false;
}

fn notify<S: State>(observer: &Observer<S>, state: S) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| observer(state)));
    if result.is_err() {
        error!(state = state.name(), "state observer panicked");
    }
}
