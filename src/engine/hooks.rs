//! Per-state hook slots and the layered cleanup registry.

use crate::core::{State, StateTransition};
use std::collections::HashMap;
use std::sync::Arc;

/// A lifecycle hook. Pre-hooks run on the caller's thread with the engine
/// lock held; post-hooks run on the worker.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Releases the resources acquired for one cleanup level.
pub type CleanupFn<S> = Arc<dyn Fn(&StateTransition<S>) + Send + Sync>;

/// Frozen hook slots, at most one pre- and one post-hook per state.
pub(crate) struct HookTable<S: State> {
    pub(crate) pre: HashMap<S, Hook>,
    pub(crate) post: HashMap<S, Hook>,
}

impl<S: State> HookTable<S> {
    pub(crate) fn pre(&self, state: S) -> Option<&Hook> {
        self.pre.get(&state)
    }

    pub(crate) fn post(&self, state: S) -> Option<&Hook> {
        self.post.get(&state)
    }
}

/// One registered cleanup level.
#[derive(Clone)]
pub(crate) struct CleanupAction<S: State> {
    pub(crate) action: CleanupFn<S>,
    /// Re-acquire the engine lock around the action.
    pub(crate) synchronize: bool,
}

/// Cleanup actions indexed by level (level `k` lives at index `k - 1`)
/// plus the level owed by each state. States without an entry owe level 0.
pub(crate) struct CleanupRegistry<S: State> {
    pub(crate) actions: Vec<CleanupAction<S>>,
    pub(crate) levels: HashMap<S, usize>,
}

impl<S: State> CleanupRegistry<S> {
    pub(crate) fn level(&self, state: S) -> usize {
        self.levels.get(&state).copied().unwrap_or(0)
    }

    /// Actions owed when moving from level `from` down to level `to`,
    /// highest level first. Empty unless `from > to`.
    pub(crate) fn unwind(&self, from: usize, to: usize) -> Vec<(usize, CleanupAction<S>)> {
        (to + 1..=from)
            .rev()
            .filter_map(|level| {
                self.actions
                    .get(level - 1)
                    .map(|action| (level, action.clone()))
            })
            .collect()
    }
}
