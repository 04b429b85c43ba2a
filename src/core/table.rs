//! Declarative transition legality.
//!
//! A table is assembled from one rule per destination state, each naming the
//! set of states it may be entered from. The table never changes after the
//! engine is built.

use super::state::State;
use std::collections::HashMap;

/// The set of states a destination may be entered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sources<S: State> {
    /// Reachable from every state.
    Any,
    /// Reachable from every state except the listed ones.
    AnyExcept(Vec<S>),
    /// Reachable only from the listed states.
    Only(Vec<S>),
}

impl<S: State> Sources<S> {
    /// Unreachable from anywhere; the destination can only be an initial state.
    pub fn none() -> Self {
        Sources::Only(Vec::new())
    }

    pub fn contains(&self, from: S) -> bool {
        match self {
            Sources::Any => true,
            Sources::AnyExcept(excluded) => !excluded.contains(&from),
            Sources::Only(allowed) => allowed.contains(&from),
        }
    }
}

/// Legal sources for a single destination state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRule<S: State> {
    pub to: S,
    pub from: Sources<S>,
}

impl<S: State> TransitionRule<S> {
    pub fn new(to: S, from: Sources<S>) -> Self {
        Self { to, from }
    }
}

/// Immutable legality table built from [`TransitionRule`]s.
///
/// A destination without a rule is unreachable. Self-transitions are never
/// consulted here: the engine rejects them as no-ops before the lookup.
///
/// # Example
///
/// ```rust
/// use thermal_fsm::core::{Sources, TransitionRule, TransitionTable};
/// use thermal_fsm::device::CameraState;
///
/// let table = TransitionTable::from_rules(vec![
///     TransitionRule::new(CameraState::Discovering, Sources::Only(vec![CameraState::Idle])),
///     TransitionRule::new(CameraState::Idle, Sources::Any),
/// ]);
///
/// assert!(table.is_legal(CameraState::Idle, CameraState::Discovering));
/// assert!(table.is_legal(CameraState::Streaming, CameraState::Idle));
/// assert!(!table.is_legal(CameraState::Streaming, CameraState::Discovering));
/// ```
#[derive(Clone, Debug)]
pub struct TransitionTable<S: State> {
    rules: HashMap<S, Sources<S>>,
}

impl<S: State> TransitionTable<S> {
    /// Build a table. When a destination appears twice the later rule wins;
    /// the builder rejects duplicates before getting here.
    pub fn from_rules(rules: impl IntoIterator<Item = TransitionRule<S>>) -> Self {
        Self {
            rules: rules.into_iter().map(|rule| (rule.to, rule.from)).collect(),
        }
    }

    pub fn is_legal(&self, from: S, to: S) -> bool {
        self.rules
            .get(&to)
            .is_some_and(|sources| sources.contains(from))
    }

    /// The rule registered for `to`, if any.
    pub fn sources(&self, to: S) -> Option<&Sources<S>> {
        self.rules.get(&to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_enum;

    state_enum! {
        enum Door {
            Closed,
            Open,
            Locked,
            Broken,
        }
        final: [Broken]
    }

    fn table() -> TransitionTable<Door> {
        TransitionTable::from_rules(vec![
            TransitionRule::new(Door::Open, Sources::Only(vec![Door::Closed])),
            TransitionRule::new(Door::Closed, Sources::AnyExcept(vec![Door::Broken])),
            TransitionRule::new(Door::Locked, Sources::Only(vec![Door::Closed])),
            TransitionRule::new(Door::Broken, Sources::Any),
        ])
    }

    #[test]
    fn only_sources_are_exact() {
        let table = table();
        assert!(table.is_legal(Door::Closed, Door::Open));
        assert!(!table.is_legal(Door::Locked, Door::Open));
    }

    #[test]
    fn any_except_excludes_listed_states() {
        let table = table();
        assert!(table.is_legal(Door::Open, Door::Closed));
        assert!(table.is_legal(Door::Locked, Door::Closed));
        assert!(!table.is_legal(Door::Broken, Door::Closed));
    }

    #[test]
    fn any_reaches_from_everywhere() {
        let table = table();
        for from in Door::ALL {
            assert!(table.is_legal(*from, Door::Broken));
        }
    }

    #[test]
    fn destination_without_rule_is_unreachable() {
        let table = TransitionTable::from_rules(vec![TransitionRule::new(
            Door::Open,
            Sources::Any,
        )]);
        assert!(!table.is_legal(Door::Open, Door::Closed));
        assert!(table.sources(Door::Closed).is_none());
        assert!(!Sources::<Door>::none().contains(Door::Open));
    }
}
