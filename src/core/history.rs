//! State transition history tracking.
//!
//! Every accepted transition is recorded as a flat event log. The log is
//! bounded: a device that runs for days would otherwise grow it forever, so
//! the oldest records are evicted once the capacity is reached.

use super::state::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of transitions retained by a [`StateHistory`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Record of a single state transition.
///
/// Cleanup actions receive the record of the transition that triggered them,
/// so they can branch on where the machine is heading.
///
/// # Example
///
/// ```rust
/// use thermal_fsm::core::StateTransition;
/// use thermal_fsm::device::CameraState;
/// use chrono::Utc;
///
/// let transition = StateTransition {
///     from: CameraState::Idle,
///     to: CameraState::Discovering,
///     timestamp: Utc::now(),
///     sequence: 1,
/// };
/// assert_eq!(transition.to, CameraState::Discovering);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateTransition<S: State> {
    /// The state being transitioned from
    pub from: S,
    /// The state being transitioned to
    pub to: S,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
    /// Position of this transition in the lifetime of the machine, starting at 1
    pub sequence: u64,
}

/// Bounded, ordered history of state transitions.
///
/// # Example
///
/// ```rust
/// use thermal_fsm::core::{StateHistory, StateTransition};
/// use thermal_fsm::device::CameraState;
/// use chrono::Utc;
///
/// let mut history = StateHistory::with_capacity(8);
/// history.record(StateTransition {
///     from: CameraState::Idle,
///     to: CameraState::Discovering,
///     timestamp: Utc::now(),
///     sequence: 1,
/// });
/// history.record(StateTransition {
///     from: CameraState::Discovering,
///     to: CameraState::DeviceFound,
///     timestamp: Utc::now(),
///     sequence: 2,
/// });
///
/// let path = history.get_path();
/// assert_eq!(
///     path,
///     vec![CameraState::Idle, CameraState::Discovering, CameraState::DeviceFound]
/// );
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct StateHistory<S: State> {
    capacity: usize,
    transitions: VecDeque<StateTransition<S>>,
}

impl<S: State> Default for StateHistory<S> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<S: State> StateHistory<S> {
    /// Create a new empty history with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty history that retains at most `capacity` transitions.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            transitions: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    /// Record a transition, evicting the oldest ones when full.
    pub fn record(&mut self, transition: StateTransition<S>) {
        // A deserialized history may carry a zero capacity.
        while self.transitions.len() >= self.capacity() {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Get the path of states traversed.
    ///
    /// Returns the `from` state of the oldest retained transition, then the
    /// `to` state of each transition in order.
    pub fn get_path(&self) -> Vec<S> {
        let mut path = Vec::with_capacity(self.transitions.len() + 1);
        if let Some(first) = self.transitions.front() {
            path.push(first.from);
        }
        path.extend(self.transitions.iter().map(|t| t.to));
        path
    }

    /// Calculate total duration from the oldest to the newest retained transition.
    ///
    /// Returns `None` if there are no transitions.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.transitions.front()?, self.transitions.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// Iterate the retained transitions, oldest first.
    pub fn transitions(&self) -> impl Iterator<Item = &StateTransition<S>> {
        self.transitions.iter()
    }

    /// The most recent transition, if any.
    pub fn last(&self) -> Option<&StateTransition<S>> {
        self.transitions.back()
    }

    /// Number of retained transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.max(1)
    }
}
