//! Core State trait for state machine states.
//!
//! States are small, copyable values. The engine keys its transition table,
//! hook slots and cleanup levels by state, so every state must be hashable.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Trait for state machine states.
///
/// # Required Traits
///
/// - `Copy` + `Eq` + `Hash`: states are used as map keys and passed by value
/// - `Debug`: states must be debuggable for diagnostics
/// - `Serialize` + `Deserialize`: observers may forward states to a presentation layer
/// - `Send` + `Sync` + `'static`: states cross into the engine worker thread
///
/// Most enums should derive this through [`state_enum!`](crate::state_enum)
/// rather than implementing it by hand.
///
/// # Example
///
/// ```rust
/// use thermal_fsm::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum PumpState {
///     Off,
///     Priming,
///     Running,
///     Jammed,
/// }
///
/// impl State for PumpState {
///     fn name(&self) -> &str {
///         match self {
///             Self::Off => "Off",
///             Self::Priming => "Priming",
///             Self::Running => "Running",
///             Self::Jammed => "Jammed",
///         }
///     }
///
///     fn is_error(&self) -> bool {
///         matches!(self, Self::Jammed)
///     }
/// }
///
/// assert_eq!(PumpState::Priming.name(), "Priming");
/// assert!(PumpState::Jammed.is_error());
/// ```
pub trait State:
    Copy + Eq + Hash + Debug + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &str;

    /// Check if this is a final (terminal) state.
    ///
    /// Default implementation returns `false`.
    fn is_final(&self) -> bool {
        false
    }

    /// Check if this is an error state.
    ///
    /// Default implementation returns `false`.
    fn is_error(&self) -> bool {
        false
    }
}
