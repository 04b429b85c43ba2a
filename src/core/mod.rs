//! Core state machine types.
//!
//! This module contains the pure, lock-free parts of the engine:
//! - State definitions via the `State` trait
//! - The declarative transition legality table
//! - Bounded transition history

mod history;
mod state;
mod table;

pub use history::{StateHistory, StateTransition, DEFAULT_HISTORY_CAPACITY};
pub use state::State;
pub use table::{Sources, TransitionRule, TransitionTable};
