//! Builder API for ergonomic state machine construction.
//!
//! This module provides the fluent [`StateMachineBuilder`], the only way to
//! construct an engine, and the [`state_enum!`](crate::state_enum) macro for
//! declaring state types with minimal boilerplate.

pub mod error;
pub mod machine;
pub mod macros;

pub use error::{BuildError, HookKind};
pub use machine::StateMachineBuilder;
