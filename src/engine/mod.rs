//! The state machine engine.
//!
//! A transition decision (legality check, pre-hook, state update) runs
//! synchronously on the calling thread under the engine lock. Everything
//! else, meaning layered cleanup, post-hooks and any task handed to
//! [`StateMachine::run_on_worker`], runs on a single FIFO worker thread, so
//! side effects queued by an earlier transition always finish before those
//! of a later one start.
//!
//! Post-hooks commonly trigger the next transition. Because each hook only
//! queues work for the worker, a chain such as Discovering → DeviceFound →
//! Connecting → Connected walks the graph as a flat sequence of worker
//! tasks, never as nested calls.

mod hooks;
mod machine;
mod worker;

pub use hooks::{CleanupFn, Hook};
pub use machine::{Critical, Observer, StateMachine};

pub(crate) use hooks::{CleanupAction, CleanupRegistry, HookTable};
pub(crate) use machine::{Deliveries, Inner, Shared};
pub(crate) use worker::Worker;
