//! Thermal FSM: a thread-safe state machine engine and a thermal camera
//! lifecycle built on it.
//!
//! The engine validates transitions against a fixed legality table, runs
//! pre-hooks synchronously, and serializes layered cleanup and post-hooks on
//! a single worker thread. The [`device`] module uses it to drive a camera
//! through discovery, connection, streaming and calibration while coping
//! with hanging backends and other processes seizing the device.
//!
//! # Core Concepts
//!
//! - **State**: type-safe states via the [`State`] trait, usually derived
//!   with [`state_enum!`]
//! - **Transition table**: declarative `(destination, legal sources)` rules
//! - **Cleanup levels**: how much setup must be unwound when leaving a state
//! - **History**: a bounded, flat log of accepted transitions
//!
//! # Example
//!
//! ```rust
//! use thermal_fsm::core::{Sources, TransitionRule};
//! use thermal_fsm::{state_enum, StateMachine};
//! use std::time::Duration;
//!
//! state_enum! {
//!     enum Link { Down, Probing, Up }
//! }
//!
//! let machine = StateMachine::builder(Link::Down)
//!     .rules(vec![
//!         TransitionRule::new(Link::Down, Sources::Any),
//!         TransitionRule::new(Link::Probing, Sources::Only(vec![Link::Down])),
//!         TransitionRule::new(Link::Up, Sources::Only(vec![Link::Probing])),
//!     ])
//!     .cleanup(1, false, [Link::Probing, Link::Up], |t| {
//!         println!("releasing link on {:?} -> {:?}", t.from, t.to);
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(machine.set_state(Link::Probing));
//! assert!(machine.set_state(Link::Up));
//! assert!(machine.set_state(Link::Down));
//! assert!(machine.flush(Duration::from_secs(1)));
//! assert_eq!(machine.history().get_path(), vec![Link::Down, Link::Probing, Link::Up, Link::Down]);
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod device;
pub mod engine;
pub mod range;

pub use builder::{BuildError, StateMachineBuilder};
pub use config::{ConfigError, OrchestratorConfig};
pub use crate::core::{State, StateHistory, StateTransition};
pub use device::{CameraState, DeviceOrchestrator};
pub use engine::StateMachine;
