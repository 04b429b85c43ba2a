//! Thermal camera lifecycle.
//!
//! [`CameraState`] and its legality table, the hardware collaborator traits,
//! and the [`DeviceOrchestrator`] that drives a camera through discovery,
//! connect, streaming and calibration on top of the generic engine.

mod colors;
mod error;
mod orchestrator;
mod sdk;
pub mod simulated;
mod state;
mod watchdog;

pub use colors::ColorRange;
pub use error::{DeviceError, SetupError};
pub use orchestrator::{Collaborators, DeviceOrchestrator, FrameReady};
pub use sdk::{
    AccessPermission, Bitmap, Calibration, Camera, DiscoveryEvent, DiscoveryListener,
    FrameListener, FusionMode, Identity, ImageSettings, NucListener, NucState, RemoteControl,
    Stream, Streamer, ThermalSdk,
};
pub use state::{CameraState, CONNECTION_STATES, DISCOVERY_STATES, STREAM_STATES};
