//! Hardware collaborator interfaces.
//!
//! The orchestrator only talks to the camera through these traits. Any call
//! may block or hang, and callbacks may arrive on arbitrary threads.
//! Implementations must never invoke a listener from inside the call that
//! registered it: listeners take the engine lock, and the registering call
//! may already hold it.

use super::error::DeviceError;
use crate::range::TemperatureRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a discovered camera, used to connect to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub device_id: String,
}

impl Identity {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.device_id)
    }
}

/// Outcome reported by a discovery scan.
#[derive(Clone, Debug, PartialEq)]
pub enum DiscoveryEvent {
    Found(Identity),
    Failed(DeviceError),
}

/// Hardware calibration (non-uniformity correction) sub-state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NucState {
    Unknown,
    Invalid,
    Bad,
    Desired,
    Progress,
    RadApprox,
    ValidImg,
    ValidRad,
    /// A value this crate does not know about.
    Unrecognized(i32),
}

/// How the visible and thermal images are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Thermal image with visible edges overlaid.
    #[default]
    Msx,
    ThermalOnly,
    VisualOnly,
}

/// Post-processing applied by a [`Streamer`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub palette: String,
    pub fusion: FusionMode,
    pub auto_scale: bool,
}

/// A rendered frame. Pixels are opaque ARGB values.
#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u32]>,
}

pub type DiscoveryListener = Arc<dyn Fn(DiscoveryEvent) + Send + Sync>;
pub type NucListener = Arc<dyn Fn(NucState) + Send + Sync>;
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// Entry point of the vendor SDK.
pub trait ThermalSdk: Send + Sync {
    /// Start scanning for the integrated camera; results arrive on `listener`.
    fn scan(&self, listener: DiscoveryListener);

    fn stop_scan(&self);

    /// A fresh, unconnected camera handle.
    fn new_camera(&self) -> Arc<dyn Camera>;

    /// A renderer for frames arriving on `stream`.
    fn new_streamer(&self, stream: Arc<dyn Stream>) -> Arc<dyn Streamer>;
}

/// Low-level camera handle.
pub trait Camera: Send + Sync {
    /// Connect to `identity`. May hang indefinitely.
    fn connect(&self, identity: &Identity) -> Result<(), DeviceError>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
    fn remote_control(&self) -> Option<Arc<dyn RemoteControl>>;
    fn streams(&self) -> Vec<Arc<dyn Stream>>;
    /// Release the handle. It cannot be used afterwards.
    fn close(&self);
}

/// Control interface of a connected camera.
pub trait RemoteControl: Send + Sync {
    fn calibration(&self) -> Option<Arc<dyn Calibration>>;
    /// Selectable gain-mode ranges, if the camera has any.
    fn temperature_ranges(&self) -> Option<Vec<TemperatureRange>>;
    fn select_range(&self, index: usize) -> Result<(), DeviceError>;
}

pub trait Calibration: Send + Sync {
    fn subscribe(&self, listener: NucListener);
    /// Turn off periodic automatic calibration.
    fn disable_auto_calibration(&self) -> Result<(), DeviceError>;
    /// Run a calibration cycle now. Blocks until the camera accepts it.
    fn execute(&self) -> Result<(), DeviceError>;
}

pub trait Stream: Send + Sync {
    fn is_streaming(&self) -> bool;
    /// Start streaming; `on_frame` fires once per received frame.
    fn start(&self, on_frame: FrameListener) -> Result<(), DeviceError>;
    fn stop(&self);
}

/// Renders frames from a stream.
pub trait Streamer: Send + Sync {
    fn configure(&self, settings: &ImageSettings);
    /// Pull the latest frame from the stream.
    fn update(&self) -> Result<(), DeviceError>;
    /// Map temperatures in `[min, max]` Celsius linearly onto the palette.
    fn set_color_range(&self, min: f64, max: f64);
    fn render(&self) -> Option<Bitmap>;
}

/// Blocking access-permission check.
pub trait AccessPermission: Send + Sync {
    fn ensure_granted(&self) -> bool;
}
