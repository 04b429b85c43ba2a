//! Device and setup errors.

use crate::builder::BuildError;
use crate::config::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by hardware collaborators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    /// The host has no interface for the integrated camera.
    #[error("camera interface not supported on this host")]
    InterfaceNotSupported,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connect did not finish within {0:?}")]
    ConnectTimeout(Duration),

    #[error("stream failure: {0}")]
    StreamFailed(String),

    #[error("calibration failure: {0}")]
    CalibrationFailed(String),

    #[error("device unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while constructing an orchestrator.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
