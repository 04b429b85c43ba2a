//! Orchestrator configuration.
//!
//! Every field has a default, so a partial JSON document (or `{}`) is a
//! valid configuration.

use crate::device::FusionMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Errors produced while loading or validating a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Timeouts, color mapping and image settings for the device orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Backoff before restarting discovery after an error.
    pub discover_retry_ms: u64,
    /// Backoff before retrying a failed connect or stream start.
    pub retry_backoff_ms: u64,
    /// Hard limit on a single connect attempt.
    pub connect_timeout_ms: u64,
    /// No-frames watchdog while streaming.
    pub frame_timeout_ms: u64,
    /// Automatic disconnect after a long stand-by.
    pub stand_by_timeout_ms: u64,
    /// How long `close` waits for queued cleanup.
    pub close_timeout_ms: u64,
    pub initial_min_temp: f64,
    pub initial_max_temp: f64,
    /// Smallest allowed separation between the color mapping bounds.
    pub min_color_span: f64,
    /// Target interval for gain-mode selection, whole degrees Celsius.
    pub target_range_min: i32,
    pub target_range_max: i32,
    pub palette: String,
    pub fusion: FusionMode,
    pub history_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            discover_retry_ms: 1_000,
            retry_backoff_ms: 1_000,
            connect_timeout_ms: 10_000,
            frame_timeout_ms: 10_000,
            stand_by_timeout_ms: 10 * 60 * 1_000,
            close_timeout_ms: 5_000,
            initial_min_temp: 10.0,
            initial_max_temp: 20.0,
            min_color_span: 0.5,
            target_range_min: -5,
            target_range_max: 45,
            palette: "iron".to_string(),
            fusion: FusionMode::Msx,
            history_capacity: crate::core::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

type Check = Validation<(), NonEmptyVec<String>>;

fn require(ok: bool, message: impl FnOnce() -> String) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(message())
    }
}

impl OrchestratorConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("discover_retry_ms", self.discover_retry_ms),
            ("retry_backoff_ms", self.retry_backoff_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("frame_timeout_ms", self.frame_timeout_ms),
            ("stand_by_timeout_ms", self.stand_by_timeout_ms),
            ("close_timeout_ms", self.close_timeout_ms),
        ];

        let mut checks: Vec<Check> = durations
            .iter()
            .map(|&(name, value)| require(value > 0, || format!("{name} must be positive")))
            .collect();

        checks.push(require(self.min_color_span > 0.0, || {
            format!("min_color_span must be positive, got {}", self.min_color_span)
        }));
        checks.push(require(
            self.initial_max_temp - self.initial_min_temp >= self.min_color_span,
            || {
                format!(
                    "initial color range {}..{} is narrower than {}",
                    self.initial_min_temp, self.initial_max_temp, self.min_color_span
                )
            },
        ));
        checks.push(require(self.target_range_min < self.target_range_max, || {
            format!(
                "target range {}..{} is inverted or empty",
                self.target_range_min, self.target_range_max
            )
        }));
        checks.push(require(self.history_capacity > 0, || {
            "history_capacity must be positive".to_string()
        }));

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(errors) => Err(ConfigError::Invalid(errors.iter().cloned().collect())),
        }
    }

    pub fn discover_retry(&self) -> Duration {
        Duration::from_millis(self.discover_retry_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn stand_by_timeout(&self) -> Duration {
        Duration::from_millis(self.stand_by_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.stand_by_timeout(), Duration::from_secs(600));
        assert_eq!(config.palette, "iron");
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = OrchestratorConfig::from_json("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config =
            OrchestratorConfig::from_json(r#"{"frame_timeout_ms": 250, "fusion": "thermal_only"}"#)
                .unwrap();
        assert_eq!(config.frame_timeout(), Duration::from_millis(250));
        assert_eq!(config.fusion, FusionMode::ThermalOnly);
        assert_eq!(config.discover_retry_ms, 1_000);
        assert_eq!(config.retry_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = OrchestratorConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validation_reports_every_problem() {
        let config = OrchestratorConfig {
            connect_timeout_ms: 0,
            initial_min_temp: 20.0,
            initial_max_temp: 20.2,
            target_range_min: 45,
            target_range_max: -5,
            history_capacity: 0,
            ..OrchestratorConfig::default()
        };

        match config.validate() {
            Err(ConfigError::Invalid(problems)) => {
                assert_eq!(problems.len(), 4);
                assert!(problems[0].contains("connect_timeout_ms"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
