//! Build errors for the state machine builder.

use std::fmt;
use thiserror::Error;

/// Which hook slot a registration targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Pre,
    Post,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Pre => f.write_str("pre"),
            HookKind::Post => f.write_str("post"),
        }
    }
}

/// Errors that can occur when building a state machine.
///
/// The builder reports every violation it finds, not just the first one.
/// A single violation is returned as itself; several are wrapped in
/// [`BuildError::Multiple`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("cleanup level {found} registered out of order, expected level {expected}")]
    CleanupLevelOutOfOrder { expected: usize, found: usize },

    #[error("state '{state}' already belongs to cleanup level {existing}, cannot also join level {requested}")]
    CleanupLevelConflict {
        state: String,
        existing: usize,
        requested: usize,
    },

    #[error("{kind} hook for state '{state}' registered twice")]
    DuplicateHook { state: String, kind: HookKind },

    #[error("transition rule for destination '{state}' declared twice")]
    DuplicateRule { state: String },

    #[error("failed to spawn state worker thread: {0}")]
    WorkerSpawn(String),

    #[error("{} build violations: {}", .0.len(), join(.0))]
    Multiple(Vec<BuildError>),
}

fn join(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BuildError {
    /// Collapse a list of violations into a single error.
    pub(crate) fn from_violations(mut violations: Vec<BuildError>) -> Self {
        if violations.len() == 1 {
            violations.remove(0)
        } else {
            BuildError::Multiple(violations)
        }
    }
}
