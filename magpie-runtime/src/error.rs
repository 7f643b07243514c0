//! Runtime error types.

use crate::strategy::Strategy;
use magpie_core::CoreError;
use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a session from starting or running.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("the {strategy} strategy is not implemented yet, please select pure_random or smart_random")]
    StrategyNotImplemented { strategy: Strategy },

    #[error("action hook `{hook}()` for action '{action}' is missing")]
    MissingActionHook { action: String, hook: String },

    #[error("invalid session configuration: {0}")]
    SessionConfig(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: &'static str,
        #[source]
        source: HookError,
    },

    #[error("session thread '{0}' panicked")]
    SessionPanicked(String),
}

impl RuntimeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RuntimeError::Core(e) => e.error_code(),
            RuntimeError::StrategyNotImplemented { .. } => "MODEL_ERROR",
            RuntimeError::MissingActionHook { .. } => "CONFIGURATION_ERROR",
            RuntimeError::SessionConfig(_) => "CONFIGURATION_ERROR",
            RuntimeError::Io { .. } => "IO_ERROR",
            RuntimeError::Json(_) => "IO_ERROR",
            RuntimeError::Hook { .. } => "HOOK_ERROR",
            RuntimeError::SessionPanicked(_) => "INTERNAL_ERROR",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuntimeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Where a hook fault originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file \"{}\", line {}", self.file, self.line)
    }
}

impl From<&Location<'_>> for Provenance {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// A fault raised by a state, action or condition hook.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("{message}")]
    Failed {
        message: String,
        provenance: Option<Provenance>,
    },
    /// The user asked the session to stop.
    #[error("cancelled by user")]
    Cancelled,
}

impl HookError {
    /// Creates a fault located at the caller.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        HookError::Failed {
            message: message.into(),
            provenance: Some(Location::caller().into()),
        }
    }

    /// Creates a fault without location information.
    pub fn message(message: impl Into<String>) -> Self {
        HookError::Failed {
            message: message.into(),
            provenance: None,
        }
    }

    pub fn provenance(&self) -> Option<&Provenance> {
        match self {
            HookError::Failed { provenance, .. } => provenance.as_ref(),
            HookError::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HookError::Cancelled)
    }
}
