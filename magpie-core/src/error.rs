//! Core error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticKind {
    /// Malformed line shape, arrow count or condition brackets.
    Syntax,
    /// Duplicate transition or unreachable state.
    Semantic,
}

/// A single problem found while parsing a model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Diagnostic {
    /// 1-based line number in the model source.
    pub line: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: DiagnosticKind::Syntax,
            message: message.into(),
        }
    }

    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            kind: DiagnosticKind::Semantic,
            message: message.into(),
        }
    }
}

/// All diagnostics collected from one model source, sorted by line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub path: String,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Builds a report, sorting entries by line number (stable for equal lines).
    pub fn new(path: impl Into<String>, mut entries: Vec<Diagnostic>) -> Self {
        entries.sort_by_key(|d| d.line);
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if any entry is a syntax diagnostic.
    pub fn has_syntax_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.kind == DiagnosticKind::Syntax)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, diagnostic) in self.entries.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "\"{}\", line {}: {}",
                self.path, diagnostic.line, diagnostic.message
            )?;
        }
        Ok(())
    }
}

/// Errors from model construction and path planning.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    InvalidModel(Diagnostics),

    #[error("duplicate transition: {key}")]
    DuplicateTransition { key: String },

    #[error("the {role} state name `{name}` was not found in the model, please check your spelling")]
    StateNotFound { role: &'static str, name: String },

    #[error("no path from `{from}` to `{to}`")]
    NoPath { from: String, to: String },

    #[error("failed to read model file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Returns an error code grouping the error by category.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidModel(diagnostics) if diagnostics.has_syntax_errors() => {
                "PARSING_ERROR"
            }
            CoreError::InvalidModel(_) => "MODEL_ERROR",
            CoreError::DuplicateTransition { .. } => "MODEL_ERROR",
            CoreError::StateNotFound { .. } => "PATH_ERROR",
            CoreError::NoPath { .. } => "PATH_ERROR",
            CoreError::Io { .. } => "IO_ERROR",
        }
    }

    /// Returns true for path planning failures.
    pub fn is_path_error(&self) -> bool {
        self.error_code() == "PATH_ERROR"
    }

    /// Returns the aggregated diagnostics, if this is a model error.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            CoreError::InvalidModel(d) => Some(d),
            _ => None,
        }
    }
}
