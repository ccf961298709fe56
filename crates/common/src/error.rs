use std::path::PathBuf;

use thiserror::Error;

use crate::process::SubprocessError;

/// Coarse classification of [`Error`], stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidFormat,
    Conflict,
    ValidationFailed,
    SubprocessFailed,
    IoFailure,
    Other,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    Conflict(String),

    #[error("plugin '{plugin}' failed validation:\n{}", format_errors(.errors))]
    ValidationFailed { plugin: String, errors: Vec<String> },

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Message(String),
}

fn format_errors(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    #[must_use]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    #[must_use]
    pub fn validation_failed(plugin: impl Into<String>, errors: Vec<String>) -> Self {
        Self::ValidationFailed {
            plugin: plugin.into(),
            errors,
        }
    }

    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O failure on a specific path, e.g. `io_at("failed to copy", &dir, e)`.
    #[must_use]
    pub fn io_at(action: &str, path: &std::path::Path, source: std::io::Error) -> Self {
        Self::io(format!("{action} {}", path.display()), source)
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::Subprocess(_) => ErrorKind::SubprocessFailed,
            Self::Io { .. } => ErrorKind::IoFailure,
            Self::Message(_) => ErrorKind::Other,
        }
    }

    /// Missing file on disk, named by its path.
    #[must_use]
    pub fn missing_file(label: &str, path: PathBuf) -> Self {
        Self::not_found(format!("{label} '{}'", path.display()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
