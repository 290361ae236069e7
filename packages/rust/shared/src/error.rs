//! Error types for TicketForge.
//!
//! Library crates use [`TicketForgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all TicketForge operations.
#[derive(Debug, thiserror::Error)]
pub enum TicketForgeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to the text-generation endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// JSON recovery or parsing error on model output.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// CSV table layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad run parameters, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TicketForgeError>;

impl TicketForgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TicketForgeError::config("missing Ollama base URL");
        assert_eq!(err.to_string(), "config error: missing Ollama base URL");

        let err = TicketForgeError::extraction("no JSON value found");
        assert!(err.to_string().contains("no JSON value found"));
    }
}
