//! Error types for SiteDesk.
//!
//! Library crates use [`SiteDeskError`] via `thiserror` for setup paths
//! (client construction, storage open, config load). Engine operations
//! degrade to [`Outcome`](crate::Outcome) instead of failing.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteDesk operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteDeskError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during crawl, embedding, or calendar reads.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, JSON, or timestamp parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or snapshot storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedding provider error (request, status, or response shape).
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Calendar provider error.
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad hours, unknown timezone, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteDeskError>;

impl SiteDeskError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
        let err = SiteDeskError::config("missing site_url");
        assert_eq!(err.to_string(), "config error: missing site_url");

        let err = SiteDeskError::validation("hours_end 25 out of range");
        assert!(err.to_string().contains("hours_end 25"));

        let err = SiteDeskError::Embedding("HTTP 401".into());
        assert_eq!(err.to_string(), "embedding error: HTTP 401");
    }
}
