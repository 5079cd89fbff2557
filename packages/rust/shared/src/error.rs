//! Error types for Shallow Dive.
//!
//! Library crates use [`ShallowDiveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Shallow Dive operations.
#[derive(Debug, thiserror::Error)]
pub enum ShallowDiveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// The narrative generator was unreachable or returned an error.
    #[error("generation error: {0}")]
    Generation(String),

    /// A raw-data fetcher failed. Always recovered inside the stage.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A pipeline stage failed.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate stage, overwritten section, bad input file).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Response or input parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Report or summary rendering error.
    #[error("report error: {0}")]
    Report(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ShallowDiveError>;

impl ShallowDiveError {
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

/// Failure of a single pipeline stage.
///
/// Carries the name of the stage that stopped the run and the underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {cause}")]
pub struct StageError {
    /// Name of the failing stage.
    pub stage: String,
    /// What went wrong inside the stage.
    #[source]
    pub cause: Box<ShallowDiveError>,
}

impl StageError {
    /// Attribute `cause` to the stage called `stage`.
    pub fn new(stage: impl Into<String>, cause: ShallowDiveError) -> Self {
        Self {
            stage: stage.into(),
            cause: Box::new(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ShallowDiveError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ShallowDiveError::validation("section 'x' already written");
        assert!(err.to_string().contains("section 'x'"));
    }

    #[test]
    fn stage_error_names_the_stage() {
        let err = StageError::new(
            "section_2_1",
            ShallowDiveError::Generation("HTTP 503".into()),
        );
        assert_eq!(
            err.to_string(),
            "stage 'section_2_1' failed: generation error: HTTP 503"
        );

        let wrapped: ShallowDiveError = err.into();
        assert!(wrapped.to_string().starts_with("stage 'section_2_1'"));
    }
}
