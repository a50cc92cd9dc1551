//! Error types for pipeline operations.
//!
//! Every stage of the pipeline reports failures through [`Error`]. Stages that
//! degrade instead of failing (signing, per-destination deployment) convert
//! these into warnings or [`DeployResult`](super::DeployResult) values rather
//! than propagating them.

use std::path::{Path, PathBuf};

use super::artifact::ArtifactKind;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the release pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Free-form error message.
    #[error("{0}")]
    GenericError(String),

    /// Raw I/O error without path context.
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    /// File system error with the operation and path that failed.
    #[error("{context} ({}): {source}", .path.display())]
    Fs {
        /// What was being done
        context: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// External command could not be spawned or awaited.
    #[error("failed to run `{command}`: {error}")]
    CommandFailed {
        /// Rendered command (never includes secrets)
        command: String,
        /// Underlying spawn/wait error
        #[source]
        error: std::io::Error,
    },

    /// External command finished with a non-zero exit status.
    #[error("`{command}` exited with status {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "<signal>".into()))]
    CommandExit {
        /// Rendered command (never includes secrets)
        command: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },

    /// A build exited successfully but produced nothing we could find.
    #[error("artifact not found after build: no {kind} in {}", .searched.display())]
    ArtifactNotFound {
        /// Kind that was built
        kind: ArtifactKind,
        /// Directory that was scanned
        searched: PathBuf,
    },

    /// Required external tool is not installed or not discoverable.
    #[error("{tool} not found: {hint}")]
    ToolNotFound {
        /// Tool name
        tool: String,
        /// Installation hint
        hint: String,
    },

    /// Configuration enables no destinations at all.
    #[error("no destinations enabled; enable at least one destination before running the pipeline")]
    NoDestinationsEnabled,

    /// A destination is missing a required configuration field.
    #[error("{destination}: missing required configuration `{field}`")]
    MissingConfig {
        /// Destination name
        destination: String,
        /// Missing field
        field: String,
    },

    /// The user declined the confirmation gate.
    #[error("deployment not confirmed")]
    NotConfirmed,

    /// Remote call failed.
    #[error("{step} failed: {message}")]
    Http {
        /// Step or endpoint that failed
        step: String,
        /// Description of the failure
        message: String,
    },

    /// A step of a store edit transaction failed; the edit was left uncommitted.
    #[error("{step} step failed: {source}")]
    EditStep {
        /// Transaction step (`create`, `upload`, `assign`, `commit`)
        step: &'static str,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// JSON encode/decode failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let step = e
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "request".to_string());
        Error::Http {
            step,
            message: e.to_string(),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Error::GenericError(format!("directory traversal failed: {e}"))
    }
}

/// Attaches file system context to I/O results.
pub trait ErrorExt<T> {
    /// Wraps the error with a description of the operation and the path.
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|source| Error::Fs {
            context: context.to_string(),
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Anyhow-style context for `Option` and `Result`.
pub trait Context<T> {
    /// Converts `None`/`Err` into [`Error::GenericError`] with the given message.
    fn context<C: std::fmt::Display>(self, context: C) -> Result<T>;

    /// Lazily evaluated variant of [`Context::context`].
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for Option<T> {
    fn context<C: std::fmt::Display>(self, context: C) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{context}: {e}")))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::GenericError(format!("{}: {e}", f())))
    }
}

/// Returns early with a formatted [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::pipeline::Error::GenericError(format!($($arg)*)))
    };
}
