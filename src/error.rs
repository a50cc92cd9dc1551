//! Top-level error types for the CLI and configuration loading.
//!
//! Pipeline stages report through [`crate::pipeline::Error`]; this module wraps
//! them together with CLI and configuration failures and attaches recovery
//! suggestions for the terminal.

use thiserror::Error;

use crate::pipeline::signing::{KEY_ALIAS_ENV, KEYSTORE_PATH_ENV, STORE_PASSWORD_ENV};

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all CLI operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file errors
    #[error("configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Pipeline errors
    #[error("{0}")]
    Pipeline(#[from] crate::pipeline::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::pipeline::Error as P;

        match self {
            ReleaseError::Pipeline(P::NoDestinationsEnabled) => vec![
                "Add a [destinations.<name>] table (firebase, play, testflight or local) to the configuration".to_string(),
                "Check that at least one destination does not set enabled = false".to_string(),
            ],
            ReleaseError::Pipeline(P::MissingConfig { destination, .. }) if destination == "signing" => vec![
                "Set keystore_path, key_alias and store_password under [signing]".to_string(),
                format!(
                    "Or export {}, {} and {}",
                    KEYSTORE_PATH_ENV, KEY_ALIAS_ENV, STORE_PASSWORD_ENV
                ),
            ],
            ReleaseError::Pipeline(P::MissingConfig { destination, field }) => vec![format!(
                "Set {} under [destinations.{}]",
                field, destination
            )],
            ReleaseError::Pipeline(P::ToolNotFound { .. }) => vec![
                "Install the Android SDK build-tools and set ANDROID_HOME or ANDROID_SDK_ROOT".to_string(),
                "Run `mobile_release tools` to see what was found".to_string(),
            ],
            ReleaseError::Pipeline(P::NotConfirmed) => {
                vec!["Re-run with --yes to deploy without the confirmation prompt".to_string()]
            }
            ReleaseError::Toml(_) => vec![
                "Destination tables are limited to firebase, play, testflight and local".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_destinations_suggests_adding_one() {
        let err = ReleaseError::from(crate::pipeline::Error::NoDestinationsEnabled);
        assert!(err.to_string().contains("no destinations enabled"));
        assert!(err.recovery_suggestions()[0].contains("[destinations."));
    }

    #[test]
    fn signing_suggestions_name_env_fallbacks() {
        let err = ReleaseError::from(crate::pipeline::Error::MissingConfig {
            destination: "signing".into(),
            field: "key_alias".into(),
        });
        assert!(err.recovery_suggestions()[1].contains(KEYSTORE_PATH_ENV));
    }
}
