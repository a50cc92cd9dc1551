//! Per-destination deployment outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::artifact::Platform;
use crate::pipeline::destination::DestinationKind;
use crate::pipeline::error::Error;

/// What a strategy reports after a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Human-readable summary
    pub message: String,
    /// Identifier assigned by the destination
    pub build_id: Option<String>,
    /// Where the upload can be inspected
    pub build_url: Option<String>,
}

impl Delivery {
    /// Creates a delivery with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Sets the build id.
    pub fn build_id(mut self, id: impl Into<String>) -> Self {
        self.build_id = Some(id.into());
        self
    }

    /// Sets the build url.
    pub fn build_url(mut self, url: impl Into<String>) -> Self {
        self.build_url = Some(url.into());
        self
    }
}

/// Outcome of one destination attempt.
///
/// Results are reported as a flat list, one per enabled destination, and are
/// never collapsed into a single verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    /// Whether the upload completed
    pub success: bool,
    /// Platform of the uploaded artifact
    pub platform: Platform,
    /// Destination name
    pub destination: String,
    /// Human-readable summary
    pub message: String,
    /// Identifier assigned by the destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    /// Where the upload can be inspected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_url: Option<String>,
    /// Wall time of the attempt
    pub duration_ms: u64,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeployResult {
    /// Successful attempt.
    pub fn succeeded(destination: DestinationKind, delivery: Delivery, elapsed: Duration) -> Self {
        Self {
            success: true,
            platform: destination.platform(),
            destination: destination.name().to_string(),
            message: delivery.message,
            build_id: delivery.build_id,
            build_url: delivery.build_url,
            duration_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    /// Failed attempt.
    pub fn failed(destination: DestinationKind, error: impl ToString, elapsed: Duration) -> Self {
        let error = error.to_string();
        Self {
            success: false,
            platform: destination.platform(),
            destination: destination.name().to_string(),
            message: format!("Deployment to {} failed", destination),
            build_id: None,
            build_url: None,
            duration_ms: elapsed.as_millis() as u64,
            error: Some(error),
        }
    }

    /// Failed attempt, naming the edit step when one failed.
    pub fn from_error(destination: DestinationKind, error: &Error, elapsed: Duration) -> Self {
        let mut result = Self::failed(destination, error, elapsed);
        if let Error::EditStep { step, .. } = error {
            result.message = format!("Deployment to {} failed at {} step", destination, step);
        }
        result
    }

    /// Destination excluded before any upload was attempted.
    pub fn skipped(destination: DestinationKind, reason: impl Into<String>) -> Self {
        Self {
            message: format!("Skipped {}", destination),
            ..Self::failed(destination, reason.into(), Duration::ZERO)
        }
    }
}

/// Whether every result in `results` succeeded. False for an empty list.
pub fn all_succeeded(results: &[DeployResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.success)
}
