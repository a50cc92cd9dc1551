//! HTTP helpers shared by the remote destinations.

use std::time::Duration;

use crate::pipeline::error::{Error, Result};

/// Timeout applied to every remote call. Uploads of large bundles are the slow path.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds the client used by remote destinations.
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("mobile_release/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::GenericError(format!("Failed to build HTTP client: {}", e)))
}

/// Turns a non-success response into [`Error::Http`] carrying the body text.
pub async fn check(step: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Http {
        step: step.to_string(),
        message: format!("HTTP {}: {}", status, body.trim()),
    })
}
