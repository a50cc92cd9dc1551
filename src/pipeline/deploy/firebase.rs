//! Lab-grade distribution through Firebase App Distribution.
//!
//! The binary goes up in a single raw upload. When the service finishes
//! processing within that call the release is also annotated with notes and
//! distributed to testers; otherwise the upload stands on its own and the
//! build id is synthesized from the current time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::{Authenticator, FIREBASE_SCOPE};
use super::{Delivery, DeployStrategy};
use crate::config::FirebaseConfig;
use crate::pipeline::artifact::ArtifactInfo;
use crate::pipeline::destination::DestinationKind;
use crate::pipeline::error::{Context, Error, ErrorExt, Result};
use crate::utils::http;

/// Service root.
pub const FIREBASE_API: &str = "https://firebaseappdistribution.googleapis.com/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadOperation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    response: Option<UploadResponse>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    release: Option<Release>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Release {
    name: String,
    build_version: Option<String>,
    firebase_console_uri: Option<String>,
}

/// Uploads to Firebase App Distribution.
pub struct FirebaseDistribution {
    config: FirebaseConfig,
    http: reqwest::Client,
    auth: Arc<dyn Authenticator>,
    base: String,
}

impl FirebaseDistribution {
    /// Creates the strategy against the public endpoint.
    pub fn new(config: FirebaseConfig, http: reqwest::Client, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            config,
            http,
            auth,
            base: FIREBASE_API.to_string(),
        }
    }

    fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::MissingConfig {
                destination: DestinationKind::Firebase.to_string(),
                field: field.to_string(),
            })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Url::parse(&self.base)
            .and_then(|base| base.join(path))
            .context("invalid Firebase endpoint")
    }

    /// Upload endpoint for the configured app.
    pub fn upload_url(&self) -> Result<Url> {
        let project = Self::required(&self.config.project_number, "project_number")?;
        let app = Self::required(&self.config.app_id, "app_id")?;
        self.url(&format!("upload/v1/projects/{project}/apps/{app}/releases:upload"))
    }

    /// Console page listing the app's releases.
    pub fn console_url(&self) -> String {
        format!(
            "https://console.firebase.google.com/project/_/appdistribution/app/{}/releases",
            self.config.app_id.as_deref().unwrap_or_default()
        )
    }

    async fn annotate(&self, release: &Release, token: &str) -> Result<()> {
        if let Some(notes) = self.config.release_notes.as_deref().filter(|n| !n.is_empty()) {
            let mut url = self.url(&format!("v1/{}", release.name))?;
            url.query_pairs_mut().append_pair("updateMask", "release_notes.text");
            let response = self
                .http
                .patch(url)
                .bearer_auth(token)
                .json(&json!({ "releaseNotes": { "text": notes } }))
                .send()
                .await?;
            http::check("release notes", response).await?;
        }

        if !self.config.groups.is_empty() || !self.config.testers.is_empty() {
            let url = self.url(&format!("v1/{}:distribute", release.name))?;
            let response = self
                .http
                .post(url)
                .bearer_auth(token)
                .json(&json!({
                    "testerEmails": self.config.testers,
                    "groupAliases": self.config.groups,
                }))
                .send()
                .await?;
            http::check("distribute", response).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeployStrategy for FirebaseDistribution {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Firebase
    }

    fn validate(&self) -> Result<()> {
        self.upload_url().map(|_| ())
    }

    async fn upload(&self, artifact: Option<&ArtifactInfo>, _cancel: &CancellationToken) -> Result<Delivery> {
        let artifact = artifact.context("firebase needs a built artifact")?;
        let url = self.upload_url()?;
        let token = self.auth.get_token(FIREBASE_SCOPE).await?;

        let file = tokio::fs::File::open(&artifact.path)
            .await
            .fs_context("opening artifact for upload", &artifact.path)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&token.token)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("X-Goog-Upload-File-Name", artifact.file_name())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, artifact.size_bytes)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let operation: UploadOperation = http::check("releases:upload", response).await?.json().await?;

        let release = operation
            .response
            .and_then(|r| r.release)
            .filter(|_| operation.done);

        match release {
            Some(release) => {
                self.annotate(&release, &token.token).await?;
                let build_id = release
                    .build_version
                    .clone()
                    .unwrap_or_else(synthesized_build_id);
                let url = release
                    .firebase_console_uri
                    .clone()
                    .unwrap_or_else(|| self.console_url());
                Ok(Delivery::new(format!("Released {}", release.name))
                    .build_id(build_id)
                    .build_url(url))
            }
            None => {
                log::warn!(
                    "Firebase is still processing {} ({}); release notes and tester notifications were not applied",
                    artifact.file_name(),
                    operation.name.as_deref().unwrap_or("unknown operation")
                );
                Ok(Delivery::new(format!("Uploaded {}", artifact.file_name()))
                    .build_id(synthesized_build_id())
                    .build_url(self.console_url()))
            }
        }
    }
}

fn synthesized_build_id() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::deploy::EnvTokenAuthenticator;

    fn strategy(app_id: Option<&str>, project_number: Option<&str>) -> FirebaseDistribution {
        FirebaseDistribution::new(
            FirebaseConfig {
                enabled: true,
                app_id: app_id.map(str::to_string),
                project_number: project_number.map(str::to_string),
                artifact: None,
                groups: Vec::new(),
                testers: Vec::new(),
                release_notes: None,
            },
            reqwest::Client::new(),
            Arc::new(EnvTokenAuthenticator::with_token("T", None)),
        )
    }

    #[test]
    fn missing_app_id_fails_before_any_request() {
        let err = strategy(None, Some("123")).validate().unwrap_err();
        assert_eq!(err.to_string(), "firebase: missing required configuration `app_id`");
        let err = strategy(Some("1:123:android:abc"), None).validate().unwrap_err();
        assert!(err.to_string().contains("project_number"));
    }

    #[test]
    fn upload_url_targets_app_releases() {
        let url = strategy(Some("1:123:android:abc"), Some("123")).upload_url().unwrap();
        assert_eq!(
            url.as_str(),
            "https://firebaseappdistribution.googleapis.com/upload/v1/projects/123/apps/1:123:android:abc/releases:upload"
        );
    }

    #[test]
    fn synthesized_id_is_a_timestamp() {
        let id = synthesized_build_id();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn operation_parses_finished_release() {
        let op: UploadOperation = serde_json::from_str(
            r#"{"name":"projects/1/apps/a/releases/-/operations/x","done":true,
                "response":{"release":{"name":"projects/1/apps/a/releases/r1","buildVersion":"57",
                "firebaseConsoleUri":"https://console.firebase.google.com/r1"}}}"#,
        )
        .unwrap();
        let release = op.response.and_then(|r| r.release).unwrap();
        assert_eq!(release.build_version.as_deref(), Some("57"));
    }
}
