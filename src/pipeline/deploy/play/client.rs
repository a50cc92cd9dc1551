//! `reqwest` implementation of [`PlayApi`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use url::Url;

use super::api::{PlayApi, TrackRelease};
use crate::pipeline::deploy::auth::{Authenticator, PLAY_SCOPE};
use crate::pipeline::error::{Context, ErrorExt, Result};
use crate::utils::http;

/// REST root of the publisher API.
pub const PUBLISHER_API: &str = "https://androidpublisher.googleapis.com/";

#[derive(Debug, Deserialize)]
struct AppEdit {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    version_code: i64,
}

/// Talks to the Android Publisher v3 API.
pub struct HttpPlayApi {
    http: reqwest::Client,
    auth: Arc<dyn Authenticator>,
    base: String,
}

impl HttpPlayApi {
    /// Creates a client for the public endpoint.
    pub fn new(http: reqwest::Client, auth: Arc<dyn Authenticator>) -> Self {
        Self::with_base(http, auth, PUBLISHER_API)
    }

    /// Creates a client for another endpoint root.
    pub fn with_base(http: reqwest::Client, auth: Arc<dyn Authenticator>, base: impl Into<String>) -> Self {
        Self {
            http,
            auth,
            base: base.into(),
        }
    }

    /// `androidpublisher/v3/applications/<package>/edits[/<edit><suffix>]`
    pub fn edit_url(&self, package: &str, edit_id: Option<&str>, suffix: &str, upload: bool) -> Result<Url> {
        let prefix = if upload { "upload/" } else { "" };
        let mut path = format!("{prefix}androidpublisher/v3/applications/{package}/edits");
        if let Some(edit) = edit_id {
            path.push('/');
            path.push_str(edit);
        }
        path.push_str(suffix);
        Url::parse(&self.base)
            .and_then(|base| base.join(&path))
            .context("invalid publisher endpoint")
    }

    async fn token(&self) -> Result<String> {
        Ok(self.auth.get_token(PLAY_SCOPE).await?.token)
    }
}

#[async_trait]
impl PlayApi for HttpPlayApi {
    async fn create_edit(&self, package: &str) -> Result<String> {
        let url = self.edit_url(package, None, "", false)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .json(&json!({}))
            .send()
            .await?;
        let edit: AppEdit = http::check("edits.insert", response).await?.json().await?;
        Ok(edit.id)
    }

    async fn upload_bundle(&self, package: &str, edit_id: &str, bundle: &Path) -> Result<i64> {
        let mut url = self.edit_url(package, Some(edit_id), "/bundles", true)?;
        url.query_pairs_mut().append_pair("uploadType", "media");

        let file = tokio::fs::File::open(bundle)
            .await
            .fs_context("opening bundle for upload", bundle)?;
        let size = file
            .metadata()
            .await
            .fs_context("reading bundle size", bundle)?
            .len();

        let response = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        let uploaded: Bundle = http::check("edits.bundles.upload", response).await?.json().await?;
        Ok(uploaded.version_code)
    }

    async fn assign_track(&self, package: &str, edit_id: &str, track: &str, release: &TrackRelease) -> Result<()> {
        let url = self.edit_url(package, Some(edit_id), &format!("/tracks/{track}"), false)?;
        let response = self
            .http
            .put(url)
            .bearer_auth(self.token().await?)
            .json(&json!({ "track": track, "releases": [release] }))
            .send()
            .await?;
        http::check("edits.tracks.update", response).await?;
        Ok(())
    }

    async fn commit_edit(&self, package: &str, edit_id: &str) -> Result<()> {
        let url = self.edit_url(package, Some(edit_id), ":commit", false)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;
        http::check("edits.commit", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::deploy::EnvTokenAuthenticator;

    fn api() -> HttpPlayApi {
        HttpPlayApi::new(
            reqwest::Client::new(),
            Arc::new(EnvTokenAuthenticator::with_token("T", Some("t".into()))),
        )
    }

    #[test]
    fn edit_urls() {
        let api = api();
        assert_eq!(
            api.edit_url("com.example", None, "", false).unwrap().as_str(),
            "https://androidpublisher.googleapis.com/androidpublisher/v3/applications/com.example/edits"
        );
        assert_eq!(
            api.edit_url("com.example", Some("e1"), "/bundles", true).unwrap().as_str(),
            "https://androidpublisher.googleapis.com/upload/androidpublisher/v3/applications/com.example/edits/e1/bundles"
        );
        assert_eq!(
            api.edit_url("com.example", Some("e1"), ":commit", false).unwrap().as_str(),
            "https://androidpublisher.googleapis.com/androidpublisher/v3/applications/com.example/edits/e1:commit"
        );
    }
}
