//! Android Publisher edit operations.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ReleaseStatus;
use crate::pipeline::error::Result;

/// Localized release notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    /// BCP-47 language tag
    pub language: String,
    /// Notes text
    pub text: String,
}

/// A release entry on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRelease {
    /// Name shown in the console
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version codes in this release
    pub version_codes: Vec<String>,
    /// Release status
    pub status: ReleaseStatus,
    /// Staged rollout fraction, only for in-progress releases
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_fraction: Option<f64>,
    /// Notes per language
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub release_notes: Vec<LocalizedText>,
}

/// Remote edit-session operations used by the publishing transaction.
#[async_trait]
pub trait PlayApi: Send + Sync {
    /// Opens an edit session and returns its id.
    async fn create_edit(&self, package: &str) -> Result<String>;

    /// Uploads a bundle into the edit and returns its version code.
    async fn upload_bundle(&self, package: &str, edit_id: &str, bundle: &Path) -> Result<i64>;

    /// Replaces the releases of `track` with `release`.
    async fn assign_track(&self, package: &str, edit_id: &str, track: &str, release: &TrackRelease) -> Result<()>;

    /// Commits the edit, making it visible.
    async fn commit_edit(&self, package: &str, edit_id: &str) -> Result<()>;
}
