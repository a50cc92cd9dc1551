//! Store-grade publishing through an edit transaction.
//!
//! An edit moves through four steps: create, upload, assign, commit. Nothing
//! is visible to users until commit. A failed step returns immediately with
//! the step name attached and the edit is abandoned uncommitted; no delete
//! call is issued, the service expires abandoned edits itself.

mod api;
mod client;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use api::{LocalizedText, PlayApi, TrackRelease};
pub use client::{HttpPlayApi, PUBLISHER_API};

use super::{Delivery, DeployStrategy};
use crate::config::{PlayConfig, ReleaseStatus};
use crate::pipeline::artifact::{ArtifactInfo, ArtifactKind};
use crate::pipeline::destination::DestinationKind;
use crate::pipeline::error::{Context, Error, Result};

/// Edit session opened, nothing uploaded.
pub struct Created;

/// Bundle uploaded into the edit.
pub struct Uploaded {
    version_code: i64,
}

/// Bundle attached to a track.
pub struct Assigned {
    version_code: i64,
}

fn step_error(step: &'static str, source: Error) -> Error {
    Error::EditStep {
        step,
        source: Box::new(source),
    }
}

/// An edit session in state `S`.
///
/// Each transition consumes the transaction, so a step can only run after
/// the previous one succeeded and commit is unreachable after a failure.
pub struct EditTransaction<'a, S> {
    api: &'a dyn PlayApi,
    package: &'a str,
    edit_id: String,
    state: S,
}

impl<'a, S> EditTransaction<'a, S> {
    /// Server-assigned edit id.
    pub fn edit_id(&self) -> &str {
        &self.edit_id
    }
}

impl<'a> EditTransaction<'a, Created> {
    /// Opens an edit session.
    pub async fn open(api: &'a dyn PlayApi, package: &'a str) -> Result<Self> {
        let edit_id = api
            .create_edit(package)
            .await
            .map_err(|e| step_error("create", e))?;
        log::debug!("Opened edit {} for {}", edit_id, package);
        Ok(Self {
            api,
            package,
            edit_id,
            state: Created,
        })
    }

    /// Uploads the bundle.
    pub async fn upload(self, bundle: &ArtifactInfo) -> Result<EditTransaction<'a, Uploaded>> {
        let version_code = self
            .api
            .upload_bundle(self.package, &self.edit_id, &bundle.path)
            .await
            .map_err(|e| step_error("upload", e))?;
        log::info!("Uploaded {} as version code {}", bundle.file_name(), version_code);
        Ok(EditTransaction {
            api: self.api,
            package: self.package,
            edit_id: self.edit_id,
            state: Uploaded { version_code },
        })
    }
}

impl<'a> EditTransaction<'a, Uploaded> {
    /// Version code assigned by the server.
    pub fn version_code(&self) -> i64 {
        self.state.version_code
    }

    /// Attaches the uploaded bundle to `track`.
    pub async fn assign(self, track: &str, release: TrackRelease) -> Result<EditTransaction<'a, Assigned>> {
        self.api
            .assign_track(self.package, &self.edit_id, track, &release)
            .await
            .map_err(|e| step_error("assign", e))?;
        Ok(EditTransaction {
            api: self.api,
            package: self.package,
            edit_id: self.edit_id,
            state: Assigned {
                version_code: self.state.version_code,
            },
        })
    }
}

impl<'a> EditTransaction<'a, Assigned> {
    /// Commits the edit and returns the published version code.
    pub async fn commit(self) -> Result<i64> {
        self.api
            .commit_edit(self.package, &self.edit_id)
            .await
            .map_err(|e| step_error("commit", e))?;
        Ok(self.state.version_code)
    }
}

/// Publishes bundles to a store track.
pub struct PlayPublisher {
    config: PlayConfig,
    api: Arc<dyn PlayApi>,
}

impl PlayPublisher {
    /// Creates the strategy.
    pub fn new(config: PlayConfig, api: Arc<dyn PlayApi>) -> Self {
        Self { config, api }
    }

    fn package(&self) -> Result<&str> {
        self.config
            .package_name
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::MissingConfig {
                destination: DestinationKind::Play.to_string(),
                field: "package_name".to_string(),
            })
    }

    /// Track release for `version_code` from the configuration.
    ///
    /// The rollout fraction is only sent for in-progress releases below 100%.
    pub fn release_for(&self, version_code: i64) -> TrackRelease {
        let user_fraction = match (self.config.status, self.config.rollout) {
            (ReleaseStatus::InProgress, Some(f)) if f > 0.0 && f < 1.0 => Some(f),
            _ => None,
        };
        let release_notes = self
            .config
            .release_notes
            .iter()
            .filter(|n| !n.is_empty())
            .map(|text| LocalizedText {
                language: self.config.release_notes_language.clone(),
                text: text.clone(),
            })
            .collect();

        TrackRelease {
            name: self.config.release_name.clone(),
            version_codes: vec![version_code.to_string()],
            status: self.config.status,
            user_fraction,
            release_notes,
        }
    }
}

#[async_trait]
impl DeployStrategy for PlayPublisher {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Play
    }

    fn validate(&self) -> Result<()> {
        self.package()?;
        match self.config.rollout {
            Some(f) if !(f > 0.0 && f <= 1.0) => Err(Error::GenericError(format!(
                "play: rollout must be in (0, 1], got {f}"
            ))),
            _ => Ok(()),
        }
    }

    async fn upload(&self, artifact: Option<&ArtifactInfo>, cancel: &CancellationToken) -> Result<Delivery> {
        let bundle = artifact
            .filter(|a| a.kind == ArtifactKind::AppBundle)
            .context("play needs a built AppBundle")?;
        let package = self.package()?;
        let track = self.config.track.as_str();

        let edit = EditTransaction::open(self.api.as_ref(), package).await?;
        let edit = edit.upload(bundle).await?;
        let release = self.release_for(edit.version_code());
        let edit = edit.assign(track, release).await?;

        if cancel.is_cancelled() {
            log::warn!("Cancelled before commit, abandoning edit {}", edit.edit_id());
            return Err(Error::Cancelled);
        }

        let version_code = edit.commit().await?;
        Ok(Delivery::new(format!("Published version {version_code} to {track}"))
            .build_id(version_code.to_string())
            .build_url(format!(
                "https://play.google.com/console/developers/app/{package}/tracks/{track}"
            )))
    }
}
