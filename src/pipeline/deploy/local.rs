//! Copy to a local directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use path_absolutize::Absolutize;
use tokio_util::sync::CancellationToken;

use super::{Delivery, DeployStrategy};
use crate::config::LocalConfig;
use crate::pipeline::artifact::ArtifactInfo;
use crate::pipeline::destination::DestinationKind;
use crate::pipeline::error::{Context, Error, Result};
use crate::utils::{checksum, fs};

/// Copies the artifact into `output_dir` with a `.sha256` sidecar.
pub struct LocalCopy {
    config: LocalConfig,
    root: PathBuf,
}

impl LocalCopy {
    /// Creates the strategy; a relative `output_dir` resolves against `root`.
    pub fn new(config: LocalConfig, root: &Path) -> Self {
        Self {
            config,
            root: root.to_path_buf(),
        }
    }

    fn output_dir(&self) -> Result<PathBuf> {
        let dir = self.config.output_dir.as_ref().ok_or_else(|| Error::MissingConfig {
            destination: DestinationKind::Local.to_string(),
            field: "output_dir".to_string(),
        })?;
        let dir = if dir.is_relative() { self.root.join(dir) } else { dir.clone() };
        Ok(dir.absolutize()?.into_owned())
    }
}

#[async_trait]
impl DeployStrategy for LocalCopy {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Local
    }

    fn validate(&self) -> Result<()> {
        self.output_dir().map(|_| ())
    }

    async fn upload(&self, artifact: Option<&ArtifactInfo>, _cancel: &CancellationToken) -> Result<Delivery> {
        let artifact = artifact.context("local copy needs a built artifact")?;
        let dir = self.output_dir()?;
        fs::create_dir_all(&dir).await?;

        let target = dir.join(artifact.file_name());
        let bytes = fs::copy_file(&artifact.path, &target).await?;
        let digest = checksum::write_checksum_file(&target).await?;

        Ok(Delivery::new(format!("Copied {} ({} bytes)", artifact.file_name(), bytes))
            .build_id(&digest[..12])
            .build_url(target.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::artifact::ArtifactKind;

    fn config(output_dir: Option<&str>) -> LocalConfig {
        LocalConfig {
            enabled: true,
            output_dir: output_dir.map(PathBuf::from),
            artifact: None,
        }
    }

    #[test]
    fn missing_output_dir_fails_validation() {
        let err = LocalCopy::new(config(None), Path::new("/p")).validate().unwrap_err();
        assert_eq!(err.to_string(), "local: missing required configuration `output_dir`");
    }

    #[tokio::test]
    async fn copies_into_created_directory_and_reports_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app-release.apk");
        tokio::fs::write(&source, b"abc").await.unwrap();
        let artifact = ArtifactInfo::from_file(ArtifactKind::PackageArchive, &source, true)
            .await
            .unwrap();

        let strategy = LocalCopy::new(config(Some("dist/nightly")), dir.path());
        let delivery = strategy
            .upload(Some(&artifact), &CancellationToken::new())
            .await
            .unwrap();

        let copied = dir.path().join("dist/nightly/app-release.apk");
        assert_eq!(std::fs::read(&copied).unwrap(), b"abc");
        assert!(dir.path().join("dist/nightly/app-release.apk.sha256").is_file());
        assert_eq!(delivery.build_url, Some(copied.display().to_string()));
        assert_eq!(delivery.build_id.as_deref(), Some("ba7816bf8f01"));
    }
}
