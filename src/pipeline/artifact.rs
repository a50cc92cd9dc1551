//! Artifact and requirement data model.
//!
//! [`ArtifactInfo`] values are snapshots: signing never mutates one in place, it
//! produces a new value pointing at the signed output via [`ArtifactInfo::signed_copy`].

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{ErrorExt, Result};

/// Platform-specific packaging format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Single-install package (`.apk`).
    #[serde(alias = "apk")]
    PackageArchive,
    /// Store-upload bundle (`.aab`).
    #[serde(alias = "aab")]
    AppBundle,
}

impl ArtifactKind {
    /// File extension produced by the toolchain, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::PackageArchive => "apk",
            ArtifactKind::AppBundle => "aab",
        }
    }

    /// Short name used in cache keys and file names.
    pub fn slug(&self) -> &'static str {
        self.extension()
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::PackageArchive => write!(f, "PackageArchive"),
            ArtifactKind::AppBundle => write!(f, "AppBundle"),
        }
    }
}

/// Target platform of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Android artifacts built by this pipeline.
    Android,
    /// iOS archives supplied pre-built.
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
        }
    }
}

/// What one enabled destination needs before it can be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationRequirement {
    /// Artifact kind the destination accepts
    pub kind: ArtifactKind,
    /// Whether an unsigned artifact is unacceptable
    pub must_be_signed: bool,
    /// Destination display name
    pub destination_name: String,
}

impl DestinationRequirement {
    /// Creates a requirement.
    pub fn new(kind: ArtifactKind, must_be_signed: bool, destination_name: impl Into<String>) -> Self {
        Self {
            kind,
            must_be_signed,
            destination_name: destination_name.into(),
        }
    }
}

/// A built artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// Packaging format
    pub kind: ArtifactKind,
    /// Absolute path to the file
    pub path: PathBuf,
    /// Whether the file carries a release signature
    pub is_signed: bool,
    /// Size of the file in bytes
    pub size_bytes: u64,
}

impl ArtifactInfo {
    /// Creates an artifact snapshot from a file, reading its size.
    pub async fn from_file(kind: ArtifactKind, path: &Path, is_signed: bool) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .fs_context("reading artifact metadata", path)?;
        Ok(Self {
            kind,
            path: path.to_path_buf(),
            is_signed,
            size_bytes: metadata.len(),
        })
    }

    /// Returns a new snapshot for the signed output of this artifact.
    ///
    /// The original value is left untouched so that concurrent readers never
    /// observe a half-updated signing state.
    pub async fn signed_copy(&self, signed_path: &Path) -> Result<Self> {
        Self::from_file(self.kind, signed_path, true).await
    }

    /// File name for display.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Package identity extracted from an artifact for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Application id (`com.example.app`)
    pub package_id: String,
    /// Human-readable version
    pub version_name: Option<String>,
    /// Monotonic version code
    pub version_code: Option<String>,
}

/// Parses the `package:` line printed by `aapt2 dump badging`.
pub fn parse_badging(output: &str) -> Option<ArtifactMetadata> {
    let line = output.lines().find(|l| l.starts_with("package:"))?;
    let attr = |name: &str| -> Option<String> {
        let re = Regex::new(&format!(r"\b{name}='([^']*)'")).ok()?;
        re.captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    Some(ArtifactMetadata {
        package_id: attr("name")?,
        version_name: attr("versionName").filter(|v| !v.is_empty()),
        version_code: attr("versionCode").filter(|v| !v.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_report_wording() {
        assert_eq!(ArtifactKind::PackageArchive.to_string(), "PackageArchive");
        assert_eq!(ArtifactKind::AppBundle.to_string(), "AppBundle");
        assert_eq!(ArtifactKind::AppBundle.extension(), "aab");
    }

    #[test]
    fn parses_badging_package_line() {
        let out = "package: name='com.example.app' versionCode='42' versionName='1.4.0' platformBuildVersionName='14'\n\
                   sdkVersion:'24'\n";
        let meta = parse_badging(out).unwrap();
        assert_eq!(meta.package_id, "com.example.app");
        assert_eq!(meta.version_code.as_deref(), Some("42"));
        assert_eq!(meta.version_name.as_deref(), Some("1.4.0"));
    }

    #[test]
    fn badging_without_package_line_is_none() {
        assert!(parse_badging("sdkVersion:'24'").is_none());
    }

    #[tokio::test]
    async fn signed_copy_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("app-release-unsigned.apk");
        let signed = dir.path().join("app-release-signed.apk");
        tokio::fs::write(&raw, b"raw").await.unwrap();
        tokio::fs::write(&signed, b"signed!").await.unwrap();

        let original = ArtifactInfo::from_file(ArtifactKind::PackageArchive, &raw, false)
            .await
            .unwrap();
        let copy = original.signed_copy(&signed).await.unwrap();

        assert!(!original.is_signed);
        assert_eq!(original.path, raw);
        assert!(copy.is_signed);
        assert_eq!(copy.size_bytes, 7);
    }
}
