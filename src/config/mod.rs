//! Pipeline configuration loaded from `release.toml`.
//!
//! ```toml
//! [project]
//! module = "app"
//! flavor = "prod"
//! build_type = "release"
//!
//! [signing]
//! keystore_path = "keystore/release.jks"
//! key_alias = "upload"
//!
//! [destinations.firebase]
//! app_id = "1:1234567890:android:abc123"
//! project_number = "1234567890"
//! groups = ["qa"]
//!
//! [destinations.play]
//! package_name = "com.example.app"
//! track = "internal"
//!
//! [destinations.local]
//! output_dir = "dist"
//! ```
//!
//! Destination tables are closed: an unknown `[destinations.<name>]` fails at
//! load time rather than surfacing mid-run.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CliError, ReleaseError, Result};
use crate::pipeline::ArtifactKind;

/// Default environment variable holding a bearer token for remote destinations.
pub const DEFAULT_TOKEN_ENV: &str = "MOBILE_RELEASE_ACCESS_TOKEN";

fn default_true() -> bool {
    true
}

fn default_module() -> String {
    "app".to_string()
}

fn default_build_type() -> String {
    "release".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_track() -> String {
    "internal".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Project layout and build variant
    #[serde(default)]
    pub project: ProjectConfig,
    /// Release signing inputs
    #[serde(default)]
    pub signing: SigningSection,
    /// Destinations to deploy to
    #[serde(default)]
    pub destinations: DestinationsConfig,
    /// Deployment behavior
    #[serde(default)]
    pub deploy: DeployConfig,
    /// Remote authentication
    #[serde(default)]
    pub auth: AuthConfig,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project root, relative to the config file
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Application module directory
    #[serde(default = "default_module")]
    pub module: String,
    /// Product flavor
    #[serde(default)]
    pub flavor: Option<String>,
    /// Build type
    #[serde(default = "default_build_type")]
    pub build_type: String,
    /// Override of the tracked source paths used for cache digests
    #[serde(default)]
    pub tracked_paths: Option<Vec<String>>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            module: default_module(),
            flavor: None,
            build_type: default_build_type(),
            tracked_paths: None,
        }
    }
}

/// `[signing]` section. Every field may instead come from the environment.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningSection {
    /// Keystore file
    pub keystore_path: Option<PathBuf>,
    /// Key alias inside the keystore
    pub key_alias: Option<String>,
    /// Keystore password
    pub store_password: Option<String>,
    /// Key password
    pub key_password: Option<String>,
}

impl std::fmt::Debug for SigningSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSection")
            .field("keystore_path", &self.keystore_path)
            .field("key_alias", &self.key_alias)
            .field("store_password", &self.store_password.as_ref().map(|_| "<redacted>"))
            .field("key_password", &self.key_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `[destinations.*]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationsConfig {
    /// Lab-grade internal distribution
    pub firebase: Option<FirebaseConfig>,
    /// Store-grade publishing
    pub play: Option<PlayConfig>,
    /// iOS store-grade publishing of a pre-built archive
    pub testflight: Option<TestFlightConfig>,
    /// Copy to a local directory
    pub local: Option<LocalConfig>,
}

/// `[destinations.firebase]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirebaseConfig {
    /// Whether this destination participates in the run
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Firebase app id (`1:<number>:android:<hash>`)
    pub app_id: Option<String>,
    /// Numeric project number
    pub project_number: Option<String>,
    /// Preferred artifact kind (default: package archive)
    #[serde(default)]
    pub artifact: Option<ArtifactKind>,
    /// Tester groups to notify
    #[serde(default)]
    pub groups: Vec<String>,
    /// Individual tester emails
    #[serde(default)]
    pub testers: Vec<String>,
    /// Release notes
    #[serde(default)]
    pub release_notes: Option<String>,
}

/// Release status of a store track release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseStatus {
    /// Fully rolled out
    #[default]
    Completed,
    /// Staged rollout
    InProgress,
    /// Not yet available
    Draft,
    /// Rollout stopped
    Halted,
}

/// `[destinations.play]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayConfig {
    /// Whether this destination participates in the run
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Application id on the store
    pub package_name: Option<String>,
    /// Release track (`internal`, `alpha`, `beta`, `production`)
    #[serde(default = "default_track")]
    pub track: String,
    /// Release status
    #[serde(default)]
    pub status: ReleaseStatus,
    /// Rollout fraction in `(0, 1]`
    #[serde(default)]
    pub rollout: Option<f64>,
    /// Release notes
    #[serde(default)]
    pub release_notes: Option<String>,
    /// Language of the release notes
    #[serde(default = "default_language")]
    pub release_notes_language: String,
    /// Optional release name shown in the console
    #[serde(default)]
    pub release_name: Option<String>,
}

/// `[destinations.testflight]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestFlightConfig {
    /// Whether this destination participates in the run
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pre-built `.ipa` to upload
    pub ipa_path: Option<PathBuf>,
    /// App Store Connect API key id
    pub api_key_id: Option<String>,
    /// App Store Connect issuer id
    pub api_issuer: Option<String>,
}

/// `[destinations.local]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Whether this destination participates in the run
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory to copy artifacts into
    pub output_dir: Option<PathBuf>,
    /// Preferred artifact kind (default: package archive)
    #[serde(default)]
    pub artifact: Option<ArtifactKind>,
}

/// `[deploy]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeployConfig {
    /// Upper bound on concurrent destination uploads
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Skip the interactive confirmation gate
    #[serde(default)]
    pub assume_yes: bool,
}

impl DeployConfig {
    /// Effective worker count: configured value, else CPU count capped at 4.
    pub fn workers(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// `[auth]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
        }
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(text: &str) -> Result<PipelineConfig> {
    Ok(toml::from_str(text)?)
}

/// Loads configuration from a file, resolving the project root against the
/// file's directory.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ReleaseError::Cli(CliError::ExecutionFailed {
            command: "read_config".to_string(),
            reason: format!("Failed to read {}: {}", path.display(), e),
        })
    })?;

    let mut config = parse_config(&text)?;

    if config.project.root.is_relative() {
        let base = path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(base) = base {
            config.project.root = base.join(&config.project.root);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_has_no_destinations() {
        let config = parse_config("").unwrap();
        assert!(config.destinations.firebase.is_none());
        assert!(config.destinations.play.is_none());
        assert_eq!(config.project.module, "app");
        assert_eq!(config.project.build_type, "release");
    }

    #[test]
    fn destination_tables_default_to_enabled() {
        let config = parse_config(
            r#"
            [destinations.play]
            package_name = "com.example.app"
            status = "inProgress"
            rollout = 0.25

            [destinations.firebase]
            enabled = false
            artifact = "aab"
            "#,
        )
        .unwrap();

        let play = config.destinations.play.unwrap();
        assert!(play.enabled);
        assert_eq!(play.track, "internal");
        assert_eq!(play.status, ReleaseStatus::InProgress);
        let firebase = config.destinations.firebase.unwrap();
        assert!(!firebase.enabled);
        assert_eq!(firebase.artifact, Some(ArtifactKind::AppBundle));
    }

    #[test]
    fn unknown_destination_is_rejected_at_load() {
        let err = parse_config("[destinations.appcenter]\nenabled = true\n").unwrap_err();
        assert!(err.to_string().contains("appcenter"));
    }

    #[test]
    fn signing_debug_redacts_passwords() {
        let config = parse_config(
            "[signing]\nkey_alias = \"upload\"\nstore_password = \"s3cret\"\n",
        )
        .unwrap();
        let rendered = format!("{:?}", config.signing);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("upload"));
    }

    #[test]
    fn relative_root_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release.toml");
        std::fs::write(&path, "[project]\nroot = \"android\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.project.root, dir.path().join("android"));
    }
}
