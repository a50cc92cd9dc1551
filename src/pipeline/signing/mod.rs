//! Release signing.
//!
//! Signing only runs when some destination demands a signed artifact. Every
//! failure on this path degrades to passing the artifact through unsigned with
//! a warning; validation then decides which destinations can still be served.

mod apk;
mod bundle;
mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use apk::ApkSigner;
pub use bundle::BundleSigner;
pub use config::{KEY_ALIAS_ENV, KEY_PASSWORD_ENV, KEYSTORE_PATH_ENV, STORE_PASSWORD_ENV, SigningConfig};

use super::artifact::{ArtifactInfo, ArtifactKind, DestinationRequirement};
use super::cache::STATE_DIR;
use super::error::{Error, Result};
use super::process::{CommandRunner, LineSink};
use super::tools::ToolLocator;
use crate::config::SigningSection;
use crate::utils::fs;

/// Directory under the state dir receiving signed outputs.
pub const SIGNED_DIR: &str = "signed";

/// Kind-specific signing procedure.
#[async_trait]
pub trait ArtifactSigner: Send + Sync {
    /// Kind this signer handles.
    fn kind(&self) -> ArtifactKind;

    /// Signs `artifact` into `output` and verifies the result.
    ///
    /// Returns a new snapshot for `output`; the input file is left untouched.
    async fn sign(
        &self,
        artifact: &ArtifactInfo,
        config: &SigningConfig,
        output: &Path,
        sink: LineSink<'_>,
    ) -> Result<ArtifactInfo>;
}

/// Artifacts after signing plus what went wrong along the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SigningReport {
    /// One entry per input artifact, signed where possible
    pub artifacts: Vec<ArtifactInfo>,
    /// Non-fatal signing failures
    pub warnings: Vec<String>,
}

/// Signs built artifacts that need it.
pub struct SigningOrchestrator {
    root: PathBuf,
    section: SigningSection,
    env: HashMap<String, String>,
    signers: Vec<Box<dyn ArtifactSigner>>,
}

impl std::fmt::Debug for SigningOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningOrchestrator")
            .field("root", &self.root)
            .field("section", &self.section)
            .finish()
    }
}

impl SigningOrchestrator {
    /// Creates an orchestrator with the standard signers for both kinds.
    pub fn new(
        root: impl Into<PathBuf>,
        section: SigningSection,
        runner: Arc<dyn CommandRunner>,
        locator: ToolLocator,
    ) -> Self {
        Self {
            root: root.into(),
            section,
            env: std::env::vars().collect(),
            signers: vec![
                Box::new(ApkSigner::new(runner.clone(), locator.clone())),
                Box::new(BundleSigner::new(runner, locator)),
            ],
        }
    }

    /// Replaces the environment used for credential fallback.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Whether any requirement demands a signed artifact.
    pub fn requires_signing(requirements: &[DestinationRequirement]) -> bool {
        requirements.iter().any(|r| r.must_be_signed)
    }

    /// Where the signed form of `artifact` is written.
    pub fn signed_path(&self, artifact: &ArtifactInfo) -> PathBuf {
        let stem = artifact
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let stem = stem.strip_suffix("-unsigned").unwrap_or(&stem);
        self.root
            .join(STATE_DIR)
            .join(SIGNED_DIR)
            .join(format!("{}-signed.{}", stem, artifact.kind.extension()))
    }

    /// Signs every unsigned artifact when `requirements` call for it.
    ///
    /// Never fails: credential, tool and command errors leave the artifact
    /// unsigned and add a warning.
    pub async fn sign_all(
        &self,
        artifacts: Vec<ArtifactInfo>,
        requirements: &[DestinationRequirement],
        sink: LineSink<'_>,
    ) -> SigningReport {
        if !Self::requires_signing(requirements) {
            log::debug!("No destination requires signing, skipping");
            return SigningReport {
                artifacts,
                warnings: Vec::new(),
            };
        }

        if artifacts.iter().all(|a| a.is_signed) {
            return SigningReport {
                artifacts,
                warnings: Vec::new(),
            };
        }

        let config = match SigningConfig::resolve(&self.section, &self.root, &self.env) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Signing unavailable, continuing unsigned: {}", e);
                return SigningReport {
                    artifacts,
                    warnings: vec![format!("signing skipped: {e}")],
                };
            }
        };
        log::debug!("Signing with {:?}", config);

        let mut report = SigningReport::default();
        for artifact in artifacts {
            if artifact.is_signed {
                report.artifacts.push(artifact);
                continue;
            }
            match self.sign_one(&artifact, &config, sink).await {
                Ok(signed) => {
                    log::info!("✓ Signed {}: {}", signed.kind, signed.path.display());
                    report.artifacts.push(signed);
                }
                Err(e) => {
                    log::warn!("Failed to sign {}: {}", artifact.file_name(), e);
                    report
                        .warnings
                        .push(format!("{} left unsigned: {}", artifact.kind, e));
                    report.artifacts.push(artifact);
                }
            }
        }
        report
    }

    async fn sign_one(
        &self,
        artifact: &ArtifactInfo,
        config: &SigningConfig,
        sink: LineSink<'_>,
    ) -> Result<ArtifactInfo> {
        let signer = self
            .signers
            .iter()
            .find(|s| s.kind() == artifact.kind)
            .ok_or_else(|| Error::GenericError(format!("no signer for {}", artifact.kind)))?;

        let output = self.signed_path(artifact);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        signer.sign(artifact, config, &output, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::process::testing::{FakeRunner, failed_output, ok_output};
    use crate::pipeline::process::{CommandOutput, CommandSpec, discard_output};
    use crate::pipeline::run_cache::RunCache;
    use crate::pipeline::tools::Tool;

    struct Project {
        dir: tempfile::TempDir,
        apk: ArtifactInfo,
        aab: ArtifactInfo,
    }

    async fn project() -> Project {
        let dir = tempfile::tempdir().unwrap();
        let sdk = dir.path().join("sdk/build-tools/34.0.0");
        let jdk = dir.path().join("jdk/bin");
        std::fs::create_dir_all(&sdk).unwrap();
        std::fs::create_dir_all(&jdk).unwrap();
        for tool in [Tool::Zipalign, Tool::Apksigner] {
            std::fs::write(sdk.join(tool.executable()), "").unwrap();
        }
        std::fs::write(jdk.join(Tool::Jarsigner.executable()), "").unwrap();
        std::fs::write(dir.path().join("release.jks"), b"ks").unwrap();

        let apk_path = dir.path().join("app-release-unsigned.apk");
        let aab_path = dir.path().join("app-release.aab");
        std::fs::write(&apk_path, b"apk").unwrap();
        std::fs::write(&aab_path, b"aab").unwrap();

        Project {
            apk: ArtifactInfo::from_file(ArtifactKind::PackageArchive, &apk_path, false)
                .await
                .unwrap(),
            aab: ArtifactInfo::from_file(ArtifactKind::AppBundle, &aab_path, false)
                .await
                .unwrap(),
            dir,
        }
    }

    fn locator(root: &Path) -> ToolLocator {
        ToolLocator::new(root, Arc::new(RunCache::new()))
            .with_env([
                ("ANDROID_HOME", root.join("sdk").display().to_string()),
                ("JAVA_HOME", root.join("jdk").display().to_string()),
            ])
            .with_default_sdk_dirs(Vec::new())
            .without_path_search()
    }

    fn section() -> SigningSection {
        SigningSection {
            keystore_path: Some(PathBuf::from("release.jks")),
            key_alias: Some("upload".into()),
            store_password: Some("hunter2".into()),
            key_password: None,
        }
    }

    /// Behaves like the real tools: writes whatever output path it is given.
    fn writing_signer(spec: &CommandSpec) -> CommandOutput {
        let args = &spec.args;
        let out = if let Some(i) = args.iter().position(|a| a == "--out" || a == "-signedjar") {
            Some(args[i + 1].clone())
        } else if spec.program_name().starts_with("zipalign") {
            args.last().cloned()
        } else {
            None
        };
        if let Some(out) = out {
            std::fs::write(out, b"signed").unwrap();
        }
        if args.first().map(String::as_str) == Some("-verify") {
            return CommandOutput {
                code: Some(0),
                stdout: vec!["jar verified.".into()],
                stderr: Vec::new(),
            };
        }
        ok_output()
    }

    fn orchestrator(p: &Project, section: SigningSection, runner: Arc<FakeRunner>) -> SigningOrchestrator {
        SigningOrchestrator::new(p.dir.path(), section, runner, locator(p.dir.path()))
            .with_env(Vec::<(String, String)>::new())
    }

    fn store_requirement() -> Vec<DestinationRequirement> {
        vec![DestinationRequirement::new(ArtifactKind::AppBundle, true, "play")]
    }

    #[tokio::test]
    async fn no_signing_requirement_short_circuits() {
        let p = project().await;
        let runner = Arc::new(FakeRunner::new(writing_signer));
        let reqs = vec![DestinationRequirement::new(ArtifactKind::PackageArchive, false, "firebase")];

        let report = orchestrator(&p, SigningSection::default(), runner.clone())
            .sign_all(vec![p.apk.clone()], &reqs, &discard_output)
            .await;

        assert_eq!(report.artifacts, vec![p.apk.clone()]);
        assert!(report.warnings.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_pass_artifacts_through_unsigned() {
        let p = project().await;
        let runner = Arc::new(FakeRunner::new(writing_signer));

        let report = orchestrator(&p, SigningSection::default(), runner.clone())
            .sign_all(vec![p.apk.clone(), p.aab.clone()], &store_requirement(), &discard_output)
            .await;

        assert_eq!(report.artifacts.len(), 2);
        assert!(report.artifacts.iter().all(|a| !a.is_signed));
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("keystore_path"));
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signs_both_kinds_into_state_dir_without_exposing_passwords() {
        let p = project().await;
        let runner = Arc::new(FakeRunner::new(writing_signer));

        let report = orchestrator(&p, section(), runner.clone())
            .sign_all(vec![p.apk.clone(), p.aab.clone()], &store_requirement(), &discard_output)
            .await;

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        let signed_dir = p.dir.path().join(STATE_DIR).join(SIGNED_DIR);
        assert_eq!(report.artifacts[0].path, signed_dir.join("app-release-signed.apk"));
        assert_eq!(report.artifacts[1].path, signed_dir.join("app-release-signed.aab"));
        assert!(report.artifacts.iter().all(|a| a.is_signed));

        // Originals untouched
        assert_eq!(std::fs::read(&p.apk.path).unwrap(), b"apk");

        let calls = runner.calls();
        assert_eq!(runner.count_program("zipalign"), 1);
        assert_eq!(runner.count_program("apksigner"), 2);
        assert_eq!(runner.count_program("jarsigner"), 2);
        for call in &calls {
            assert!(!call.to_string().contains("hunter2"));
        }
        assert!(
            calls
                .iter()
                .any(|c| c.env.iter().any(|(_, v)| v == "hunter2"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_verification_leaves_artifact_unsigned() {
        let p = project().await;
        let runner = Arc::new(FakeRunner::new(|spec| {
            if spec.args.first().map(String::as_str) == Some("verify") {
                failed_output(1)
            } else {
                writing_signer(spec)
            }
        }));

        let report = orchestrator(&p, section(), runner)
            .sign_all(vec![p.apk.clone(), p.aab.clone()], &store_requirement(), &discard_output)
            .await;

        assert!(!report.artifacts[0].is_signed);
        assert_eq!(report.artifacts[0].path, p.apk.path);
        assert!(report.artifacts[1].is_signed);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("PackageArchive left unsigned"));
    }

    #[tokio::test]
    async fn missing_tool_is_non_fatal() {
        let p = project().await;
        let runner = Arc::new(FakeRunner::new(writing_signer));
        let bare = ToolLocator::new(p.dir.path(), Arc::new(RunCache::new()))
            .with_env(Vec::<(String, String)>::new())
            .with_default_sdk_dirs(Vec::new())
            .without_path_search();

        let report = SigningOrchestrator::new(p.dir.path(), section(), runner.clone(), bare)
            .with_env(Vec::<(String, String)>::new())
            .sign_all(vec![p.aab.clone()], &store_requirement(), &discard_output)
            .await;

        assert!(!report.artifacts[0].is_signed);
        assert!(report.warnings[0].contains("jarsigner not found"));
        assert!(runner.calls().is_empty());
    }
}
