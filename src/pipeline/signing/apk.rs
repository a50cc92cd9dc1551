//! Package archive signing: align, sign, verify.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::ArtifactSigner;
use super::config::{CHILD_KEY_PASSWORD_VAR, CHILD_STORE_PASSWORD_VAR, SigningConfig};
use crate::pipeline::artifact::{ArtifactInfo, ArtifactKind};
use crate::pipeline::error::Result;
use crate::pipeline::process::{CommandRunner, CommandSpec, LineSink};
use crate::pipeline::tools::{Tool, ToolLocator};

/// Signs `.apk` files with `zipalign` and `apksigner`.
pub struct ApkSigner {
    runner: Arc<dyn CommandRunner>,
    locator: ToolLocator,
}

impl ApkSigner {
    /// Creates a signer using build-tools from `locator`.
    pub fn new(runner: Arc<dyn CommandRunner>, locator: ToolLocator) -> Self {
        Self { runner, locator }
    }
}

#[async_trait]
impl ArtifactSigner for ApkSigner {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::PackageArchive
    }

    async fn sign(
        &self,
        artifact: &ArtifactInfo,
        config: &SigningConfig,
        output: &Path,
        sink: LineSink<'_>,
    ) -> Result<ArtifactInfo> {
        // Both tools are resolved up front so a missing one fails before any work
        let zipalign = self.locator.find(Tool::Zipalign)?;
        let apksigner = self.locator.find(Tool::Apksigner)?;

        let aligned = output.with_extension("aligned.apk");
        let align = CommandSpec::new(zipalign)
            .args(["-p", "-f", "4"])
            .arg(artifact.path.to_string_lossy())
            .arg(aligned.to_string_lossy());
        self.runner.run(&align, sink).await?.check(&align)?;

        let mut sign = CommandSpec::new(&apksigner)
            .arg("sign")
            .arg("--ks")
            .arg(config.keystore_path.to_string_lossy())
            .arg("--ks-key-alias")
            .arg(&config.key_alias)
            .arg("--ks-pass")
            .arg(format!("env:{CHILD_STORE_PASSWORD_VAR}"))
            .arg("--key-pass")
            .arg(format!("env:{CHILD_KEY_PASSWORD_VAR}"))
            .arg("--out")
            .arg(output.to_string_lossy())
            .arg(aligned.to_string_lossy());
        for (key, value) in config.child_env() {
            sign = sign.env(key, value);
        }
        let signed = self.runner.run(&sign, sink).await;
        let _ = tokio::fs::remove_file(&aligned).await;
        signed?.check(&sign)?;

        let verify = CommandSpec::new(&apksigner)
            .arg("verify")
            .arg(output.to_string_lossy());
        self.runner.run(&verify, sink).await?.check(&verify)?;

        artifact.signed_copy(output).await
    }
}
