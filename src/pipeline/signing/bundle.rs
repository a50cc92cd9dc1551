//! App bundle signing with `jarsigner`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::ArtifactSigner;
use super::config::{CHILD_KEY_PASSWORD_VAR, CHILD_STORE_PASSWORD_VAR, SigningConfig};
use crate::pipeline::artifact::{ArtifactInfo, ArtifactKind};
use crate::pipeline::error::{Error, Result};
use crate::pipeline::process::{CommandRunner, CommandSpec, LineSink};
use crate::pipeline::tools::{Tool, ToolLocator};

/// `jarsigner -verify` exits 0 for unsigned jars too; only this line proves a signature.
const VERIFIED_MARKER: &str = "jar verified";

/// Signs `.aab` files with the JDK's `jarsigner`.
pub struct BundleSigner {
    runner: Arc<dyn CommandRunner>,
    locator: ToolLocator,
}

impl BundleSigner {
    /// Creates a signer using the JDK found by `locator`.
    pub fn new(runner: Arc<dyn CommandRunner>, locator: ToolLocator) -> Self {
        Self { runner, locator }
    }
}

#[async_trait]
impl ArtifactSigner for BundleSigner {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::AppBundle
    }

    async fn sign(
        &self,
        artifact: &ArtifactInfo,
        config: &SigningConfig,
        output: &Path,
        sink: LineSink<'_>,
    ) -> Result<ArtifactInfo> {
        let jarsigner = self.locator.find(Tool::Jarsigner)?;

        let mut sign = CommandSpec::new(&jarsigner)
            .arg("-keystore")
            .arg(config.keystore_path.to_string_lossy())
            .arg("-storepass:env")
            .arg(CHILD_STORE_PASSWORD_VAR)
            .arg("-keypass:env")
            .arg(CHILD_KEY_PASSWORD_VAR)
            .arg("-signedjar")
            .arg(output.to_string_lossy())
            .arg(artifact.path.to_string_lossy())
            .arg(&config.key_alias);
        for (key, value) in config.child_env() {
            sign = sign.env(key, value);
        }
        self.runner.run(&sign, sink).await?.check(&sign)?;

        let verify = CommandSpec::new(&jarsigner)
            .arg("-verify")
            .arg(output.to_string_lossy());
        let result = self.runner.run(&verify, sink).await?.check(&verify)?;
        if !result.stdout.iter().any(|l| l.contains(VERIFIED_MARKER)) {
            return Err(Error::GenericError(format!(
                "signature verification failed for {}",
                output.display()
            )));
        }

        artifact.signed_copy(output).await
    }
}
