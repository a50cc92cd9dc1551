//! iOS uploads of a pre-built archive through `xcrun altool`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{Delivery, DeployStrategy};
use crate::config::TestFlightConfig;
use crate::pipeline::artifact::ArtifactInfo;
use crate::pipeline::destination::DestinationKind;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::process::{CommandRunner, CommandSpec};
use crate::pipeline::tools::{Tool, ToolLocator};

static DELIVERY_UUID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Delivery UUID:\s*([0-9A-Fa-f-]{36})").ok());

const APP_STORE_CONNECT_URL: &str = "https://appstoreconnect.apple.com/apps";

/// Uploads the configured `.ipa` to App Store Connect.
pub struct TestFlightUpload {
    config: TestFlightConfig,
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
    locator: ToolLocator,
    host_is_macos: bool,
}

impl TestFlightUpload {
    /// Creates the strategy; a relative `ipa_path` resolves against `root`.
    pub fn new(
        config: TestFlightConfig,
        root: &Path,
        runner: Arc<dyn CommandRunner>,
        locator: ToolLocator,
    ) -> Self {
        Self {
            config,
            root: root.to_path_buf(),
            runner,
            locator,
            host_is_macos: cfg!(target_os = "macos"),
        }
    }

    #[cfg(test)]
    fn on_macos(mut self, yes: bool) -> Self {
        self.host_is_macos = yes;
        self
    }

    fn missing(field: &str) -> Error {
        Error::MissingConfig {
            destination: DestinationKind::TestFlight.to_string(),
            field: field.to_string(),
        }
    }

    fn ipa_path(&self) -> Result<PathBuf> {
        let path = self.config.ipa_path.as_ref().ok_or_else(|| Self::missing("ipa_path"))?;
        Ok(if path.is_relative() { self.root.join(path) } else { path.clone() })
    }
}

/// Extracts the delivery id printed by `altool` after a successful upload.
pub fn parse_delivery_uuid(output: &str) -> Option<String> {
    DELIVERY_UUID
        .as_ref()?
        .captures(output)
        .map(|c| c[1].to_string())
}

#[async_trait]
impl DeployStrategy for TestFlightUpload {
    fn kind(&self) -> DestinationKind {
        DestinationKind::TestFlight
    }

    fn validate(&self) -> Result<()> {
        if !self.host_is_macos {
            crate::bail!("testflight uploads require macOS with Xcode installed");
        }
        self.ipa_path()?;
        if self.config.api_key_id.is_none() {
            return Err(Self::missing("api_key_id"));
        }
        if self.config.api_issuer.is_none() {
            return Err(Self::missing("api_issuer"));
        }
        Ok(())
    }

    async fn upload(&self, _artifact: Option<&ArtifactInfo>, _cancel: &CancellationToken) -> Result<Delivery> {
        let ipa = self.ipa_path()?;
        if !tokio::fs::try_exists(&ipa).await.unwrap_or(false) {
            crate::bail!("archive not found: {}", ipa.display());
        }
        let key_id = self.config.api_key_id.as_deref().ok_or_else(|| Self::missing("api_key_id"))?;
        let issuer = self.config.api_issuer.as_deref().ok_or_else(|| Self::missing("api_issuer"))?;

        let xcrun = self.locator.find(Tool::Xcrun)?;
        let spec = CommandSpec::new(xcrun)
            .args(["altool", "--upload-app", "--type", "ios", "--file"])
            .arg(ipa.to_string_lossy())
            .args(["--apiKey", key_id, "--apiIssuer", issuer]);

        let output = self
            .runner
            .run(&spec, &|line: &str| log::debug!("altool: {}", line))
            .await?
            .check(&spec)?;

        let text = [output.stdout.join("\n"), output.stderr.join("\n")].join("\n");
        let file = ipa
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut delivery = Delivery::new(format!("Uploaded {file} to App Store Connect"))
            .build_url(APP_STORE_CONNECT_URL);
        if let Some(uuid) = parse_delivery_uuid(&text) {
            delivery = delivery.build_id(uuid);
        }
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::process::CommandOutput;
    use crate::pipeline::process::testing::{FakeRunner, failed_output};
    use crate::pipeline::run_cache::RunCache;

    fn locator_with_xcrun(root: &Path) -> ToolLocator {
        let cache = Arc::new(RunCache::new());
        cache.remember_tool(Tool::Xcrun, PathBuf::from("/usr/bin/xcrun"));
        ToolLocator::new(root, cache).without_path_search()
    }

    fn config(ipa: Option<&str>) -> TestFlightConfig {
        TestFlightConfig {
            enabled: true,
            ipa_path: ipa.map(PathBuf::from),
            api_key_id: Some("KEY123".into()),
            api_issuer: Some("issuer-uuid".into()),
        }
    }

    #[test]
    fn requires_macos_and_archive_path() {
        let runner = Arc::new(FakeRunner::succeeding());
        let locator = locator_with_xcrun(Path::new("/p"));
        let linux = TestFlightUpload::new(config(Some("App.ipa")), Path::new("/p"), runner.clone(), locator.clone())
            .on_macos(false);
        assert!(linux.validate().unwrap_err().to_string().contains("macOS"));

        let no_ipa = TestFlightUpload::new(config(None), Path::new("/p"), runner, locator).on_macos(true);
        assert!(no_ipa.validate().unwrap_err().to_string().contains("ipa_path"));
    }

    #[test]
    fn parses_delivery_uuid() {
        let out = "No errors uploading 'App.ipa'\nDelivery UUID: 0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d\n";
        assert_eq!(
            parse_delivery_uuid(out).as_deref(),
            Some("0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d")
        );
        assert_eq!(parse_delivery_uuid("nothing here"), None);
    }

    #[tokio::test]
    async fn uploads_with_altool_and_reports_delivery_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("App.ipa"), b"ipa").unwrap();
        let runner = Arc::new(FakeRunner::new(|_| CommandOutput {
            code: Some(0),
            stdout: vec!["Delivery UUID: 0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d".into()],
            stderr: Vec::new(),
        }));
        let strategy = TestFlightUpload::new(
            config(Some("App.ipa")),
            dir.path(),
            runner.clone(),
            locator_with_xcrun(dir.path()),
        )
        .on_macos(true);

        let delivery = strategy.upload(None, &CancellationToken::new()).await.unwrap();

        assert_eq!(delivery.build_id.as_deref(), Some("0a1b2c3d-4e5f-6a7b-8c9d-0e1f2a3b4c5d"));
        let call = &runner.calls()[0];
        assert_eq!(call.program_name(), "xcrun");
        assert!(call.args.contains(&"--upload-app".to_string()));
    }

    #[tokio::test]
    async fn altool_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("App.ipa"), b"ipa").unwrap();
        let runner = Arc::new(FakeRunner::new(|_| failed_output(1)));
        let strategy =
            TestFlightUpload::new(config(Some("App.ipa")), dir.path(), runner, locator_with_xcrun(dir.path()))
                .on_macos(true);

        let err = strategy.upload(None, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::CommandExit { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn missing_xcode_is_reported_as_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("App.ipa"), b"ipa").unwrap();
        let runner = Arc::new(FakeRunner::succeeding());
        let locator = ToolLocator::new(dir.path(), Arc::new(RunCache::new())).without_path_search();
        let strategy =
            TestFlightUpload::new(config(Some("App.ipa")), dir.path(), runner.clone(), locator).on_macos(true);

        let err = strategy.upload(None, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::ToolNotFound { .. }), "{err}");
        assert!(runner.calls().is_empty());
    }
}
