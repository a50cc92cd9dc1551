//! End-to-end release runs.
//!
//! resolve → dedupe → build → sign → validate → confirm → deploy

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::artifact::{ArtifactInfo, ArtifactKind, ArtifactMetadata, DestinationRequirement};
use super::builder::{BuildExecutor, BuildFailure, BuildVariant};
use super::cache::{CacheManager, SourceHasher};
use super::deploy::{
    Authenticator, CachedAuthenticator, DeployOrchestrator, DeployResult, DestinationRegistry,
    EnvTokenAuthenticator, all_succeeded,
};
use super::destination::{DestinationKind, enabled_destinations};
use super::error::{Error, Result};
use super::process::{CommandRunner, TokioCommandRunner};
use super::requirements::ArtifactRequirementResolver;
use super::run_cache::RunCache;
use super::signing::SigningOrchestrator;
use super::tools::ToolLocator;
use super::validate::{ArtifactValidator, ValidationResult};
use crate::config::PipelineConfig;

/// Shared sink for toolchain output lines.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Asks a human whether to deploy despite validation findings.
pub trait ConfirmationGate: Send + Sync {
    /// Returns `true` to proceed.
    fn confirm(&self, validation: &ValidationResult) -> bool;
}

/// Gate that always proceeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl ConfirmationGate for AssumeYes {
    fn confirm(&self, _validation: &ValidationResult) -> bool {
        true
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    /// One requirement per enabled destination that consumes a built artifact
    pub requirements: Vec<DestinationRequirement>,
    /// Artifacts after signing
    pub artifacts: Vec<ArtifactInfo>,
    /// Kinds reused from cache
    pub cached: Vec<ArtifactKind>,
    /// Package identity read from built archives
    pub metadata: Vec<ArtifactMetadata>,
    /// Kinds that failed to build
    pub build_failures: Vec<BuildFailure>,
    /// Non-fatal signing problems
    pub signing_warnings: Vec<String>,
    /// Validation outcome
    pub validation: ValidationResult,
    /// One result per enabled destination
    pub deployments: Vec<DeployResult>,
}

impl PipelineReport {
    /// Whether every destination was deployed successfully.
    pub fn all_succeeded(&self) -> bool {
        all_succeeded(&self.deployments)
    }
}

/// Builds the cache manager for a configuration.
pub fn cache_manager(config: &PipelineConfig) -> CacheManager {
    let hasher = match &config.project.tracked_paths {
        Some(paths) => SourceHasher::with_paths(&config.project.module, paths.iter().cloned()),
        None => SourceHasher::for_module(&config.project.module),
    };
    CacheManager::new(&config.project.root, hasher)
}

/// Configures a [`ReleasePipeline`].
pub struct PipelineBuilder {
    config: PipelineConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    gate: Option<Box<dyn ConfirmationGate>>,
    registry: Option<DestinationRegistry>,
    cancel: CancellationToken,
    env: Option<Vec<(String, String)>>,
    default_sdk_dirs: Option<Vec<PathBuf>>,
    path_search: bool,
    output: Option<OutputSink>,
}

impl PipelineBuilder {
    /// Starts from a loaded configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            runner: None,
            gate: None,
            registry: None,
            cancel: CancellationToken::new(),
            env: None,
            default_sdk_dirs: None,
            path_search: true,
            output: None,
        }
    }

    /// Runs external commands through `runner`.
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Asks `gate` before deploying past warnings or partial failures.
    pub fn confirmation(mut self, gate: Box<dyn ConfirmationGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Deploys through `registry` instead of one built from the configuration.
    pub fn registry(mut self, registry: DestinationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Cancels subprocesses and uploads when `token` fires.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Replaces the environment snapshot used for tool and credential lookup.
    pub fn env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Replaces the OS default SDK directories.
    pub fn default_sdk_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.default_sdk_dirs = Some(dirs);
        self
    }

    /// Disables `PATH` lookups for tools.
    pub fn without_path_search(mut self) -> Self {
        self.path_search = false;
        self
    }

    /// Receives toolchain output lines.
    pub fn output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    /// Finishes configuration.
    pub fn build(self) -> ReleasePipeline {
        let runner: Arc<dyn CommandRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(TokioCommandRunner::new(self.cancel.clone())),
        };
        let auth: Arc<dyn Authenticator> = Arc::new(CachedAuthenticator::new(
            EnvTokenAuthenticator::from_env(self.config.auth.token_env.clone()),
        ));
        let gate: Box<dyn ConfirmationGate> = match self.gate {
            Some(gate) => gate,
            None => Box::new(AssumeYes),
        };
        let output: OutputSink = match self.output {
            Some(sink) => sink,
            None => Arc::new(|line: &str| log::debug!("{}", line)),
        };

        ReleasePipeline {
            config: self.config,
            runner,
            auth,
            gate,
            registry: self.registry,
            cancel: self.cancel,
            env: self.env,
            default_sdk_dirs: self.default_sdk_dirs,
            path_search: self.path_search,
            output,
        }
    }
}

/// One configured release run.
pub struct ReleasePipeline {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    auth: Arc<dyn Authenticator>,
    gate: Box<dyn ConfirmationGate>,
    registry: Option<DestinationRegistry>,
    cancel: CancellationToken,
    env: Option<Vec<(String, String)>>,
    default_sdk_dirs: Option<Vec<PathBuf>>,
    path_search: bool,
    output: OutputSink,
}

impl ReleasePipeline {
    /// Starts a builder.
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    /// Tool locator for this run's project.
    pub fn tool_locator(&self, run_cache: Arc<RunCache>) -> ToolLocator {
        let mut locator = ToolLocator::new(&self.config.project.root, run_cache);
        if let Some(env) = &self.env {
            locator = locator.with_env(env.clone());
        }
        if let Some(dirs) = &self.default_sdk_dirs {
            locator = locator.with_default_sdk_dirs(dirs.clone());
        }
        if !self.path_search {
            locator = locator.without_path_search();
        }
        locator
    }

    /// Runs the pipeline.
    ///
    /// Returns an error only for configuration problems, a declined
    /// confirmation, or cancellation. Build, signing and deployment failures
    /// are reported in the [`PipelineReport`].
    pub async fn run(self) -> Result<PipelineReport> {
        let enabled = enabled_destinations(&self.config.destinations);
        if enabled.is_empty() {
            return Err(Error::NoDestinationsEnabled);
        }
        log::info!(
            "Releasing to: {}",
            enabled.iter().map(|d| d.name()).collect::<Vec<_>>().join(", ")
        );

        let requirements = ArtifactRequirementResolver::new().resolve(&self.config.destinations);
        let kinds = ArtifactRequirementResolver::artifact_types_to_build(&requirements);
        let mut report = PipelineReport {
            requirements: requirements.clone(),
            ..Default::default()
        };

        let run_cache = Arc::new(RunCache::new());
        let locator = self.tool_locator(run_cache.clone());
        let root = self.config.project.root.clone();
        let sink = self.output.as_ref();

        if !kinds.is_empty() {
            let project = &self.config.project;
            let executor = BuildExecutor::new(
                &root,
                BuildVariant::new(&project.module, project.flavor.clone(), &project.build_type),
                self.runner.clone(),
                locator.clone(),
                cache_manager(&self.config),
                run_cache.clone(),
            );

            let outcome = executor.build_all(&kinds, sink).await;
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            for artifact in &outcome.artifacts {
                if let Some(metadata) = executor.inspect(artifact).await {
                    log::info!(
                        "{} is {} {}",
                        artifact.file_name(),
                        metadata.package_id,
                        metadata.version_name.as_deref().unwrap_or("")
                    );
                    report.metadata.push(metadata);
                }
            }
            report.cached = outcome.cached;
            report.build_failures = outcome.failures;

            let mut signer = SigningOrchestrator::new(
                &root,
                self.config.signing.clone(),
                self.runner.clone(),
                locator.clone(),
            );
            if let Some(env) = &self.env {
                signer = signer.with_env(env.clone());
            }
            let signed = signer.sign_all(outcome.artifacts, &requirements, sink).await;
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            report.artifacts = signed.artifacts;
            report.signing_warnings = signed.warnings;
        }

        report.validation = ArtifactValidator::new().validate(&requirements, &report.artifacts);

        let prebuilt: Vec<DestinationKind> = enabled
            .iter()
            .copied()
            .filter(|d| !d.uses_built_artifact())
            .collect();
        if !report.validation.can_deploy && prebuilt.is_empty() {
            log::error!("No destination can be deployed to");
            report.deployments = enabled
                .iter()
                .map(|&d| DeployResult::skipped(d, skip_reason(d, &report.validation)))
                .collect();
            return Ok(report);
        }

        if report.validation.needs_user_confirmation()
            && !self.config.deploy.assume_yes
            && !self.gate.confirm(&report.validation)
        {
            return Err(Error::NotConfirmed);
        }

        let registry = match self.registry {
            Some(registry) => registry,
            None => DestinationRegistry::from_config(
                &self.config.destinations,
                &root,
                self.runner.clone(),
                self.auth.clone(),
                locator,
            )?,
        };
        let deployer = DeployOrchestrator::new(Arc::new(registry), self.config.deploy.workers(), self.cancel);
        report.deployments = deployer
            .deploy(&report.artifacts, &requirements, &report.validation)
            .await;

        let succeeded = report.deployments.iter().filter(|r| r.success).count();
        log::info!("✓ {}/{} destinations succeeded", succeeded, report.deployments.len());
        Ok(report)
    }
}

fn skip_reason(destination: DestinationKind, validation: &ValidationResult) -> String {
    let prefix = format!("{} ", destination.name());
    validation
        .errors
        .iter()
        .find(|e| e.starts_with(&prefix))
        .cloned()
        .unwrap_or_else(|| "no destination can be deployed".to_string())
}
