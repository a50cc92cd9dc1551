//! Multi-destination deployment.
//!
//! Every enabled destination gets its own attempt and its own
//! [`DeployResult`]. Attempts run concurrently up to a worker limit and no
//! destination's failure (or panic) prevents another's attempt.

mod auth;
mod firebase;
mod local;
mod play;
mod registry;
mod result;
mod testflight;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use auth::{AccessToken, Authenticator, CachedAuthenticator, EnvTokenAuthenticator, FIREBASE_SCOPE, PLAY_SCOPE};
pub use firebase::FirebaseDistribution;
pub use local::LocalCopy;
pub use play::{EditTransaction, HttpPlayApi, PlayApi, PlayPublisher, TrackRelease};
pub use registry::DestinationRegistry;
pub use result::{Delivery, DeployResult, all_succeeded};
pub use testflight::TestFlightUpload;

use super::artifact::{ArtifactInfo, DestinationRequirement};
use super::destination::DestinationKind;
use super::error::{Error, Result};
use super::validate::ValidationResult;

/// One destination's upload procedure.
#[async_trait]
pub trait DeployStrategy: Send + Sync {
    /// Destination this strategy serves.
    fn kind(&self) -> DestinationKind;

    /// Checks required configuration. Must not touch the network.
    fn validate(&self) -> Result<()>;

    /// Uploads `artifact`.
    ///
    /// `artifact` is `None` for destinations that bring their own pre-built
    /// archive.
    async fn upload(&self, artifact: Option<&ArtifactInfo>, cancel: &CancellationToken) -> Result<Delivery>;
}

enum Slot {
    Done(DeployResult),
    Running(DestinationKind, JoinHandle<DeployResult>),
}

/// Fans uploads out over the registered destinations.
pub struct DeployOrchestrator {
    registry: Arc<DestinationRegistry>,
    workers: usize,
    cancel: CancellationToken,
}

impl DeployOrchestrator {
    /// Creates an orchestrator running at most `workers` uploads at once.
    pub fn new(registry: Arc<DestinationRegistry>, workers: usize, cancel: CancellationToken) -> Self {
        Self {
            registry,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Deploys to every registered destination.
    ///
    /// Destinations excluded by `validation`, or whose artifact is missing,
    /// get a skipped result without any upload attempt. Results are returned
    /// in registry order.
    pub async fn deploy(
        &self,
        artifacts: &[ArtifactInfo],
        requirements: &[DestinationRequirement],
        validation: &ValidationResult,
    ) -> Vec<DeployResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut slots = Vec::with_capacity(self.registry.len());

        for strategy in self.registry.iter() {
            let kind = strategy.kind();

            let artifact = if kind.uses_built_artifact() {
                match Self::artifact_for(kind, artifacts, requirements, validation) {
                    Ok(artifact) => Some(artifact),
                    Err(reason) => {
                        log::warn!("Skipping {}: {}", kind, reason);
                        slots.push(Slot::Done(DeployResult::skipped(kind, reason)));
                        continue;
                    }
                }
            } else {
                None
            };

            let strategy = Arc::clone(strategy);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                attempt(strategy, artifact, cancel).await
            });
            slots.push(Slot::Running(kind, handle));
        }

        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            let result = match slot {
                Slot::Done(result) => result,
                Slot::Running(kind, handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Deployment task for {} panicked: {}", kind, e);
                        DeployResult::failed(kind, format!("deployment task failed: {e}"), Default::default())
                    }
                },
            };
            results.push(result);
        }
        results
    }

    fn artifact_for(
        kind: DestinationKind,
        artifacts: &[ArtifactInfo],
        requirements: &[DestinationRequirement],
        validation: &ValidationResult,
    ) -> std::result::Result<ArtifactInfo, String> {
        let name = kind.name();
        if !validation.allows(name) {
            let prefix = format!("{name} ");
            return Err(validation
                .errors
                .iter()
                .find(|e| e.starts_with(&prefix))
                .cloned()
                .unwrap_or_else(|| format!("{name} excluded by validation")));
        }

        requirements
            .iter()
            .find(|r| r.destination_name == name)
            .and_then(|r| artifacts.iter().find(|a| a.kind == r.kind))
            .cloned()
            .ok_or_else(|| format!("no artifact available for {name}"))
    }
}

async fn attempt(
    strategy: Arc<dyn DeployStrategy>,
    artifact: Option<ArtifactInfo>,
    cancel: CancellationToken,
) -> DeployResult {
    let kind = strategy.kind();
    let started = Instant::now();

    if cancel.is_cancelled() {
        return DeployResult::from_error(kind, &Error::Cancelled, started.elapsed());
    }
    if let Err(e) = strategy.validate() {
        log::error!("{} configuration invalid: {}", kind, e);
        return DeployResult::from_error(kind, &e, started.elapsed());
    }

    log::info!("Deploying to {}...", kind);
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        outcome = strategy.upload(artifact.as_ref(), &cancel) => outcome,
    };

    match outcome {
        Ok(delivery) => {
            log::info!("✓ {}: {}", kind, delivery.message);
            DeployResult::succeeded(kind, delivery, started.elapsed())
        }
        Err(e) => {
            log::error!("{} failed: {}", kind, e);
            DeployResult::from_error(kind, &e, started.elapsed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::artifact::ArtifactKind;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        InvalidConfig,
    }

    struct Scripted {
        kind: DestinationKind,
        behavior: Behavior,
        uploads: Arc<AtomicUsize>,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(kind: DestinationKind, behavior: Behavior) -> Self {
            Self {
                kind,
                behavior,
                uploads: Arc::default(),
                running: Arc::default(),
                peak: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl DeployStrategy for Scripted {
        fn kind(&self) -> DestinationKind {
            self.kind
        }

        fn validate(&self) -> Result<()> {
            match self.behavior {
                Behavior::InvalidConfig => Err(Error::MissingConfig {
                    destination: self.kind.to_string(),
                    field: "app_id".into(),
                }),
                _ => Ok(()),
            }
        }

        async fn upload(&self, _artifact: Option<&ArtifactInfo>, _cancel: &CancellationToken) -> Result<Delivery> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(Delivery::new("uploaded").build_id("42")),
                Behavior::Fail => Err(Error::Http {
                    step: "upload".into(),
                    message: "HTTP 503".into(),
                }),
                Behavior::Panic => panic!("strategy blew up"),
                Behavior::InvalidConfig => unreachable!(),
            }
        }
    }

    fn artifact() -> ArtifactInfo {
        ArtifactInfo {
            kind: ArtifactKind::PackageArchive,
            path: PathBuf::from("/out/app.apk"),
            is_signed: false,
            size_bytes: 3,
        }
    }

    fn lab_requirements(names: &[&str]) -> Vec<DestinationRequirement> {
        names
            .iter()
            .map(|n| DestinationRequirement::new(ArtifactKind::PackageArchive, false, *n))
            .collect()
    }

    fn allowing(names: &[&str]) -> ValidationResult {
        ValidationResult {
            is_valid: true,
            can_deploy: true,
            allowed_destinations: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn orchestrator(strategies: Vec<Scripted>, workers: usize) -> DeployOrchestrator {
        let mut registry = DestinationRegistry::new();
        for s in strategies {
            registry.register(Arc::new(s)).unwrap();
        }
        DeployOrchestrator::new(Arc::new(registry), workers, CancellationToken::new())
    }

    #[tokio::test]
    async fn failing_destination_does_not_affect_others() {
        let deployer = orchestrator(
            vec![
                Scripted::new(DestinationKind::Firebase, Behavior::Fail),
                Scripted::new(DestinationKind::Local, Behavior::Succeed),
            ],
            2,
        );

        let results = deployer
            .deploy(&[artifact()], &lab_requirements(&["firebase", "local"]), &allowing(&["firebase", "local"]))
            .await;

        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert_eq!(results[0].destination, "firebase");
        assert!(results[0].error.as_deref().unwrap().contains("HTTP 503"));
        assert!(results[1].success);
        assert_eq!(results[1].build_id.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn panicking_strategy_fails_only_its_destination() {
        let deployer = orchestrator(
            vec![
                Scripted::new(DestinationKind::Firebase, Behavior::Panic),
                Scripted::new(DestinationKind::Local, Behavior::Succeed),
            ],
            2,
        );

        let results = deployer
            .deploy(&[artifact()], &lab_requirements(&["firebase", "local"]), &allowing(&["firebase", "local"]))
            .await;

        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("deployment task failed"));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn invalid_config_fails_without_upload() {
        let strategy = Scripted::new(DestinationKind::Firebase, Behavior::InvalidConfig);
        let uploads = strategy.uploads.clone();
        let deployer = orchestrator(vec![strategy], 1);

        let results = deployer
            .deploy(&[artifact()], &lab_requirements(&["firebase"]), &allowing(&["firebase"]))
            .await;

        assert!(!results[0].success);
        assert_eq!(uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn excluded_destination_is_skipped_with_validation_error() {
        let strategy = Scripted::new(DestinationKind::Play, Behavior::Succeed);
        let uploads = strategy.uploads.clone();
        let deployer = orchestrator(vec![strategy], 1);
        let validation = ValidationResult {
            errors: vec!["play requires signed AppBundle".into()],
            ..Default::default()
        };

        let results = deployer
            .deploy(
                &[artifact()],
                &[DestinationRequirement::new(ArtifactKind::AppBundle, true, "play")],
                &validation,
            )
            .await;

        assert_eq!(results[0].error.as_deref(), Some("play requires signed AppBundle"));
        assert_eq!(uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let strategies: Vec<Scripted> = [
            DestinationKind::Firebase,
            DestinationKind::Play,
            DestinationKind::TestFlight,
            DestinationKind::Local,
        ]
        .into_iter()
        .map(|k| Scripted::new(k, Behavior::Succeed))
        .collect();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let strategies: Vec<Scripted> = strategies
            .into_iter()
            .map(|mut s| {
                s.running = running.clone();
                s.peak = peak.clone();
                s
            })
            .collect();
        let deployer = orchestrator(strategies, 2);

        let names = ["firebase", "play", "local"];
        let results = deployer
            .deploy(&[artifact()], &lab_requirements(&names), &allowing(&names))
            .await;

        assert_eq!(results.len(), 4);
        assert!(all_succeeded(&results));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn cancelled_run_attempts_nothing() {
        let strategy = Scripted::new(DestinationKind::Local, Behavior::Succeed);
        let uploads = strategy.uploads.clone();
        let mut registry = DestinationRegistry::new();
        registry.register(Arc::new(strategy)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deployer = DeployOrchestrator::new(Arc::new(registry), 1, cancel);

        let results = deployer
            .deploy(&[artifact()], &lab_requirements(&["local"]), &allowing(&["local"]))
            .await;

        assert_eq!(results[0].error.as_deref(), Some("operation cancelled"));
        assert_eq!(uploads.load(Ordering::SeqCst), 0);
    }
}
