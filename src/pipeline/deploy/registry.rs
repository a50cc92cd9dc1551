//! Destination strategies resolved at startup.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::auth::Authenticator;
use super::firebase::FirebaseDistribution;
use super::local::LocalCopy;
use super::play::{HttpPlayApi, PlayPublisher};
use super::testflight::TestFlightUpload;
use super::{Delivery, DeployStrategy};
use crate::config::DestinationsConfig;
use crate::pipeline::artifact::ArtifactInfo;
use crate::pipeline::destination::{DestinationKind, enabled_destinations};
use crate::pipeline::error::{Error, Result};
use crate::pipeline::process::CommandRunner;
use crate::pipeline::tools::ToolLocator;
use crate::utils::http;

/// One strategy per enabled destination, in stable order.
///
/// Built once before deployment and read-only afterwards.
#[derive(Default)]
pub struct DestinationRegistry {
    strategies: Vec<Arc<dyn DeployStrategy>>,
}

impl DestinationRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the strategies for every destination enabled in `config`.
    ///
    /// If the HTTP client cannot be built, remote destinations are still
    /// registered but fail at validation; the others are unaffected.
    pub fn from_config(
        config: &DestinationsConfig,
        root: &Path,
        runner: Arc<dyn CommandRunner>,
        auth: Arc<dyn Authenticator>,
        locator: ToolLocator,
    ) -> Result<Self> {
        let needs_http = enabled_destinations(config)
            .iter()
            .any(|k| matches!(k, DestinationKind::Firebase | DestinationKind::Play));
        let client = if needs_http {
            http::client().map_err(|e| {
                log::error!("{}", e);
                e.to_string()
            })
        } else {
            Err("not needed".to_string())
        };
        Self::with_client(config, root, runner, auth, locator, client)
    }

    fn with_client(
        config: &DestinationsConfig,
        root: &Path,
        runner: Arc<dyn CommandRunner>,
        auth: Arc<dyn Authenticator>,
        locator: ToolLocator,
        client: std::result::Result<reqwest::Client, String>,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for kind in enabled_destinations(config) {
            let strategy: Arc<dyn DeployStrategy> = match (kind, &client) {
                (DestinationKind::Firebase | DestinationKind::Play, Err(reason)) => {
                    Arc::new(Unavailable::new(kind, reason))
                }
                (DestinationKind::Firebase, Ok(client)) => match &config.firebase {
                    Some(c) => Arc::new(FirebaseDistribution::new(c.clone(), client.clone(), auth.clone())),
                    None => continue,
                },
                (DestinationKind::Play, Ok(client)) => match &config.play {
                    Some(c) => Arc::new(PlayPublisher::new(
                        c.clone(),
                        Arc::new(HttpPlayApi::new(client.clone(), auth.clone())),
                    )),
                    None => continue,
                },
                (DestinationKind::TestFlight, _) => match &config.testflight {
                    Some(c) => Arc::new(TestFlightUpload::new(c.clone(), root, runner.clone(), locator.clone())),
                    None => continue,
                },
                (DestinationKind::Local, _) => match &config.local {
                    Some(c) => Arc::new(LocalCopy::new(c.clone(), root)),
                    None => continue,
                },
            };
            registry.register(strategy)?;
        }

        Ok(registry)
    }

    /// Adds a strategy. Each destination may be registered once.
    pub fn register(&mut self, strategy: Arc<dyn DeployStrategy>) -> Result<()> {
        let kind = strategy.kind();
        if self.get(kind).is_some() {
            return Err(Error::GenericError(format!("destination {kind} registered twice")));
        }
        self.strategies.push(strategy);
        Ok(())
    }

    /// Strategy for `kind`.
    pub fn get(&self, kind: DestinationKind) -> Option<&Arc<dyn DeployStrategy>> {
        self.strategies.iter().find(|s| s.kind() == kind)
    }

    /// Registered destinations in order.
    pub fn kinds(&self) -> Vec<DestinationKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Iterates over strategies in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DeployStrategy>> {
        self.strategies.iter()
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether no destination is registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Stand-in for a remote destination whose HTTP client could not be built.
struct Unavailable {
    kind: DestinationKind,
    reason: String,
}

impl Unavailable {
    fn new(kind: DestinationKind, reason: &str) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }

    fn error(&self) -> Error {
        Error::GenericError(format!("{}: HTTP client unavailable: {}", self.kind, self.reason))
    }
}

#[async_trait]
impl DeployStrategy for Unavailable {
    fn kind(&self) -> DestinationKind {
        self.kind
    }

    fn validate(&self) -> Result<()> {
        Err(self.error())
    }

    async fn upload(&self, _artifact: Option<&ArtifactInfo>, _cancel: &CancellationToken) -> Result<Delivery> {
        Err(self.error())
    }
}
