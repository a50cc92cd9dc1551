//! Build execution and cache consultation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::discovery::{find_newest_artifact, looks_signed};
use crate::pipeline::artifact::{ArtifactInfo, ArtifactKind, ArtifactMetadata, parse_badging};
use crate::pipeline::cache::{CacheKey, CacheManager};
use crate::pipeline::error::{Error, Result};
use crate::pipeline::process::{CommandRunner, CommandSpec, LineSink, discard_output};
use crate::pipeline::run_cache::RunCache;
use crate::pipeline::tools::{Tool, ToolLocator};

/// The build variant being released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVariant {
    /// Application module directory
    pub module: String,
    /// Product flavor
    pub flavor: Option<String>,
    /// Build type
    pub build_type: String,
}

impl BuildVariant {
    /// Creates a variant.
    pub fn new(module: impl Into<String>, flavor: Option<String>, build_type: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            flavor: flavor.filter(|f| !f.is_empty()),
            build_type: build_type.into(),
        }
    }

    /// `<flavor><BuildType>` in Gradle's camel case, e.g. `prodRelease`.
    pub fn variant_name(&self) -> String {
        match &self.flavor {
            Some(flavor) => format!("{}{}", flavor, capitalize(&self.build_type)),
            None => self.build_type.clone(),
        }
    }

    /// Gradle task producing `kind`, e.g. `:app:bundleProdRelease`.
    pub fn task(&self, kind: ArtifactKind) -> String {
        let verb = match kind {
            ArtifactKind::PackageArchive => "assemble",
            ArtifactKind::AppBundle => "bundle",
        };
        format!(":{}:{}{}", self.module, verb, capitalize(&self.variant_name()))
    }

    /// Directory the toolchain writes `kind` into.
    pub fn output_dir(&self, root: &Path, kind: ArtifactKind) -> PathBuf {
        let outputs = root.join(&self.module).join("build").join("outputs");
        match kind {
            ArtifactKind::PackageArchive => {
                let mut dir = outputs.join("apk");
                if let Some(flavor) = &self.flavor {
                    dir = dir.join(flavor);
                }
                dir.join(&self.build_type)
            }
            ArtifactKind::AppBundle => outputs.join("bundle").join(self.variant_name()),
        }
    }

    /// Cache slot for `kind` of this variant.
    pub fn cache_key(&self, kind: ArtifactKind) -> CacheKey {
        CacheKey::new(self.flavor.as_deref(), &self.build_type, kind)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A kind that could not be produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildFailure {
    /// Kind that failed
    pub kind: ArtifactKind,
    /// Why it failed
    pub message: String,
}

/// Results of building every required kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildOutcome {
    /// Artifacts available for signing
    pub artifacts: Vec<ArtifactInfo>,
    /// Kinds that failed to build
    pub failures: Vec<BuildFailure>,
    /// Kinds satisfied from cache without invoking the toolchain
    pub cached: Vec<ArtifactKind>,
}

/// Runs the external build toolchain once per required kind.
pub struct BuildExecutor {
    root: PathBuf,
    variant: BuildVariant,
    runner: Arc<dyn CommandRunner>,
    locator: ToolLocator,
    cache: CacheManager,
    run_cache: Arc<RunCache>,
}

impl std::fmt::Debug for BuildExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildExecutor")
            .field("root", &self.root)
            .field("variant", &self.variant)
            .finish()
    }
}

impl BuildExecutor {
    /// Creates an executor for the project at `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        variant: BuildVariant,
        runner: Arc<dyn CommandRunner>,
        locator: ToolLocator,
        cache: CacheManager,
        run_cache: Arc<RunCache>,
    ) -> Self {
        Self {
            root: root.into(),
            variant,
            runner,
            locator,
            cache,
            run_cache,
        }
    }

    /// Builds every kind in `kinds`.
    ///
    /// Kinds are built one after another because they share one toolchain
    /// daemon. A failure is recorded for its kind and the remaining kinds still
    /// build.
    pub async fn build_all(&self, kinds: &BTreeSet<ArtifactKind>, sink: LineSink<'_>) -> BuildOutcome {
        let mut outcome = BuildOutcome::default();

        for &kind in kinds {
            match self.build_kind(kind, sink).await {
                Ok((artifact, from_cache)) => {
                    if from_cache {
                        outcome.cached.push(kind);
                    }
                    outcome.artifacts.push(artifact);
                }
                Err(e) => {
                    log::error!("Build of {} failed: {}", kind, e);
                    outcome.failures.push(BuildFailure {
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    /// Builds one kind, reusing the previous output when the cache is valid.
    ///
    /// # Returns
    ///
    /// The artifact and whether it came from cache.
    pub async fn build_kind(&self, kind: ArtifactKind, sink: LineSink<'_>) -> Result<(ArtifactInfo, bool)> {
        let key = self.variant.cache_key(kind);
        let output_dir = self.variant.output_dir(&self.root, kind);
        let validation = self.cache.validate_cache(&key).await?;

        if !validation.needs_rebuild {
            if let Some(path) = self.cached_artifact(&key, &output_dir, kind).await? {
                log::info!("✓ {} up to date ({}), reusing {}", kind, validation.reason, path.display());
                let artifact = ArtifactInfo::from_file(kind, &path, looks_signed(kind, &path)).await?;
                return Ok((artifact, true));
            }
            log::info!("Cache valid but no {} on disk, rebuilding", kind);
        } else {
            log::info!("Building {}: {}", kind, validation.reason);
        }

        let gradle = self.locator.find(Tool::Gradle)?;
        let spec = CommandSpec::new(gradle)
            .arg(self.variant.task(kind))
            .arg("--console=plain")
            .current_dir(&self.root);

        self.runner.run(&spec, sink).await?.check(&spec)?;

        let path = find_newest_artifact(&output_dir, kind)
            .await?
            .ok_or_else(|| Error::ArtifactNotFound {
                kind,
                searched: output_dir.clone(),
            })?;

        self.cache.update_cache(&key).await?;
        self.run_cache.remember_artifact(key, path.clone());

        log::info!("✓ Built {}: {}", kind, path.display());
        let artifact = ArtifactInfo::from_file(kind, &path, looks_signed(kind, &path)).await?;
        Ok((artifact, false))
    }

    async fn cached_artifact(
        &self,
        key: &CacheKey,
        output_dir: &Path,
        kind: ArtifactKind,
    ) -> Result<Option<PathBuf>> {
        if let Some(path) = self.run_cache.artifact(key).filter(|p| p.is_file()) {
            return Ok(Some(path));
        }
        let found = find_newest_artifact(output_dir, kind).await?;
        if let Some(path) = &found {
            self.run_cache.remember_artifact(key.clone(), path.clone());
        }
        Ok(found)
    }

    /// Extracts package id and version for display.
    ///
    /// Only package archives can be inspected; a missing `aapt2` yields `None`.
    pub async fn inspect(&self, artifact: &ArtifactInfo) -> Option<ArtifactMetadata> {
        if artifact.kind != ArtifactKind::PackageArchive {
            return None;
        }
        let aapt2 = self.locator.find(Tool::Aapt2).ok()?;
        let spec = CommandSpec::new(aapt2)
            .args(["dump", "badging"])
            .arg(artifact.path.to_string_lossy());
        let output = self.runner.run(&spec, &discard_output).await.ok()?;
        if !output.success() {
            return None;
        }
        parse_badging(&output.stdout.join("\n"))
    }
}
