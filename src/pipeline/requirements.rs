//! Turns destination configuration into artifact requirements.
//!
//! Precedence is fixed and not user-configurable:
//!
//! - store-grade destinations always need a signed [`ArtifactKind::AppBundle`]
//! - lab-grade destinations take the kind from their own config (default
//!   [`ArtifactKind::PackageArchive`]) and accept unsigned artifacts
//! - local copies behave like lab-grade destinations

use std::collections::BTreeSet;

use super::artifact::{ArtifactKind, DestinationRequirement};
use super::destination::{DestinationKind, Grade, enabled_destinations};
use crate::config::DestinationsConfig;

/// Resolves what must be built before any deployment can proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactRequirementResolver;

impl ArtifactRequirementResolver {
    /// Creates a resolver.
    pub fn new() -> Self {
        Self
    }

    /// One requirement per enabled destination that consumes a built artifact.
    ///
    /// Returns an empty list when nothing is enabled; callers treat that as a
    /// configuration error.
    pub fn resolve(&self, config: &DestinationsConfig) -> Vec<DestinationRequirement> {
        enabled_destinations(config)
            .into_iter()
            .filter(|d| d.uses_built_artifact())
            .map(|d| self.requirement_for(d, config))
            .collect()
    }

    fn requirement_for(
        &self,
        destination: DestinationKind,
        config: &DestinationsConfig,
    ) -> DestinationRequirement {
        match destination.grade() {
            Grade::Store => DestinationRequirement::new(ArtifactKind::AppBundle, true, destination.name()),
            Grade::Lab | Grade::LocalCopy => {
                let preferred = match destination {
                    DestinationKind::Firebase => config.firebase.as_ref().and_then(|c| c.artifact),
                    DestinationKind::Local => config.local.as_ref().and_then(|c| c.artifact),
                    _ => None,
                };
                DestinationRequirement::new(
                    preferred.unwrap_or(ArtifactKind::PackageArchive),
                    false,
                    destination.name(),
                )
            }
        }
    }

    /// Distinct kinds to build: a set union over the requirements.
    pub fn artifact_types_to_build(requirements: &[DestinationRequirement]) -> BTreeSet<ArtifactKind> {
        requirements.iter().map(|r| r.kind).collect()
    }
}
