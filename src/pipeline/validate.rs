//! Cross-destination artifact validation.

use serde::Serialize;

use super::artifact::{ArtifactInfo, DestinationRequirement};

/// Outcome of matching artifacts against requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// No errors at all
    pub is_valid: bool,
    /// At least one destination can be deployed to
    pub can_deploy: bool,
    /// Soft problems; deployment proceeds after confirmation
    pub warnings: Vec<String>,
    /// Hard problems; the affected destination is excluded
    pub errors: Vec<String>,
    /// Destinations that may be deployed to, in requirement order
    pub allowed_destinations: Vec<String>,
}

impl ValidationResult {
    /// Whether a human must confirm before deploying.
    ///
    /// True on partial capability (errors while some destination is still
    /// reachable) and on any warning.
    pub fn needs_user_confirmation(&self) -> bool {
        (!self.errors.is_empty() && self.can_deploy) || !self.warnings.is_empty()
    }

    /// Whether `destination` survived validation.
    pub fn allows(&self, destination: &str) -> bool {
        self.allowed_destinations.iter().any(|d| d == destination)
    }
}

/// Matches built artifacts to destination requirements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactValidator;

impl ArtifactValidator {
    /// Creates a validator.
    pub fn new() -> Self {
        Self
    }

    /// Checks each requirement against the artifact of its kind.
    pub fn validate(
        &self,
        requirements: &[DestinationRequirement],
        artifacts: &[ArtifactInfo],
    ) -> ValidationResult {
        let mut result = ValidationResult::default();

        for req in requirements {
            let name = &req.destination_name;
            match artifacts.iter().find(|a| a.kind == req.kind) {
                None => result
                    .errors
                    .push(format!("{} requires {} but it wasn't built", name, req.kind)),
                Some(artifact) if req.must_be_signed && !artifact.is_signed => result
                    .errors
                    .push(format!("{} requires signed {}", name, req.kind)),
                Some(artifact) => {
                    if !artifact.is_signed {
                        result
                            .warnings
                            .push(format!("{} will receive unsigned {}", name, req.kind));
                    }
                    if !result.allows(name) {
                        result.allowed_destinations.push(name.clone());
                    }
                }
            }
        }

        result.is_valid = result.errors.is_empty();
        result.can_deploy = !result.allowed_destinations.is_empty();

        for error in &result.errors {
            log::warn!("Validation: {}", error);
        }
        result
    }
}
