//! Release pipeline engine.
//!
//! A run resolves what each enabled destination needs, builds each required
//! artifact kind once, signs what must be signed, validates the result against
//! every destination and deploys concurrently with per-destination isolation.
//!
//! ```no_run
//! # async fn example() -> mobile_release::pipeline::Result<()> {
//! use mobile_release::config::parse_config;
//! use mobile_release::pipeline::ReleasePipeline;
//!
//! let config = parse_config("[destinations.local]\noutput_dir = \"dist\"\n")
//!     .map_err(|e| mobile_release::pipeline::Error::GenericError(e.to_string()))?;
//! let report = ReleasePipeline::builder(config).build().run().await?;
//! println!("all succeeded: {}", report.all_succeeded());
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod builder;
pub mod cache;
pub mod deploy;
pub mod destination;
pub mod error;
pub mod process;
pub mod requirements;
pub mod run;
pub mod run_cache;
pub mod signing;
pub mod tools;
pub mod validate;

pub use artifact::{ArtifactInfo, ArtifactKind, ArtifactMetadata, DestinationRequirement, Platform};
pub use deploy::{DeployResult, DestinationRegistry};
pub use destination::{DestinationKind, Grade, enabled_destinations};
pub use error::{Error, ErrorExt, Result};
pub use requirements::ArtifactRequirementResolver;
pub use run::{AssumeYes, ConfirmationGate, OutputSink, PipelineBuilder, PipelineReport, ReleasePipeline, cache_manager};
pub use validate::{ArtifactValidator, ValidationResult};
