//! Release pipeline engine for mobile apps.
//!
//! Builds each artifact kind the enabled destinations need exactly once,
//! signs what must be signed, validates the result against every destination
//! and deploys concurrently with per-destination failure isolation:
//! - Lab distribution (Firebase App Distribution)
//! - Store publishing through an edit transaction (Google Play)
//! - iOS store uploads of a pre-built archive (TestFlight)
//! - Local copies with checksums
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use error::{CliError, ReleaseError, Result};
pub use pipeline::{PipelineReport, ReleasePipeline};
