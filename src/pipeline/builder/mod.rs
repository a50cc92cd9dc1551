//! Artifact builds.
//!
//! Each required kind is built at most once per run. The persisted cache lets
//! a second run with unchanged sources skip the toolchain entirely.

mod discovery;
mod executor;

pub use discovery::{UNSIGNED_MARKER, find_newest_artifact, looks_signed};
pub use executor::{BuildExecutor, BuildFailure, BuildOutcome, BuildVariant};
