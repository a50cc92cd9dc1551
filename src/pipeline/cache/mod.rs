//! Build cache validation.
//!
//! A digest over the tracked sources is persisted after each successful build
//! and compared on the next run. Digests are keyed per (flavor, build type,
//! artifact kind), so switching variants never reuses the wrong output.

mod hasher;
mod manager;

pub use hasher::{DEFAULT_TRACKED_PATHS, SourceHasher};
pub use manager::{CacheKey, CacheManager, CacheValidation, STATE_DIR};
