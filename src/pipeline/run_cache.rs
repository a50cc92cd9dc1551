//! Per-run memoization shared by pipeline collaborators.
//!
//! One [`RunCache`] is created per pipeline run and handed to the tool
//! locator and the build executor by reference. Nothing here outlives the run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use super::cache::CacheKey;
use super::tools::Tool;

/// Memoized lookups for a single pipeline run.
#[derive(Debug, Default)]
pub struct RunCache {
    sdk_root: OnceLock<Option<PathBuf>>,
    tools: Mutex<HashMap<Tool, PathBuf>>,
    artifacts: Mutex<HashMap<CacheKey, PathBuf>>,
}

impl RunCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the SDK root, resolving it with `init` on first use.
    pub fn sdk_root(&self, init: impl FnOnce() -> Option<PathBuf>) -> Option<PathBuf> {
        self.sdk_root.get_or_init(init).clone()
    }

    /// Previously located tool path.
    pub fn tool(&self, tool: Tool) -> Option<PathBuf> {
        self.tools.lock().ok()?.get(&tool).cloned()
    }

    /// Remembers a located tool.
    pub fn remember_tool(&self, tool: Tool, path: PathBuf) {
        if let Ok(mut tools) = self.tools.lock() {
            tools.insert(tool, path);
        }
    }

    /// Previously located artifact for a build variant.
    pub fn artifact(&self, key: &CacheKey) -> Option<PathBuf> {
        self.artifacts.lock().ok()?.get(key).cloned()
    }

    /// Remembers where a build variant's artifact was found.
    pub fn remember_artifact(&self, key: CacheKey, path: PathBuf) {
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.insert(key, path);
        }
    }
}
