//! Persisted digest comparison.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::SourceHasher;
use crate::pipeline::artifact::ArtifactKind;
use crate::pipeline::error::{ErrorExt, Result};
use crate::utils::fs;

/// Project-local directory holding pipeline state.
pub const STATE_DIR: &str = ".mobile-release";

const CACHE_DIR: &str = "cache";

/// Identifies one cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Product flavor, if the project uses flavors
    pub flavor: Option<String>,
    /// Build type (`release`, `debug`, ...)
    pub build_type: String,
    /// Artifact kind
    pub kind: ArtifactKind,
}

impl CacheKey {
    /// Creates a key.
    pub fn new(flavor: Option<&str>, build_type: &str, kind: ArtifactKind) -> Self {
        Self {
            flavor: flavor.map(str::to_string),
            build_type: build_type.to_string(),
            kind,
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.sha256",
            self.flavor.as_deref().unwrap_or("default"),
            self.build_type,
            self.kind.slug()
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.flavor {
            Some(flavor) => write!(f, "{}/{}/{}", flavor, self.build_type, self.kind),
            None => write!(f, "{}/{}", self.build_type, self.kind),
        }
    }
}

/// Result of comparing the current sources against the persisted digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheValidation {
    /// Whether the toolchain must run
    pub needs_rebuild: bool,
    /// Human-readable explanation
    pub reason: String,
    /// Digest of the current sources
    pub current_hash: String,
    /// Persisted digest, if any
    pub cached_hash: Option<String>,
}

/// Reads and writes per-key source digests under `<root>/.mobile-release/cache`.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
    hasher: SourceHasher,
}

impl CacheManager {
    /// Creates a cache manager for the project at `root`.
    pub fn new(root: impl Into<PathBuf>, hasher: SourceHasher) -> Self {
        Self {
            root: root.into(),
            hasher,
        }
    }

    /// Directory holding digest files.
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(CACHE_DIR)
    }

    fn digest_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir().join(key.file_name())
    }

    /// Compares the current source digest with the persisted one for `key`.
    ///
    /// A missing digest file means "needs rebuild", never an error.
    pub async fn validate_cache(&self, key: &CacheKey) -> Result<CacheValidation> {
        let current_hash = self.hasher.digest(&self.root).await?;
        let cached_hash = self.read_digest(key).await?;

        let (needs_rebuild, reason) = match &cached_hash {
            None => (true, "No cache found".to_string()),
            Some(cached) if *cached == current_hash => (false, "Cache valid".to_string()),
            Some(_) => (true, "Source files changed".to_string()),
        };

        log::debug!("Cache {}: {}", key, reason);

        Ok(CacheValidation {
            needs_rebuild,
            reason,
            current_hash,
            cached_hash,
        })
    }

    /// Recomputes and persists the digest for `key`.
    ///
    /// Call only after a successful build; the write is atomic.
    pub async fn update_cache(&self, key: &CacheKey) -> Result<String> {
        let digest = self.hasher.digest(&self.root).await?;
        fs::write_atomic(&self.digest_path(key), digest.as_bytes()).await?;
        log::debug!("Cache {} updated", key);
        Ok(digest)
    }

    /// Removes every persisted digest.
    pub async fn clear(&self) -> Result<()> {
        fs::remove_dir_all(&self.cache_dir()).await
    }

    /// Lists persisted slots as `(file name, digest)` pairs.
    pub async fn entries(&self) -> Result<Vec<(String, String)>> {
        let dir = self.cache_dir();
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e).fs_context("reading cache directory", &dir),
        };
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .fs_context("reading cache directory", &dir)?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".sha256") {
                continue;
            }
            let digest = tokio::fs::read_to_string(entry.path())
                .await
                .fs_context("reading cache digest", entry.path())?;
            entries.push((name, digest.trim().to_string()));
        }
        entries.sort();
        Ok(entries)
    }

    async fn read_digest(&self, key: &CacheKey) -> Result<Option<String>> {
        let path = self.digest_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).fs_context("reading cache digest", &path),
        }
    }

    /// Project root this cache belongs to.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn manager() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("app/src")).await.unwrap();
        tokio::fs::write(dir.path().join("app/src/A.kt"), "class A").await.unwrap();
        let mgr = CacheManager::new(dir.path(), SourceHasher::for_module("app"));
        (dir, mgr)
    }

    #[tokio::test]
    async fn missing_digest_needs_rebuild() {
        let (_dir, mgr) = manager().await;
        let key = CacheKey::new(None, "release", ArtifactKind::AppBundle);
        let v = mgr.validate_cache(&key).await.unwrap();
        assert!(v.needs_rebuild);
        assert_eq!(v.reason, "No cache found");
        assert!(v.cached_hash.is_none());
    }

    #[tokio::test]
    async fn unchanged_sources_are_cache_valid() {
        let (_dir, mgr) = manager().await;
        let key = CacheKey::new(None, "release", ArtifactKind::AppBundle);
        mgr.update_cache(&key).await.unwrap();

        let v = mgr.validate_cache(&key).await.unwrap();
        assert!(!v.needs_rebuild);
        assert_eq!(v.reason, "Cache valid");
        assert_eq!(v.cached_hash.as_deref(), Some(v.current_hash.as_str()));
    }

    #[tokio::test]
    async fn changed_sources_invalidate() {
        let (dir, mgr) = manager().await;
        let key = CacheKey::new(None, "release", ArtifactKind::PackageArchive);
        mgr.update_cache(&key).await.unwrap();
        tokio::fs::write(dir.path().join("app/src/A.kt"), "class A2").await.unwrap();

        let v = mgr.validate_cache(&key).await.unwrap();
        assert!(v.needs_rebuild);
        assert_eq!(v.reason, "Source files changed");
    }

    #[tokio::test]
    async fn slots_are_keyed_by_flavor_and_kind() {
        let (_dir, mgr) = manager().await;
        let prod_apk = CacheKey::new(Some("prod"), "release", ArtifactKind::PackageArchive);
        let dev_apk = CacheKey::new(Some("dev"), "release", ArtifactKind::PackageArchive);
        let prod_aab = CacheKey::new(Some("prod"), "release", ArtifactKind::AppBundle);
        mgr.update_cache(&prod_apk).await.unwrap();

        assert!(!mgr.validate_cache(&prod_apk).await.unwrap().needs_rebuild);
        assert!(mgr.validate_cache(&dev_apk).await.unwrap().needs_rebuild);
        assert!(mgr.validate_cache(&prod_aab).await.unwrap().needs_rebuild);
        assert_eq!(mgr.entries().await.unwrap().len(), 1);

        mgr.clear().await.unwrap();
        assert!(mgr.entries().await.unwrap().is_empty());
    }
}
