//! Source tree digests.
//!
//! Computes a SHA-256 over the tracked inputs of an Android project so that an
//! unchanged tree can skip the toolchain entirely.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::pipeline::error::{Error, ErrorExt, Result};

/// Output and tool-state directories, relative to the project root.
/// `{module}` is the application module directory.
const EXCLUDED_DIRS: &[&str] = &[
    "build",
    "{module}/build",
    ".gradle",
    "{module}/.gradle",
    ".idea",
    ".git",
    ".mobile-release",
];

/// Default tracked inputs, relative to the project root. `{module}` is the
/// application module directory.
pub const DEFAULT_TRACKED_PATHS: &[&str] = &[
    "{module}/src",
    "{module}/build.gradle",
    "{module}/build.gradle.kts",
    "{module}/proguard-rules.pro",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "settings.gradle.kts",
    "gradle.properties",
    "gradle/libs.versions.toml",
    "gradle/wrapper/gradle-wrapper.properties",
];

/// Computes content digests over a fixed set of tracked paths.
#[derive(Debug, Clone)]
pub struct SourceHasher {
    tracked: Vec<PathBuf>,
    excluded: Vec<PathBuf>,
}

impl SourceHasher {
    /// Creates a hasher for the default tracked set of `module`.
    pub fn for_module(module: &str) -> Self {
        Self::with_paths(
            module,
            DEFAULT_TRACKED_PATHS
                .iter()
                .map(|p| p.replace("{module}", module)),
        )
    }

    /// Creates a hasher over explicit relative paths. Output directories of
    /// `module` are still excluded.
    pub fn with_paths<I, S>(module: &str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathBuf>,
    {
        Self {
            tracked: paths.into_iter().map(Into::into).collect(),
            excluded: EXCLUDED_DIRS
                .iter()
                .map(|p| PathBuf::from(p.replace("{module}", module)))
                .collect(),
        }
    }

    /// Hashes every tracked file under `root`.
    ///
    /// Missing tracked paths are skipped. Each file contributes a framed
    /// record (path length, relative path, content length, content) in sorted
    /// order, so renames change the digest and neither traversal order nor
    /// moving bytes between a path and its content can collide.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Hex-encoded SHA-256 digest (64 characters)
    /// * `Err` - If a tracked file cannot be read
    pub async fn digest(&self, root: &Path) -> Result<String> {
        let files = {
            let root = root.to_path_buf();
            let tracked = self.tracked.clone();
            let excluded = self.excluded.clone();
            tokio::task::spawn_blocking(move || collect_files(&root, &tracked, &excluded))
                .await
                .map_err(|e| Error::GenericError(format!("source scan task panicked: {e}")))??
        };

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        for file in &files {
            let rel = file
                .strip_prefix(root)
                .unwrap_or(file.as_path())
                .to_string_lossy()
                .replace('\\', "/");
            hasher.update((rel.len() as u64).to_le_bytes());
            hasher.update(rel.as_bytes());

            let mut handle = tokio::fs::File::open(file)
                .await
                .fs_context("opening file for hashing", file)?;
            let len = handle
                .metadata()
                .await
                .fs_context("reading file metadata for hashing", file)?
                .len();
            hasher.update(len.to_le_bytes());

            let mut read = 0u64;
            loop {
                let n = handle
                    .read(&mut buffer)
                    .await
                    .fs_context("reading file for hash calculation", file)?;
                if n == 0 {
                    break;
                }
                read += n as u64;
                hasher.update(&buffer[..n]);
            }
            if read != len {
                return Err(Error::GenericError(format!(
                    "{} changed while hashing",
                    file.display()
                )));
            }
        }

        log::debug!("Hashed {} tracked files under {}", files.len(), root.display());
        Ok(hex::encode(hasher.finalize()))
    }
}

fn collect_files(root: &Path, tracked: &[PathBuf], excluded: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let is_excluded = |path: &Path| {
        path.strip_prefix(root)
            .is_ok_and(|rel| excluded.iter().any(|ex| rel == ex.as_path()))
    };

    for rel in tracked {
        let path = root.join(rel);
        if path.is_file() {
            files.push(path);
        } else if path.is_dir() && !is_excluded(&path) {
            let walker = walkdir::WalkDir::new(&path)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !(e.file_type().is_dir() && is_excluded(e.path())));
            for entry in walker {
                let entry = entry?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("app/src/main");
        tokio::fs::create_dir_all(&src).await.unwrap();
        tokio::fs::write(src.join("Main.kt"), "fun main() {}").await.unwrap();
        tokio::fs::write(dir.path().join("app/build.gradle"), "android {}").await.unwrap();
        tokio::fs::write(dir.path().join("settings.gradle"), "include ':app'").await.unwrap();
        dir
    }

    #[tokio::test]
    async fn digest_is_stable_for_unchanged_tree() {
        let dir = project().await;
        let hasher = SourceHasher::for_module("app");
        let a = hasher.digest(dir.path()).await.unwrap();
        let b = hasher.digest(dir.path()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn digest_changes_with_source_content() {
        let dir = project().await;
        let hasher = SourceHasher::for_module("app");
        let before = hasher.digest(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join("app/src/main/Main.kt"), "fun main() { println() }")
            .await
            .unwrap();
        assert_ne!(before, hasher.digest(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn build_outputs_are_not_tracked() {
        let dir = project().await;
        let hasher = SourceHasher::with_paths("app", ["app", "settings.gradle"]);
        let before = hasher.digest(dir.path()).await.unwrap();
        let out = dir.path().join("app/build/intermediates");
        tokio::fs::create_dir_all(&out).await.unwrap();
        tokio::fs::write(out.join("generated.txt"), "noise").await.unwrap();
        tokio::fs::create_dir_all(dir.path().join(".gradle")).await.unwrap();
        tokio::fs::write(dir.path().join(".gradle/state.bin"), "noise").await.unwrap();
        assert_eq!(before, hasher.digest(dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn source_package_named_build_is_hashed() {
        let dir = project().await;
        let pkg = dir.path().join("app/src/main/java/com/example/build");
        tokio::fs::create_dir_all(&pkg).await.unwrap();
        tokio::fs::write(pkg.join("BuildConfigHelper.kt"), "object Helper").await.unwrap();

        let hasher = SourceHasher::for_module("app");
        let before = hasher.digest(dir.path()).await.unwrap();
        tokio::fs::write(pkg.join("BuildConfigHelper.kt"), "object Helper { val x = 1 }")
            .await
            .unwrap();
        let after = hasher.digest(dir.path()).await.unwrap();

        assert_ne!(before, after);
        assert_ne!(after, hex::encode(Sha256::digest(b"")));
    }

    #[tokio::test]
    async fn moving_bytes_between_name_and_content_changes_digest() {
        let a = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(a.path().join("src")).await.unwrap();
        tokio::fs::write(a.path().join("src/ab"), "c").await.unwrap();

        let b = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(b.path().join("src")).await.unwrap();
        tokio::fs::write(b.path().join("src/a"), "bc").await.unwrap();

        let hasher = SourceHasher::with_paths("app", ["src"]);
        assert_ne!(
            hasher.digest(a.path()).await.unwrap(),
            hasher.digest(b.path()).await.unwrap()
        );
    }
}
