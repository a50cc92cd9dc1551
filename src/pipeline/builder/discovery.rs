//! Locating toolchain outputs on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::pipeline::artifact::ArtifactKind;
use crate::pipeline::error::{Error, Result};

/// Marker the Android toolchain puts in the name of unsigned packages.
pub const UNSIGNED_MARKER: &str = "unsigned";

/// Finds the most recently modified `kind` artifact under `dir`.
///
/// Only regular files whose name matches `*.<ext>` are considered; symlinks
/// and directories are skipped. Returns `Ok(None)` when `dir` is missing or
/// holds no match.
pub async fn find_newest_artifact(dir: &Path, kind: ArtifactKind) -> Result<Option<PathBuf>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        log::debug!("Output directory not found: {}", dir.display());
        return Ok(None);
    }

    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&dir, kind))
        .await
        .map_err(|e| Error::GenericError(format!("artifact scan task panicked: {e}")))?
}

fn scan(dir: &Path, kind: ArtifactKind) -> Result<Option<PathBuf>> {
    let pattern = glob::Pattern::new(&format!("*.{}", kind.extension()))
        .map_err(|e| Error::GenericError(format!("invalid artifact pattern: {e}")))?;
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in walkdir::WalkDir::new(dir).max_depth(2).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !pattern.matches_with(&name, options) {
            log::debug!("  Skipping non-artifact: {}", entry.path().display());
            continue;
        }

        let modified = entry
            .metadata()?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        log::debug!("  Candidate: {}", entry.path().display());

        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, entry.into_path()));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Whether a freshly built artifact already carries a release signature.
///
/// Package archives built without a signing config carry the unsigned marker
/// in their name. Bundles give no such hint and are treated as unsigned until
/// signed by the pipeline.
pub fn looks_signed(kind: ArtifactKind, path: &Path) -> bool {
    match kind {
        ArtifactKind::PackageArchive => path
            .file_name()
            .map(|n| !n.to_string_lossy().to_lowercase().contains(UNSIGNED_MARKER))
            .unwrap_or(false),
        ArtifactKind::AppBundle => false,
    }
}
