//! File system utilities for the pipeline.
//!
//! Idempotent directory helpers, copying with parent creation, and the atomic
//! write used for the persisted cache digest.

use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::pipeline::error::{Error, ErrorExt, Result};

/// Creates all of the directories of the specified path.
pub async fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("removing directory", path),
    }
}

/// Copies a regular file from one path to another, creating any parent
/// directories of the destination path as necessary.
///
/// Fails if the source path is a directory or doesn't exist.
pub async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
    if !from.exists() {
        return Err(Error::GenericError(format!("{from:?} does not exist")));
    }
    if !from.is_file() {
        return Err(Error::GenericError(format!("{from:?} is not a file")));
    }
    if let Some(dest_dir) = to.parent() {
        create_dir_all(dest_dir).await?;
    }
    fs::copy(from, to).await.fs_context("copying file", to)
}

/// Writes `contents` to `path` atomically.
///
/// The data goes to a uniquely named sibling first and is then renamed over
/// the destination, so readers see either the old or the new file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::GenericError(format!("{path:?} has no parent directory")))?;
    create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let write = async {
        let mut file = fs::File::create(&tmp)
            .await
            .fs_context("creating temporary file", &tmp)?;
        file.write_all(contents)
            .await
            .fs_context("writing temporary file", &tmp)?;
        file.sync_all()
            .await
            .fs_context("syncing temporary file", &tmp)?;
        fs::rename(&tmp, path)
            .await
            .fs_context("replacing file", path)
    };

    match write.await {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp).await;
            Err(e)
        }
    }
}
