//! Artifact checksums.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::pipeline::error::{ErrorExt, Result};

/// Hex-encoded SHA-256 of a file, read in 8KB chunks.
pub async fn file_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for checksum", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for checksum", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Writes `<file>.sha256` next to `path` in `sha256sum` format and returns the digest.
pub async fn write_checksum_file(path: &Path) -> Result<String> {
    let digest = file_sha256(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = path.with_file_name(format!("{name}.sha256"));
    super::fs::write_atomic(&sidecar, format!("{digest}  {name}\n").as_bytes()).await?;
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_digest_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.apk");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let digest = write_checksum_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let sidecar = std::fs::read_to_string(dir.path().join("app.apk.sha256")).unwrap();
        assert_eq!(sidecar, format!("{digest}  app.apk\n"));
    }
}
