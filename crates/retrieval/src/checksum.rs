//! Content checksums for change detection

use std::path::Path;

use crate::error::Result;

/// BLAKE3 hex digest of a file's content
pub async fn file_checksum(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hasher.finalize().to_hex().to_string())
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_checksum_tracks_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");

        std::fs::write(&path, "x,y\n1,2\n").unwrap();
        let first = file_checksum(&path).await.unwrap();
        assert_eq!(first, blake3::hash(b"x,y\n1,2\n").to_hex().to_string());
        assert_eq!(file_checksum(&path).await.unwrap(), first);

        std::fs::write(&path, "x,y\n1,3\n").unwrap();
        assert_ne!(file_checksum(&path).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(file_checksum(&dir.path().join("none")).await.is_err());
    }
}
