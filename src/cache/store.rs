//! Directory-backed artifact storage.

use std::{
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::types::CacheKey;

const SOURCE: &str = "cache::store";
const PARTIAL_PREFIX: &str = ".partial-";

#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("cache entry `{key}` not found")]
    NotFound { key: String },
    #[error("cache i/o failed for `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache background task failed: {0}")]
    Background(String),
}

impl ArtifactStoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Key → bytes store rooted at a single directory.
///
/// The directory is created lazily on first write. Writers stage bytes in a
/// hidden temporary file next to the target and rename it into place, so
/// readers only ever observe complete artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of the entry for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Returns whether an entry exists. Errors while probing count as absent.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        let path = self.path_for(key);
        match tokio::fs::try_exists(&path).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    op = "store::exists",
                    result = "probe_error",
                    path = %path.display(),
                    error = %err,
                    "Failed to probe cache entry; treating as missing"
                );
                false
            }
        }
    }

    pub async fn read(&self, key: &CacheKey) -> Result<Bytes, ArtifactStoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ArtifactStoreError::NotFound {
                key: key.to_string(),
            }),
            Err(err) => Err(ArtifactStoreError::io(&path, err)),
        }
    }

    /// Atomically replace the entry for `key` with `data`.
    pub async fn write(&self, key: &CacheKey, data: Bytes) -> Result<(), ArtifactStoreError> {
        let root = self.root.clone();
        let target = self.path_for(key);

        tokio::task::spawn_blocking(move || write_atomic(&root, &target, &data))
            .await
            .map_err(|err| ArtifactStoreError::Background(err.to_string()))?
    }

    /// Remove the entry for `key`. Missing entries are treated as success.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), ArtifactStoreError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(target = SOURCE, op = "store::delete", path = %path.display(), "Cache entry removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ArtifactStoreError::io(&path, err)),
        }
    }

    /// Remove every entry under the cache root and return how many were deleted.
    pub async fn purge(&self) -> Result<usize, ArtifactStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(ArtifactStoreError::io(&self.root, err)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| ArtifactStoreError::io(&self.root, err))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| ArtifactStoreError::io(&path, err))?;
            if !file_type.is_file() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(ArtifactStoreError::io(&path, err)),
            }
        }

        Ok(removed)
    }
}

fn write_atomic(root: &Path, target: &Path, data: &[u8]) -> Result<(), ArtifactStoreError> {
    fs::create_dir_all(root).map_err(|err| ArtifactStoreError::io(root, err))?;

    let mut staged = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(root)
        .map_err(|err| ArtifactStoreError::io(root, err))?;
    staged
        .write_all(data)
        .map_err(|err| ArtifactStoreError::io(staged.path(), err))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|err| ArtifactStoreError::io(staged.path(), err))?;

    staged
        .persist(target)
        .map_err(|err| ArtifactStoreError::io(target, err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(name: &str) -> CacheKey {
        CacheKey::parse(name).expect("valid key")
    }

    #[tokio::test]
    async fn write_then_read_returns_same_bytes() {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path().join("pdf-cache"));
        let payload = Bytes::from_static(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n");

        assert!(!store.exists(&key("a.pdf")).await);
        store
            .write(&key("a.pdf"), payload.clone())
            .await
            .expect("write");

        assert!(store.exists(&key("a.pdf")).await);
        assert_eq!(store.read(&key("a.pdf")).await.expect("read"), payload);
    }

    #[tokio::test]
    async fn write_creates_cache_root_lazily() {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().join("nested").join("pdf-cache");
        let store = ArtifactStore::new(root.clone());
        assert!(!root.exists());

        store
            .write(&key("b.pdf"), Bytes::from_static(b"pdf"))
            .await
            .expect("write");
        assert!(root.join("b.pdf").is_file());
    }

    #[tokio::test]
    async fn overwrite_replaces_content_and_leaves_no_partials() {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path());

        store
            .write(&key("c.pdf"), Bytes::from_static(b"first"))
            .await
            .expect("first write");
        store
            .write(&key("c.pdf"), Bytes::from_static(b"second"))
            .await
            .expect("second write");

        assert_eq!(
            store.read(&key("c.pdf")).await.expect("read"),
            Bytes::from_static(b"second")
        );
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX))
            .collect();
        assert!(leftovers.is_empty(), "partial files left behind");
    }

    #[tokio::test]
    async fn read_missing_entry_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path());

        let err = store.read(&key("missing.pdf")).await.expect_err("missing");
        assert!(matches!(err, ArtifactStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path());
        store
            .write(&key("d.pdf"), Bytes::from_static(b"pdf"))
            .await
            .expect("write");

        store.delete(&key("d.pdf")).await.expect("delete");
        store.delete(&key("d.pdf")).await.expect("second delete");
        assert!(!store.exists(&key("d.pdf")).await);
    }

    #[tokio::test]
    async fn purge_removes_every_entry() {
        let dir = TempDir::new().expect("temp dir");
        let store = ArtifactStore::new(dir.path().join("cache"));
        assert_eq!(store.purge().await.expect("purge empty"), 0);

        for name in ["one.pdf", "two.pdf"] {
            store
                .write(&key(name), Bytes::from_static(b"pdf"))
                .await
                .expect("write");
        }

        assert_eq!(store.purge().await.expect("purge"), 2);
        assert!(!store.exists(&key("one.pdf")).await);
    }
}
