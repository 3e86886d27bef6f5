use crate::blob::{BlobStore, StoredObject, error::BlobError, public_url};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores objects as files below a root directory. Useful for a mounted
/// bucket or a CDN origin directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    bucket: String,
    public_base: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        let root = root.into();
        let bucket = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        FsBlobStore {
            root,
            bucket,
            public_base: public_base.to_string(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BlobError::UploadFailed(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        content: Bytes,
        _content_type: &str,
    ) -> Result<StoredObject, BlobError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content).await?;
        debug!(path = %path.display(), bytes = content.len(), "Stored object");

        Ok(StoredObject {
            key: key.to_string(),
            url: public_url(&self.public_base, key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_object_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("bucket"), "https://cdn.test/");

        let stored = store
            .put("media/2024/a.txt", Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();

        assert_eq!(stored.url, "https://cdn.test/media/2024/a.txt");
        let written = std::fs::read(dir.path().join("bucket/media/2024/a.txt")).unwrap();
        assert_eq!(written, b"hi");
        assert_eq!(store.bucket(), "bucket");
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), "https://cdn.test");
        let err = store
            .put("../etc/passwd", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::UploadFailed(_)));
    }
}
