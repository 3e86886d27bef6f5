//! Object storage capability used by the chunk worker.
//!
//! The engine only ever uploads: an object is written under a key and the
//! store answers with the public URL it will be served from.

use crate::blob::error::BlobError;
use async_trait::async_trait;
use bytes::Bytes;

pub mod error;
pub mod fs;
pub mod http;

/// Receipt of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the bucket (or container) objects are written to.
    fn bucket(&self) -> &str;

    async fn put(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, BlobError>;
}

/// Guesses the content type from the file extension.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Joins a public base URL and an object key with exactly one slash.
pub fn public_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_content_types() {
        assert_eq!(content_type_for("2024/05/photo.jpg"), "image/jpeg");
        assert_eq!(content_type_for("doc.pdf"), "application/pdf");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn joins_urls() {
        assert_eq!(
            public_url("https://cdn.example.com/", "/media/a.png"),
            "https://cdn.example.com/media/a.png"
        );
    }
}
