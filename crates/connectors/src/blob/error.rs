use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    /// The store could not be reached or asked us to back off.
    #[error("Blob store unavailable: {0}")]
    Unavailable(String),

    /// The store answered and rejected the object.
    #[error("Upload rejected: {0}")]
    UploadFailed(String),

    /// Anything else: local I/O, malformed responses.
    #[error("Blob store exception: {0}")]
    Exception(String),
}

impl BlobError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BlobError::Unavailable(_))
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        BlobError::Exception(err.to_string())
    }
}
