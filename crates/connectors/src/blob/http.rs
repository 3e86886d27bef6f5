use crate::blob::{BlobStore, StoredObject, error::BlobError, public_url};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header::CONTENT_TYPE};
use tracing::debug;

/// Uploads objects with `PUT {endpoint}/{bucket}/{key}` against an
/// S3-style object gateway.
#[derive(Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
    public_base: String,
}

impl HttpBlobStore {
    pub fn new(endpoint: &str, bucket: &str, token: Option<String>, public_base: &str) -> Self {
        HttpBlobStore {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token,
            public_base: public_base.to_string(),
        }
    }

    fn object_endpoint(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket,
            key.trim_start_matches('/')
        )
    }
}

fn classify_status(status: StatusCode) -> Option<BlobError> {
    if status.is_success() {
        None
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::GATEWAY_TIMEOUT
    {
        Some(BlobError::Unavailable(format!("status {status}")))
    } else {
        Some(BlobError::UploadFailed(format!("status {status}")))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, BlobError> {
        let url = self.object_endpoint(key);
        debug!(%url, bytes = content.len(), "Uploading object");

        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(content);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                BlobError::Unavailable(err.to_string())
            } else {
                BlobError::Exception(err.to_string())
            }
        })?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        Ok(StoredObject {
            key: key.to_string(),
            url: public_url(&self.public_base, key),
        })
    }
}
