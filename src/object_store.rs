//! Object storage client for staged document uploads.
//!
//! Uploaded source files are durably stored on an S3-compatible gateway
//! addressed as `{base}/{bucket}/{key}`. The client speaks plain
//! authenticated HTTP; credentials are a bearer token on the gateway.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use std::path::Path;
use thiserror::Error;

use crate::config::Config;

/// Stable key of a durably stored object.
pub type ObjectKey = String;

/// Errors returned while talking to object storage.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid object store URL: {0}")]
    InvalidUrl(String),
    /// Staged file could not be read from disk.
    #[error("Failed to read staged file: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Gateway responded with an unexpected status code.
    #[error("Unexpected object store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the gateway.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Interface implemented by object storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Durably upload the staged file under `key`, returning the stored key.
    async fn upload(&self, local_path: &Path, key: &str) -> Result<ObjectKey, ObjectStoreError>;
}

/// HTTP client for an S3-compatible object storage gateway.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    api_token: Option<String>,
}

impl HttpObjectStore {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ObjectStoreError> {
        let client = Client::builder().user_agent("ragline/0.3").build()?;
        let base_url = normalize_base_url(&config.object_store_url)
            .map_err(ObjectStoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            bucket = %config.object_store_bucket,
            has_token = config.object_store_api_token.is_some(),
            "Initialized object store HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            bucket: config.object_store_bucket.clone(),
            api_token: config.object_store_api_token.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(base_url: String, bucket: String, api_token: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("ragline-test")
                .build()
                .expect("client"),
            base_url,
            bucket,
            api_token,
        }
    }

    fn object_url(&self, key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let key = key.trim_start_matches('/');
        format!("{base}/{}/{key}", self.bucket)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, local_path: &Path, key: &str) -> Result<ObjectKey, ObjectStoreError> {
        let bytes = tokio::fs::read(local_path).await?;
        let size = bytes.len();

        let mut request = self
            .client
            .request(Method::PUT, self.object_url(key))
            .header("content-type", "application/octet-stream")
            .body(bytes);
        if let Some(token) = self.api_token.as_deref().filter(|value| !value.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            tracing::debug!(key, bytes = size, "Object uploaded");
            Ok(key.to_string())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ObjectStoreError::UnexpectedStatus { status, body };
            tracing::error!(key, error = %error, "Object upload failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
