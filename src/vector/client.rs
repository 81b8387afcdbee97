//! HTTP client wrapper for the Qdrant-backed vector index.

use crate::config::Config;
use crate::jobs::types::current_timestamp_rfc3339;
use crate::vector::payload::serialize_point;
use crate::vector::types::{
    ChunkPoint, QueryResponse, QueryResponseResult, ScoredChunk, UpsertSummary, VectorIndexError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Durable store for chunk embeddings, queryable by similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection when it is missing.
    async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), VectorIndexError>;

    /// Persist a batch of points; `Ok` only when the whole batch is accepted.
    async fn upsert(
        &self,
        collection: &str,
        points: Vec<ChunkPoint>,
    ) -> Result<UpsertSummary, VectorIndexError>;

    /// Return the `limit` nearest stored chunks for the query vector.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorIndexError>;
}

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, VectorIndexError> {
        let client = Client::builder().user_agent("ragline/0.3").build()?;
        let base_url =
            normalize_base_url(&config.qdrant_url).map_err(VectorIndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = config.qdrant_api_key.is_some(),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .user_agent("ragline-test")
                .build()
                .expect("client"),
            base_url,
            api_key: None,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut req = self.client.request(method, format!("{base}/{path}"));
        if let Some(api_key) = self.api_key.as_deref().filter(|value| !value.is_empty()) {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, VectorIndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorIndexError::UnexpectedStatus { status, body };
                tracing::error!(collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn ensure_success(&self, response: reqwest::Response) -> Result<(), VectorIndexError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorIndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector index request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> Result<(), VectorIndexError> {
        if self.collection_exists(collection).await? {
            return Ok(());
        }

        tracing::debug!(collection, vector_size, "Creating collection");
        let body = json!({
            "vectors": { "size": vector_size, "distance": "Cosine" }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{collection}"))
            .json(&body)
            .send()
            .await?;
        self.ensure_success(response).await
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<ChunkPoint>,
    ) -> Result<UpsertSummary, VectorIndexError> {
        if points.is_empty() {
            return Ok(UpsertSummary::default());
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .iter()
            .map(|point| serialize_point(point, &now))
            .collect();
        let written = serialized.len();

        let response = self
            .request(Method::PUT, &format!("collections/{collection}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;
        self.ensure_success(response).await?;

        tracing::debug!(collection, points = written, "Points upserted");
        Ok(UpsertSummary { written })
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, VectorIndexError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });

        let response = self
            .request(Method::POST, &format!("collections/{collection}/points/query"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorIndexError::UnexpectedStatus { status, body };
            tracing::error!(collection, error = %error, "Similarity search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| {
                ScoredChunk::from_payload(stringify_point_id(point.id), point.score, point.payload)
            })
            .collect())
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
