//! Shared types used by the vector index client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid vector index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Index responded with an unexpected status code.
    #[error("Unexpected vector index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// One (vector, text, metadata) tuple ready for persistence.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Chunk text stored in the payload for retrieval.
    pub text: String,
    /// Page label the chunk originated from.
    pub page_label: String,
    /// Source identifier (the stored object key).
    pub source: String,
    /// Ingestion job that produced the chunk.
    pub job_id: String,
    /// Deterministic hash of the chunk text.
    pub chunk_hash: String,
    /// Embedding vector produced for the chunk.
    pub vector: Vec<f32>,
}

/// Summary describing how the index applied an upsert request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertSummary {
    /// Number of points accepted by the index.
    pub written: usize,
}

/// Scored chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Identifier assigned to the point.
    pub id: String,
    /// Similarity score computed by the index.
    pub score: f32,
    /// Stored chunk text, if available.
    pub text: Option<String>,
    /// Stored page label, if available.
    pub page_label: Option<String>,
    /// Stored source identifier, if available.
    pub source: Option<String>,
}

impl ScoredChunk {
    pub(crate) fn from_payload(id: String, score: f32, payload: Option<Map<String, Value>>) -> Self {
        let field = |payload: &Option<Map<String, Value>>, key: &str| {
            payload
                .as_ref()
                .and_then(|map| map.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            text: field(&payload, "text"),
            page_label: field(&payload, "page_label"),
            source: field(&payload, "source"),
            id,
            score,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
