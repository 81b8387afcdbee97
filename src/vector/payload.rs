//! Helpers for constructing and hashing index payloads.

use crate::vector::types::ChunkPoint;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(point: &ChunkPoint, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(point.text.clone()));
    payload.insert("page_label".into(), Value::String(point.page_label.clone()));
    payload.insert("source".into(), Value::String(point.source.clone()));
    payload.insert("job_id".into(), Value::String(point.job_id.clone()));
    payload.insert("chunk_hash".into(), Value::String(point.chunk_hash.clone()));
    payload.insert(
        "timestamp".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Serialize a point into the index's wire shape.
pub(crate) fn serialize_point(point: &ChunkPoint, timestamp_rfc3339: &str) -> Value {
    json!({
        "id": generate_point_id(),
        "vector": point.vector,
        "payload": build_payload(point, timestamp_rfc3339),
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_point_id() -> String {
    Uuid::new_v4().to_string()
}
