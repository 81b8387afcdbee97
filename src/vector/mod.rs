//! Vector index contract and the Qdrant HTTP integration.

mod client;
pub mod payload;
mod types;

pub use client::{QdrantIndex, VectorIndex};
pub use payload::compute_chunk_hash;
pub use types::{ChunkPoint, ScoredChunk, UpsertSummary, VectorIndexError};
