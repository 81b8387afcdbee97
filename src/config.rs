use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ragline server.
///
/// The composition root loads this once via [`Config::load`] and passes
/// references into every collaborator constructor; there is no process-wide
/// configuration global.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the S3-compatible object storage gateway.
    pub object_store_url: String,
    /// Bucket receiving uploaded source documents.
    pub object_store_bucket: String,
    /// Optional bearer token for the object storage gateway.
    pub object_store_api_token: Option<String>,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection that document chunks are written to.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// API key passed to the OpenAI-compatible embedding/chat endpoints.
    pub openai_api_key: String,
    /// Base URL override for the OpenAI-compatible API.
    pub openai_api_url: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Chat model used to answer retrieval-augmented queries.
    pub chat_model: String,
    /// Token budget per document chunk.
    pub chunk_size: usize,
    /// Sliding token overlap between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of background workers draining the job queue.
    pub worker_count: usize,
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
    /// Optional per-pipeline-step timeout in seconds.
    pub step_timeout_secs: Option<u64>,
    /// Number of chunks retrieved per chat query.
    pub search_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 400;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_SEARCH_TOP_K: usize = 4;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            object_store_url: load_env("OBJECT_STORE_URL")?,
            object_store_bucket: load_env("OBJECT_STORE_BUCKET")?,
            object_store_api_token: load_env_optional("OBJECT_STORE_API_TOKEN"),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            openai_api_key: load_env("OPENAI_API_KEY")?,
            openai_api_url: load_env_optional("OPENAI_API_URL"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", load_env("EMBEDDING_DIMENSION")?)?,
            chat_model: load_env("CHAT_MODEL")?,
            chunk_size: parse_env_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            worker_count: parse_env_or("WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            queue_capacity: parse_env_or("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            step_timeout_secs: load_env_optional("STEP_TIMEOUT_SECS")
                .map(|value| parse_env("STEP_TIMEOUT_SECS", value))
                .transpose()?,
            search_top_k: parse_env_or("SEARCH_TOP_K", DEFAULT_SEARCH_TOP_K)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| parse_env("SERVER_PORT", value))
                .transpose()?,
        };

        if config.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if config.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if config.worker_count == 0 {
            return Err(ConfigError::InvalidValue("WORKER_COUNT".into()));
        }
        if config.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("QUEUE_CAPACITY".into()));
        }

        Ok(config)
    }

    /// Load `.env` (when present) and then the configuration itself.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            object_store = %config.object_store_url,
            bucket = %config.object_store_bucket,
            qdrant = %config.qdrant_url,
            collection = %config.qdrant_collection_name,
            chunk_size = config.chunk_size,
            chunk_overlap = config.chunk_overlap,
            workers = config.worker_count,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => parse_env(key, value),
        None => Ok(default),
    }
}
