//! Retrieval-augmented query answering and conversation records.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::jobs::types::current_timestamp_rfc3339;
use crate::vector::{ScoredChunk, VectorIndex, VectorIndexError};

/// Default base URL for the hosted OpenAI API.
const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Errors raised while answering a query.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Embedding the query text failed.
    #[error("Failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Similarity search against the vector index failed.
    #[error("Similarity search failed: {0}")]
    Index(#[from] VectorIndexError),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected chat response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned no choices for the completion.
    #[error("Chat provider returned no completion")]
    EmptyCompletion,
    /// Embedding provider returned no vector for the query.
    #[error("Embedding provider returned no vector for the query")]
    EmptyEmbedding,
}

/// Interface implemented by chat-completion backends.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produce a completion for the given system and user messages.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ChatError> {
        let client = Client::builder().user_agent("ragline/0.3").build()?;
        Ok(Self {
            client,
            base_url: config
                .openai_api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            api_key: config.openai_api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(base_url: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .user_agent("ragline-test")
                .build()
                .expect("client"),
            base_url,
            api_key: "test-key".into(),
            model,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": user },
                ],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ChatError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Chat completion failed");
            return Err(error);
        }

        let payload: CompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ChatError::EmptyCompletion)
    }
}

/// One answered chat query, immutable once appended.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    /// Owning user, absent for anonymous queries.
    pub owner: Option<String>,
    /// Original query text.
    pub query: String,
    /// Model's final answer.
    pub response: String,
    /// RFC3339 timestamp of completion.
    pub timestamp: String,
}

/// Append-only store of answered queries.
#[derive(Default)]
pub struct ConversationStore {
    records: RwLock<Vec<ConversationRecord>>,
}

impl ConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one completed query/answer pair.
    pub async fn append(&self, owner: Option<String>, query: String, response: String) {
        let mut records = self.records.write().await;
        records.push(ConversationRecord {
            owner,
            query,
            response,
            timestamp: current_timestamp_rfc3339(),
        });
    }

    /// Records belonging to the given owner, oldest first.
    pub async fn for_owner(&self, owner: &str) -> Vec<ConversationRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|record| record.owner.as_deref() == Some(owner))
            .cloned()
            .collect()
    }
}

/// Answers free-text queries against the indexed document chunks.
pub struct QueryAnswerer {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatClient>,
    conversations: Arc<ConversationStore>,
    collection: String,
    top_k: usize,
}

impl QueryAnswerer {
    /// Wire an answerer from configuration and collaborators.
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatClient>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            chat,
            conversations,
            collection: config.qdrant_collection_name.clone(),
            top_k: config.search_top_k,
        }
    }

    /// Embed, retrieve, and answer one query, appending a conversation record.
    pub async fn answer(&self, owner: Option<String>, query: &str) -> Result<String, ChatError> {
        tracing::info!(query_len = query.len(), "Answering query");

        let mut vectors = self.embedder.embed(vec![query.to_string()]).await?;
        let vector = vectors.pop().ok_or(ChatError::EmptyEmbedding)?;

        let hits = self.index.search(&self.collection, vector, self.top_k).await?;
        tracing::debug!(hits = hits.len(), "Retrieved context chunks");

        let context = build_context(&hits);
        let system = format!(
            "You are a helpful AI assistant answering queries based only on the following context:\n\n{context}"
        );
        let answer = self.chat.complete(&system, query).await?;

        self.conversations
            .append(owner, query.to_string(), answer.clone())
            .await;
        Ok(answer)
    }
}

fn build_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "Page Content: {}\nPage Number: {}\nFile Location: {}",
                hit.text.as_deref().unwrap_or_default(),
                hit.page_label.as_deref().unwrap_or("unknown"),
                hit.source.as_deref().unwrap_or("unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n\n")
}
