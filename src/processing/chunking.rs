//! Token-budget chunking with configurable overlap.
//!
//! Pages are chunked independently so every chunk keeps the page label it
//! came from. The token budget (`CHUNK_SIZE`) is a hard upper bound per
//! chunk; `CHUNK_OVERLAP` requests a sliding token overlap between adjacent
//! chunks of the same page. Token counting prefers `tiktoken-rs` for the
//! configured embedding model and falls back to whitespace counting when the
//! model's encoding is unknown.

use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{cl100k_base, get_bpe_from_model};

use super::parse::DocumentPage;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while slicing pages into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// One bounded slice of a page's text, carrying its retrieval metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// Chunk text, at most `chunk_size` tokens.
    pub text: String,
    /// Page label inherited from the page the chunk was cut from.
    pub page_label: String,
}

/// Chunk every page with the given token budget and overlap.
///
/// Page order and within-page chunk order are preserved. Pages that are all
/// whitespace contribute no chunks.
pub fn chunk_pages(
    pages: &[DocumentPage],
    chunk_size: usize,
    overlap: usize,
    model: &str,
) -> Result<Vec<DocumentChunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let counter = token_counter_for_model(model);
    let mut chunks = Vec::new();
    for page in pages {
        for text in chunk_text_with_counter(&page.text, chunk_size, overlap, counter.clone()) {
            chunks.push(DocumentChunk {
                text,
                page_label: page.page_label.clone(),
            });
        }
    }
    Ok(chunks)
}

/// Build a token counter for the embedding model, falling back to whitespace
/// counting when no tiktoken encoding is known for it.
fn token_counter_for_model(model: &str) -> TokenCounter {
    let encoding = get_bpe_from_model(model).or_else(|err| {
        tracing::debug!(model, error = %err, "No tokenizer for model; trying cl100k_base");
        cl100k_base()
    });
    match encoding {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(err) => {
            tracing::warn!(model, error = %err, "Tokenizer unavailable; using whitespace counter");
            whitespace_token_counter()
        }
    }
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    token_counter: TokenCounter,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let counter_for_chunker = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &token_counter)
}

/// Prefix each chunk after the first with a token-limited tail of its
/// predecessor, trimming from the front so the budget still holds.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    token_counter: &TokenCounter,
) -> Vec<String> {
    if chunks.is_empty() {
        return chunks;
    }

    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut iter = chunks.into_iter();
    let mut previous = iter
        .next()
        .expect("chunks iterator yielded zero elements despite non-empty guard");
    overlapped.push(previous.clone());

    for current in iter {
        let tail = tail_with_token_limit(&previous, effective_overlap, token_counter);
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);
        if !tail.is_empty() {
            combined.push_str(tail);
            if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
                combined.push(' ');
            }
        }
        combined.push_str(&current);
        overlapped.push(trim_to_token_budget(&combined, chunk_size, token_counter));
        previous = current;
    }

    overlapped
}

fn tail_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }

    let trimmed_text = text.trim_start();
    if token_counter.as_ref()(trimmed_text) <= token_limit {
        return trimmed_text;
    }

    let len = text.len();
    let mut start = 0;

    while start < len {
        let next_start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        start = next_start;
        let candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= token_limit {
            return candidate;
        }
    }

    ""
}

fn trim_to_token_budget(text: &str, token_budget: usize, token_counter: &TokenCounter) -> String {
    if token_budget == 0 {
        return String::new();
    }

    if token_counter.as_ref()(text) <= token_budget {
        return text.to_string();
    }

    let len = text.len();
    let mut start = 0;

    while start < len {
        let next_start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        start = next_start;
        let candidate = text[start..].trim_start();
        if token_counter.as_ref()(candidate) <= token_budget {
            return candidate.to_string();
        }
    }

    String::new()
}
