//! PDF parsing into ordered per-page text.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while turning a staged document into text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be read or decoded as a PDF.
    #[error("failed to parse document: {0}")]
    Malformed(String),
    /// The document parsed but yielded no extractable text.
    #[error("document contains no extractable text")]
    EmptyDocument,
}

/// One page of extracted text, in document order.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    /// Human-readable page label (1-based page number).
    pub page_label: String,
    /// Raw text extracted from the page.
    pub text: String,
}

/// Interface implemented by document parsers.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse the staged file into an ordered sequence of pages.
    async fn parse(&self, path: &Path) -> Result<Vec<DocumentPage>, ParseError>;
}

/// PDF text extractor backed by lopdf.
#[derive(Debug, Default)]
pub struct PdfParser;

impl PdfParser {
    /// Construct a new parser instance.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for PdfParser {
    async fn parse(&self, path: &Path) -> Result<Vec<DocumentPage>, ParseError> {
        let path: PathBuf = path.to_path_buf();
        // lopdf is synchronous; keep it off the async workers' reactor.
        tokio::task::spawn_blocking(move || extract_pages(&path))
            .await
            .map_err(|err| ParseError::Malformed(err.to_string()))?
    }
}

fn extract_pages(path: &Path) -> Result<Vec<DocumentPage>, ParseError> {
    let document =
        lopdf::Document::load(path).map_err(|err| ParseError::Malformed(err.to_string()))?;

    let mut pages = Vec::new();
    for (page_number, _) in document.get_pages() {
        let Ok(text) = document.extract_text(&[page_number]) else {
            tracing::warn!(page = page_number, "Skipping page with unextractable text");
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        pages.push(DocumentPage {
            page_label: page_number.to_string(),
            text,
        });
    }

    if pages.is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    Ok(pages)
}
