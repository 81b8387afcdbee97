//! Document processing: PDF parsing and token-budget chunking.

pub mod chunking;
pub mod parse;

pub use chunking::{ChunkingError, DocumentChunk, chunk_pages};
pub use parse::{DocumentPage, DocumentParser, ParseError, PdfParser};
