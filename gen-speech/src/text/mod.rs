//! Text processing for TTS: cleaning and chunking.

pub mod chunker;
mod cleaner;

pub use chunker::{Chunker, DEFAULT_MAX_CHUNK_SIZE, chunk_text, validate_chunks};
pub use cleaner::clean_text;

/// A chunk of text ready for TTS processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of this chunk in the document
    pub index: usize,
    /// The text content
    pub text: String,
}

impl TextChunk {
    /// Create a new text chunk.
    pub fn new(index: usize, text: String) -> Self {
        Self { index, text }
    }
}
