//! Length-based document splitting with configurable overlap.
//!
//! Splitting is purely positional: fixed-width character windows that share
//! a configured number of characters with their predecessor. No semantic
//! boundary detection happens here; the overlap is what keeps a phrase that
//! straddles a window edge fully inside at least one chunk, so retrieval can
//! still find it.
//!
//! All lengths are measured in Unicode scalar values (`char`s), never bytes,
//! so multi-byte text can never be split mid-character.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced while splitting a document into chunks.
#[derive(Debug, Error, Diagnostic)]
pub enum ChunkingError {
    /// The document contained no text after whitespace normalization.
    #[error("document is empty after whitespace normalization")]
    #[diagnostic(
        code(ragloom::chunking::empty_document),
        help("Upload a document with extractable text content.")
    )]
    EmptyDocument,

    /// The overlap must be strictly smaller than the window length,
    /// otherwise the window can never advance.
    #[error("chunk overlap {overlap} must be smaller than max length {max_len}")]
    #[diagnostic(code(ragloom::chunking::invalid_window))]
    InvalidWindow { max_len: usize, overlap: usize },
}

/// Collapse every run of whitespace to a single space and trim the ends.
///
/// Normalization runs before hashing and chunking so that two uploads that
/// differ only in line wrapping or indentation are treated as the same
/// content. Applying it twice is a no-op.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping windows of at most `max_len` characters.
///
/// The input is whitespace-normalized first. Each window after the first
/// starts `max_len - overlap` characters after its predecessor, so every
/// consecutive pair shares exactly `overlap` characters; the final window
/// may be shorter than `max_len`. Text that fits in a single window comes
/// back as one chunk. The same input and settings always produce the same
/// chunk sequence.
///
/// # Errors
///
/// Returns [`ChunkingError::EmptyDocument`] when nothing remains after
/// normalization, and [`ChunkingError::InvalidWindow`] when
/// `overlap >= max_len`.
pub fn split_into_chunks(
    text: &str,
    max_len: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if overlap >= max_len {
        return Err(ChunkingError::InvalidWindow { max_len, overlap });
    }

    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Err(ChunkingError::EmptyDocument);
    }

    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= max_len {
        return Ok(vec![normalized]);
    }

    let stride = max_len - overlap;
    let mut chunks = Vec::with_capacity(chars.len() / stride + 1);
    let mut start = 0;
    loop {
        let end = (start + max_len).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    Ok(chunks)
}
