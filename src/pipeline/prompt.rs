//! Prompt assembly for answer synthesis.
//!
//! Both synthesis branches feed the model through [`build_prompt`]: a fixed
//! preamble, optional recent-turn context, a context block (tagged document
//! chunks or trimmed web snippets), and the question. Everything here is
//! pure string work so it can be tested without a model.

use crate::index::ScoredChunk;
use crate::providers::SearchHit;
use crate::stores::Turn;

/// Instructions prepended to every synthesis prompt.
pub const SYSTEM_PREAMBLE: &str = "You are a helpful assistant that answers questions using \
only the provided context. If the context does not contain the answer, say so plainly \
instead of guessing.";

/// How much of each web snippet survives into the prompt.
const SNIPPET_MAX_CHARS: usize = 400;

/// Phrases that signal a question refers back to the conversation.
const HISTORY_MARKERS: [&str; 5] = ["earlier", "previous", "before", "last", "what did you say"];

/// Whether a question appears to reference earlier turns.
///
/// Matching is a case-insensitive substring check against a fixed marker
/// list, so it errs toward including history.
#[must_use]
pub fn references_history(question: &str) -> bool {
    let lowered = question.to_lowercase();
    HISTORY_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn truncated(text: &str, max_chars: usize) -> String {
    let mut shortened: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        shortened.push_str("...");
    }
    shortened
}

/// Context block for the document branch: one tagged paragraph per chunk,
/// in retrieval rank order.
#[must_use]
pub fn document_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|scored| {
            let record = &scored.record;
            let label = if record.document_name.is_empty() {
                &record.document_id
            } else {
                &record.document_name
            };
            format!(
                "[document {label}, chunk {}] {}",
                record.chunk_index, record.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Context block for the web branch: numbered sources with trimmed snippets.
#[must_use]
pub fn web_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Source {} ({}): {}",
                i + 1,
                hit.url,
                truncated(&hit.snippet, SNIPPET_MAX_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Conversation context: recent turns as alternating Q/A lines, oldest first.
#[must_use]
pub fn history_context(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the full synthesis prompt.
#[must_use]
pub fn build_prompt(question: &str, context_block: &str, history: &[Turn]) -> String {
    let mut prompt = String::new();
    prompt.push_str(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n");
    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(&history_context(history));
        prompt.push_str("\n\n");
    }
    prompt.push_str("Context:\n");
    if context_block.is_empty() {
        prompt.push_str("(no supporting context was found)");
    } else {
        prompt.push_str(context_block);
    }
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\nAnswer:");
    prompt
}
