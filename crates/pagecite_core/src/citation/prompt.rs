//! crates/pagecite_core/src/citation/prompt.rs
//!
//! Builds the request sent to the text generator: page-tagged document text
//! between delimiters, the citation rules, and the sanitized question.

use crate::domain::Document;

/// Per-document character budget before truncation.
pub const MAX_DOCUMENT_CHARS: usize = 60_000;

/// Longest question accepted before it is cut with an ellipsis.
pub const MAX_QUESTION_CHARS: usize = 2_000;

pub const TRUNCATION_MARKER: &str = "[... document truncated ...]";

const ELLIPSIS: &str = "...";

const SYSTEM_INSTRUCTIONS: &str = r#"You are a research assistant answering questions about PDF documents the user has uploaded.

The documents are provided between "=== START OF DOCUMENT: <name> ===" and "=== END OF DOCUMENT: <name> ===" lines.
Inside each document, "[Page N]" marks the start of page N."#;

const ANSWER_RULES: &str = r#"RULES:
1. Answer strictly from the document content above. Do not use outside knowledge.
2. If the documents do not contain the answer, say that you cannot find it in the provided documents.
3. End your answer with a final line in EXACTLY this format:
   Source: <DocumentName>, Page <N>
   where <DocumentName> is the exact name from the START OF DOCUMENT line and <N> is the page number from the nearest [Page N] marker.
4. If the answer spans several pages, cite only the single most relevant page."#;

/// A system instruction plus one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub system: String,
    pub user: String,
}

/// Normalizes control characters and line breaks to spaces, strips other
/// non-printable characters, collapses whitespace and caps the length.
pub fn sanitize_question(question: &str) -> String {
    let spaced: String = question
        .chars()
        .filter_map(|c| {
            if c.is_control() || c.is_whitespace() {
                Some(' ')
            } else if is_invisible(c) {
                None
            } else {
                Some(c)
            }
        })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= MAX_QUESTION_CHARS {
        return collapsed;
    }
    let mut capped: String = collapsed.chars().take(MAX_QUESTION_CHARS).collect();
    capped.truncate(capped.trim_end().len());
    capped.push_str(ELLIPSIS);
    capped
}

// Format and zero-width characters that are not `char::is_control`.
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
    )
}

/// Cuts `text` to at most `MAX_DOCUMENT_CHARS` characters, appending a visible marker.
pub fn truncate_document(text: &str) -> String {
    match text.char_indices().nth(MAX_DOCUMENT_CHARS) {
        Some((cut, _)) => format!("{}\n{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Builds the prompt for `question` over `documents`.
///
/// Callers pass only Ready documents; their order is kept.
pub fn build_prompt(question: &str, documents: &[&Document]) -> PromptRequest {
    let mut user = String::new();
    for document in documents {
        user.push_str(&format!("=== START OF DOCUMENT: {} ===\n", document.name));
        user.push_str(&truncate_document(&document.extracted_text));
        user.push_str(&format!("\n=== END OF DOCUMENT: {} ===\n\n", document.name));
    }
    user.push_str(ANSWER_RULES);
    user.push_str("\n\nQUESTION: ");
    user.push_str(&sanitize_question(question));

    PromptRequest {
        system: SYSTEM_INSTRUCTIONS.to_string(),
        user,
    }
}
