//! crates/pagecite_core/src/citation/mock.rs
//!
//! Demo responder used when no usable provider credential is configured. Answers
//! are randomized on purpose but always end in a well-formed citation token, so
//! the citation round-trip and viewer navigation stay usable offline.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::Document;
use crate::extraction::page_marker;

const EXCERPT_CHARS: usize = 240;

const OPENERS: [&str; 4] = [
    "Demo mode (no API key configured). Here is a passage that may be relevant:",
    "Demo mode: this answer is picked at random from your documents. Consider this excerpt:",
    "No provider credential is set, so this is a sample answer. The documents say:",
    "Demo response. A randomly chosen page reads:",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct MockResponder;

impl MockResponder {
    pub fn new() -> Self {
        Self
    }

    /// Produces a random answer over `documents` terminated by a citation token.
    pub fn respond(&self, documents: &[&Document]) -> String {
        let mut rng = rand::thread_rng();
        let Some(document) = documents.choose(&mut rng) else {
            return "Demo mode: there are no documents to answer from.".to_string();
        };
        let page = rng.gen_range(1..=document.page_count.max(1));
        let opener = OPENERS.choose(&mut rng).copied().unwrap_or(OPENERS[0]);
        let excerpt = page_excerpt(&document.extracted_text, page)
            .unwrap_or_else(|| "(this page has no extractable text)".to_string());

        format!(
            "{}\n\n\"{}\"\n\nSource: {}, Page {}",
            opener, excerpt, document.name, page
        )
    }
}

/// Returns the start of `page`'s body from page-tagged text.
pub fn page_excerpt(text: &str, page: u32) -> Option<String> {
    let marker = page_marker(page);
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find(&page_marker(page + 1)).unwrap_or(rest.len());
    let body = rest[..end].trim();
    if body.is_empty() {
        return None;
    }
    let mut excerpt: String = body.chars().take(EXCERPT_CHARS).collect();
    if body.chars().count() > EXCERPT_CHARS {
        excerpt.push_str("...");
    }
    Some(excerpt.replace('\n', " "))
}
