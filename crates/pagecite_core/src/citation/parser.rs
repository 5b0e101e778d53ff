//! crates/pagecite_core/src/citation/parser.rs
//!
//! Recovers the trailing `Source: <name>, Page <N>` token from a generated answer.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::domain::Citation;

static CITATION_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Source:\s*([^,]+),\s*Page\s*(\d+)").expect("valid regex")
});

/// An answer split into displayable content and its optional citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedAnswer {
    pub content: String,
    pub citation: Option<Citation>,
}

/// Parses a generated answer.
///
/// Only the first token is honored. When no valid token is present the text is
/// returned untouched; the generator is not under our control, so a missing
/// citation is an uncited answer, not an error.
pub fn parse_response(text: &str) -> ParsedAnswer {
    let uncited = || ParsedAnswer {
        content: text.to_string(),
        citation: None,
    };

    let Some(caps) = CITATION_TOKEN.captures(text) else {
        return uncited();
    };
    let (Some(whole), Some(name), Some(page)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return uncited();
    };

    let document_name = name.as_str().trim();
    let page_number = match page.as_str().parse::<u32>() {
        Ok(n) if n >= 1 => n,
        _ => return uncited(),
    };
    if document_name.is_empty() {
        return uncited();
    }

    let content = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    ParsedAnswer {
        content: content.trim().to_string(),
        citation: Some(Citation {
            document_name: document_name.to_string(),
            page_number,
        }),
    }
}
