//! crates/pagecite_core/src/extraction.rs
//!
//! The text extraction pipeline. Drives a `DocumentDecoder` page by page and
//! produces one page-tagged text blob per document.

use std::sync::LazyLock;

use bytes::Bytes;
use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::ports::{DocumentDecoder, PortError};

/// Body substituted for a page whose fragments could not be read.
pub const FAILED_PAGE_PLACEHOLDER: &str = "[Text extraction failed for this page]";

/// Body used for pages that decode fine but carry no text (e.g. scans).
pub const EMPTY_PAGE_PLACEHOLDER: &str = "[No extractable text on this page]";

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C\r]+").expect("valid regex"));
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m) +$").expect("valid regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

//=========================================================================================
// Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("The file is not a valid PDF document: {0}")]
    InvalidFormat(String),
    #[error("The document cannot be read: {0}")]
    Unsupported(String),
}

/// The result of extracting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub page_count: u32,
    pub text: String,
}

//=========================================================================================
// Pipeline
//=========================================================================================

/// Returns the marker that opens a page's text.
pub fn page_marker(page: u32) -> String {
    format!("[Page {}]", page)
}

/// Extracts page-tagged text from a document buffer.
///
/// Pages are processed strictly in order so markers come out `[Page 1]` .. `[Page N]`.
/// A page that fails keeps its marker and gets `FAILED_PAGE_PLACEHOLDER` as its body.
pub async fn extract(
    decoder: &dyn DocumentDecoder,
    bytes: Bytes,
) -> Result<Extraction, ExtractionError> {
    let document = decoder.open(bytes).await.map_err(|e| match e {
        PortError::Unsupported(reason) => ExtractionError::Unsupported(reason),
        PortError::InvalidFormat(reason) => ExtractionError::InvalidFormat(reason),
        other => ExtractionError::InvalidFormat(other.to_string()),
    })?;

    let page_count = document.page_count();
    info!("Extracting text from {} pages.", page_count);

    let mut raw = String::new();
    for page in 1..=page_count {
        let body = match document.text_fragments(page).await {
            Ok(fragments) => {
                let joined = fragments
                    .iter()
                    .map(|f| f.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if joined.trim().is_empty() {
                    EMPTY_PAGE_PLACEHOLDER.to_string()
                } else {
                    joined
                }
            }
            Err(e) => {
                warn!("Text extraction failed for page {}: {}", page, e);
                FAILED_PAGE_PLACEHOLDER.to_string()
            }
        };
        debug!("Page {} extracted ({} chars).", page, body.len());

        raw.push_str(&page_marker(page));
        raw.push('\n');
        raw.push_str(&body);
        raw.push_str("\n\n");
    }

    Ok(Extraction {
        page_count,
        text: normalize_whitespace(&raw),
    })
}

/// Extracts several documents concurrently. Results come back in input order.
pub async fn extract_many(
    decoder: &dyn DocumentDecoder,
    buffers: Vec<Bytes>,
) -> Vec<Result<Extraction, ExtractionError>> {
    join_all(buffers.into_iter().map(|bytes| extract(decoder, bytes))).await
}

/// Collapses horizontal whitespace runs to one space, strips trailing spaces and
/// folds three or more consecutive newlines into a single blank line.
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed = HORIZONTAL_WHITESPACE.replace_all(text, " ");
    let trimmed_lines = TRAILING_SPACE.replace_all(&collapsed, "");
    EXCESS_BLANK_LINES
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

//=========================================================================================
// Tests
//=========================================================================================
