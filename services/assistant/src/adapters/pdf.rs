//! services/assistant/src/adapters/pdf.rs
//!
//! This module contains the `lopdf`-backed document decoder.
//! It implements the `DocumentDecoder` and `DecodedDocument` ports from the `core` crate.
//!
//! Text fragments come from walking each page's content stream: every show-text
//! operator (`Tj`, `TJ`, `'`, `"`) yields one fragment positioned at the current
//! line origin in PDF user space.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use pagecite_core::domain::{PageGeometry, TextFragment};
use pagecite_core::ports::{DecodedDocument, DocumentDecoder, PortError, PortResult};
use tracing::{debug, warn};

/// US Letter, used when no MediaBox can be found.
const FALLBACK_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

//=========================================================================================
// The Decoder
//=========================================================================================

/// Opens PDF buffers with `lopdf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfDecoder;

impl LopdfDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentDecoder for LopdfDecoder {
    async fn open(&self, bytes: Bytes) -> PortResult<Box<dyn DecodedDocument>> {
        let document = tokio::task::spawn_blocking(move || LopdfDocument::parse(&bytes))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))??;
        Ok(Box::new(document))
    }
}

//=========================================================================================
// An Open Document
//=========================================================================================

pub struct LopdfDocument {
    document: Arc<Document>,
    /// Page object ids in page order.
    pages: Vec<ObjectId>,
}

impl LopdfDocument {
    /// Parses a buffer. Encrypted documents are reported as `Unsupported`.
    pub fn parse(bytes: &[u8]) -> PortResult<Self> {
        let document =
            Document::load_mem(bytes).map_err(|e| PortError::InvalidFormat(e.to_string()))?;
        if document.is_encrypted() {
            return Err(PortError::Unsupported(
                "the document is password protected".to_string(),
            ));
        }
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!("Parsed PDF with {} pages.", pages.len());
        Ok(Self {
            document: Arc::new(document),
            pages,
        })
    }

    fn page_id(&self, page: u32) -> PortResult<ObjectId> {
        page.checked_sub(1)
            .and_then(|index| self.pages.get(index as usize))
            .copied()
            .ok_or_else(|| PortError::NotFound(format!("page {}", page)))
    }

    /// Width and height in points, from the page's own or an inherited MediaBox.
    fn page_size(&self, id: ObjectId) -> (f32, f32) {
        let mut current = self.document.get_dictionary(id).ok();
        // Bounded walk up the page tree.
        for _ in 0..32 {
            let Some(dictionary) = current else { break };
            if let Some(size) = media_box(&self.document, dictionary) {
                return size;
            }
            current = dictionary
                .get(b"Parent")
                .and_then(Object::as_reference)
                .and_then(|parent| self.document.get_dictionary(parent))
                .ok();
        }
        warn!("MediaBox not found; falling back to US Letter.");
        FALLBACK_PAGE_SIZE
    }
}

#[async_trait]
impl DecodedDocument for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    async fn page_geometry(&self, page: u32, scale: f32) -> PortResult<PageGeometry> {
        let (width, height) = self.page_size(self.page_id(page)?);
        Ok(PageGeometry {
            width: width * scale,
            height: height * scale,
        })
    }

    async fn text_fragments(&self, page: u32) -> PortResult<Vec<TextFragment>> {
        let id = self.page_id(page)?;
        let content = self
            .document
            .get_page_content(id)
            .map_err(|e| PortError::InvalidFormat(e.to_string()))?;
        let operations = Content::decode(&content)
            .map_err(|e| PortError::InvalidFormat(e.to_string()))?
            .operations;

        let mut cursor = TextCursor::default();
        let mut fragments = Vec::new();
        for op in &operations {
            let shown = match op.operator.as_str() {
                "BT" => {
                    cursor = TextCursor {
                        leading: cursor.leading,
                        ..TextCursor::default()
                    };
                    None
                }
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) = (number(op.operands.first()), number(op.operands.get(1))) {
                        if op.operator == "TD" {
                            cursor.leading = -ty;
                        }
                        cursor.move_line(tx, ty);
                    }
                    None
                }
                "Tm" => {
                    if let (Some(e), Some(f)) = (number(op.operands.get(4)), number(op.operands.get(5))) {
                        cursor.set_origin(e, f);
                    }
                    None
                }
                "TL" => {
                    if let Some(leading) = number(op.operands.first()) {
                        cursor.leading = leading;
                    }
                    None
                }
                "T*" => {
                    cursor.next_line();
                    None
                }
                "Tj" => op.operands.first().and_then(string_operand),
                "'" => {
                    cursor.next_line();
                    op.operands.first().and_then(string_operand)
                }
                "\"" => {
                    cursor.next_line();
                    op.operands.get(2).and_then(string_operand)
                }
                "TJ" => match op.operands.first() {
                    Some(Object::Array(items)) => Some(join_text_array(items)),
                    _ => None,
                },
                _ => None,
            };

            if let Some(text) = shown.filter(|t| !t.trim().is_empty()) {
                fragments.push(TextFragment {
                    text,
                    x: cursor.x,
                    y: cursor.y,
                });
            }
        }
        Ok(fragments)
    }
}

//=========================================================================================
// Content Stream Helpers
//=========================================================================================

/// Start of the current text line.
#[derive(Debug, Default, Clone, Copy)]
struct TextCursor {
    x: f32,
    y: f32,
    leading: f32,
}

impl TextCursor {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.x += tx;
        self.y += ty;
    }

    fn set_origin(&mut self, x: f32, y: f32) {
        self.x = x;
        self.y = y;
    }

    fn next_line(&mut self) {
        self.y -= self.leading;
    }
}

fn media_box(document: &Document, dictionary: &Dictionary) -> Option<(f32, f32)> {
    let object = dictionary.get(b"MediaBox").ok()?;
    let array = match object {
        Object::Array(array) => array,
        Object::Reference(id) => document.get_object(*id).ok()?.as_array().ok()?,
        _ => return None,
    };
    if array.len() < 4 {
        return None;
    }
    let x1 = number(array.first())?;
    let y1 = number(array.get(1))?;
    let x2 = number(array.get(2))?;
    let y2 = number(array.get(3))?;
    Some(((x2 - x1).abs(), (y2 - y1).abs()))
}

fn number(object: Option<&Object>) -> Option<f32> {
    match object? {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// A `TJ` adjustment at or below this many thousandths of an em reads as a word gap.
const WORD_GAP_ADJUSTMENT: f32 = -200.0;

/// Concatenates the strings of a `TJ` array, turning large negative kerning
/// adjustments into spaces.
fn join_text_array(items: &[Object]) -> String {
    let mut joined = String::new();
    for item in items {
        if let Some(text) = string_operand(item) {
            joined.push_str(&text);
        } else if let Some(adjustment) = number(Some(item)) {
            if adjustment <= WORD_GAP_ADJUSTMENT
                && !joined.is_empty()
                && !joined.ends_with(char::is_whitespace)
            {
                joined.push(' ');
            }
        }
    }
    joined
}

fn string_operand(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// UTF-16BE when the string carries a byte order mark, Latin-1 otherwise.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}
