//! crates/pagecite_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any decoder, provider or UI layer.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Opaque identity of an uploaded document, stable for the session lifetime.
pub type DocumentId = Uuid;

//=========================================================================================
// Documents
//=========================================================================================

/// Lifecycle of a document's text extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Processing,
    Ready,
    Failed(String),
}

impl ProcessingState {
    /// Ready and Failed never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Ready | ProcessingState::Failed(_))
    }
}

/// Represents one uploaded PDF file.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    /// Immutable payload. Cloning shares the buffer.
    pub bytes: Bytes,
    pub page_count: u32,
    pub extracted_text: String,
    pub state: ProcessingState,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Creates a document record in the `Pending` state.
    pub fn new(name: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bytes,
            page_count: 0,
            extracted_text: String::new(),
            state: ProcessingState::Pending,
            uploaded_at: Utc::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProcessingState::Ready
    }
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A (document, page) reference recovered from a generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Citation {
    pub document_name: String,
    /// 1-based.
    pub page_number: u32,
}

/// Represents a single turn in the conversation. Never mutated once appended.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub citation: Option<Citation>,
}

//=========================================================================================
// Decoder Primitives
//=========================================================================================

/// Page dimensions at a given scale, in pixels (points × scale).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

/// A positioned run of text as reported by the decoder. Order is decoder order.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// An RGBA8 pixel buffer holding one painted page.
#[derive(Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

// Pixel data is not useful in debug output.
impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

//=========================================================================================
// Notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Error,
}

/// A dismissible, non-blocking message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    pub level: NotificationLevel,
    pub message: String,
}
