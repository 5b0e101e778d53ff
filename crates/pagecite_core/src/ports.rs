//! crates/pagecite_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete PDF engine and text-generation provider.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::citation::{PromptRequest, ProviderSettings};
use crate::domain::{PageGeometry, Surface, TextFragment};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (decoder, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Rate limited")]
    RateLimited,
    #[error("Quota exhausted")]
    QuotaExceeded,
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Not a decodable document: {0}")]
    InvalidFormat(String),
    #[error("Unsupported document: {0}")]
    Unsupported(String),
    /// The operation was cancelled by its owner. Expected, never surfaced to users.
    #[error("Cancelled")]
    Cancelled,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Opens byte buffers as paginated documents.
#[async_trait]
pub trait DocumentDecoder: Send + Sync {
    /// Fails with `InvalidFormat` for undecodable buffers and `Unsupported` for
    /// documents that need a password.
    async fn open(&self, bytes: Bytes) -> PortResult<Box<dyn DecodedDocument>>;
}

/// A document opened by a `DocumentDecoder`. Pages are 1-based.
#[async_trait]
pub trait DecodedDocument: Send + Sync {
    fn page_count(&self) -> u32;

    async fn page_geometry(&self, page: u32, scale: f32) -> PortResult<PageGeometry>;

    /// Returns the page's text fragments in decoder order.
    async fn text_fragments(&self, page: u32) -> PortResult<Vec<TextFragment>>;
}

/// Paints pages of one open document into pixel surfaces.
#[async_trait]
pub trait PagePainter: Send + Sync {
    /// Paints `page` at `scale`. Implementations return `PortError::Cancelled`
    /// once `cancel` fires.
    async fn paint(&self, page: u32, scale: f32, cancel: CancellationToken) -> PortResult<Surface>;
}

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Sends a prompt to the provider described by `provider` and returns the raw reply.
    async fn generate(&self, provider: &ProviderSettings, request: &PromptRequest)
        -> PortResult<String>;
}
