//! services/assistant/src/error.rs
//!
//! Defines the primary error type for the assistant service and CLI.

use crate::config::ConfigError;
use pagecite_core::citation::AskError;
use pagecite_core::extraction::ExtractionError;
use pagecite_core::hub::HubError;
use pagecite_core::ports::PortError;

/// The primary error type for the `assistant` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Ask(#[from] AskError),

    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Represents a standard Input/Output error (e.g., reading a PDF from disk).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
