//! services/assistant/src/adapters/render.rs
//!
//! This module contains the PDFium-backed page painter.
//! It implements the `PagePainter` port from the `core` crate.

use std::sync::OnceLock;

use async_trait::async_trait;
use bytes::Bytes;
use pagecite_core::domain::Surface;
use pagecite_core::ports::{PagePainter, PortError, PortResult};
use pdfium_render::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

static PDFIUM: OnceLock<Result<Pdfium, String>> = OnceLock::new();

/// Binds the PDFium library once per process, trying `./lib`, `./` and then
/// the system library.
fn pdfium() -> PortResult<&'static Pdfium> {
    PDFIUM
        .get_or_init(|| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./lib"))
                .or_else(|_| {
                    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                })
                .or_else(|_| Pdfium::bind_to_system_library())
                .map(|bindings| {
                    info!("PDFium library bound.");
                    Pdfium::new(bindings)
                })
                .map_err(|e| format!("PDFium library not found (tried ./lib, ./ and system): {}", e))
        })
        .as_ref()
        .map_err(|e| PortError::Unsupported(e.clone()))
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Paints pages of one document held in memory.
#[derive(Clone)]
pub struct PdfiumPainter {
    bytes: Bytes,
}

impl PdfiumPainter {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    fn paint_blocking(bytes: &[u8], page: u32, scale: f32) -> PortResult<Surface> {
        let pdfium = pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_vec(bytes.to_vec(), None)
            .map_err(|e| PortError::InvalidFormat(e.to_string()))?;

        let index = page
            .checked_sub(1)
            .and_then(|i| u16::try_from(i).ok())
            .ok_or_else(|| PortError::NotFound(format!("page {}", page)))?;
        let pdf_page = document
            .pages()
            .get(index)
            .map_err(|_| PortError::NotFound(format!("page {}", page)))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = pdf_page
            .render_with_config(&config)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let rgba = bitmap.as_image().to_rgba8();
        Ok(Surface {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })
    }
}

//=========================================================================================
// `PagePainter` Trait Implementation
//=========================================================================================

#[async_trait]
impl PagePainter for PdfiumPainter {
    async fn paint(&self, page: u32, scale: f32, cancel: CancellationToken) -> PortResult<Surface> {
        if cancel.is_cancelled() {
            return Err(PortError::Cancelled);
        }
        debug!("Painting page {} at scale {}.", page, scale);

        let bytes = self.bytes.clone();
        let surface = tokio::task::spawn_blocking(move || Self::paint_blocking(&bytes, page, scale))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))??;

        // A rasterization cannot be interrupted; its result is dropped instead.
        if cancel.is_cancelled() {
            return Err(PortError::Cancelled);
        }
        Ok(surface)
    }
}
