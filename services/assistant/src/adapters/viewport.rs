//! services/assistant/src/adapters/viewport.rs
//!
//! A headless `Viewport` for the CLI: pages are stacked top to bottom with a
//! fixed stride, and every container counts as mounted.

use pagecite_core::viewer::{ScrollBehavior, Viewport};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct StackedViewport {
    page_count: u32,
    stride: f64,
    offset: f64,
}

impl StackedViewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lays out `page_count` containers `stride` pixels apart.
    pub fn fit(&mut self, page_count: u32, stride: f64) {
        self.page_count = page_count;
        self.stride = stride;
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl Viewport for StackedViewport {
    fn page_top(&self, page: u32) -> Option<f64> {
        if (1..=self.page_count).contains(&page) {
            Some(f64::from(page - 1) * self.stride)
        } else {
            None
        }
    }

    fn scroll_to(&mut self, offset: f64, behavior: ScrollBehavior) {
        debug!("Scrolling to {} ({:?}).", offset, behavior);
        self.offset = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_laid_out_pages_are_mounted() {
        let mut viewport = StackedViewport::new();
        assert_eq!(viewport.page_top(1), None);

        viewport.fit(3, 808.0);
        assert_eq!(viewport.page_top(1), Some(0.0));
        assert_eq!(viewport.page_top(3), Some(1616.0));
        assert_eq!(viewport.page_top(4), None);

        viewport.scroll_to(808.0, ScrollBehavior::Smooth);
        assert_eq!(viewport.offset(), 808.0);
    }
}
