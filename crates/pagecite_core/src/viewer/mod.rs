//! crates/pagecite_core/src/viewer/mod.rs
//!
//! The lazy page rendering engine: visibility tracking, render scheduling,
//! programmatic navigation, and the per-document session tying them together.

pub mod navigation;
pub mod scheduler;
pub mod session;
pub mod visibility;

pub use navigation::{NavigationController, NavigationOutcome, ScrollBehavior, Viewport};
pub use scheduler::{PageState, RenderEvent, RenderScheduler};
pub use session::ViewerSession;
pub use visibility::{IntersectionEntry, VisibilityTracker};

use std::collections::BTreeSet;

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;
pub const DEFAULT_SCALE: f32 = 1.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Clamps a zoom scale into `[MIN_SCALE, MAX_SCALE]`. Non-finite input resets to 1.0.
pub fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        DEFAULT_SCALE
    }
}

/// Whether two scales are the same zoom level.
pub fn same_scale(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

/// Transient per-document viewer state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub scale: f32,
    /// 1-based; 0 until the document is open.
    pub current_page: u32,
    pub total_pages: u32,
    /// Pages confirmed painted at `scale`.
    pub painted: BTreeSet<u32>,
    /// Navigation requested before the document finished opening.
    pub pending_target: Option<u32>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            current_page: 0,
            total_pages: 0,
            painted: BTreeSet::new(),
            pending_target: None,
        }
    }
}
