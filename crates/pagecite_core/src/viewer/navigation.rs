//! crates/pagecite_core/src/viewer/navigation.rs
//!
//! Programmatic scroll-to-page. The page container is located through the
//! `Viewport` port; if it is not mounted yet the controller retries with a
//! growing delay and finally falls back to an estimated scroll offset.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::viewer::visibility::VisibilityTracker;

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// How long visibility observation stays suspended after a programmatic scroll.
pub const SETTLE_DELAY: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Smooth,
    Instant,
}

/// The scrollable region that hosts the page containers.
pub trait Viewport {
    /// Offset of the page container's top edge, or `None` when it is not mounted.
    fn page_top(&self, page: u32) -> Option<f64>;

    fn scroll_to(&mut self, offset: f64, behavior: ScrollBehavior);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationOutcome {
    /// The container was found and scrolled to.
    Scrolled { page: u32, offset: f64 },
    /// The container never mounted; scrolled to an estimate instead.
    Estimated { page: u32, offset: f64 },
}

impl NavigationOutcome {
    pub fn page(&self) -> u32 {
        match self {
            NavigationOutcome::Scrolled { page, .. } | NavigationOutcome::Estimated { page, .. } => {
                *page
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationController {
    max_attempts: u32,
    retry_base_delay: Duration,
    settle_delay: Duration,
}

impl Default for NavigationController {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_base_delay: RETRY_BASE_DELAY,
            settle_delay: SETTLE_DELAY,
        }
    }
}

impl NavigationController {
    pub fn new(max_attempts: u32, retry_base_delay: Duration, settle_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_base_delay,
            settle_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_base_delay * attempt
    }

    /// Scrolls `viewport` to `page`. Never fails: a container that never mounts
    /// degrades to `(page - 1) × average_page_height`.
    pub async fn go_to<V: Viewport + ?Sized>(
        &self,
        viewport: &mut V,
        tracker: &mut VisibilityTracker,
        page: u32,
        average_page_height: f64,
    ) -> NavigationOutcome {
        let page = page.max(1);

        for attempt in 0..=self.max_attempts {
            if attempt > 0 {
                let delay = self.retry_delay(attempt);
                debug!("Page {} not mounted; retry {} in {:?}.", page, attempt, delay);
                sleep(delay).await;
            }
            if let Some(offset) = viewport.page_top(page) {
                tracker.reset_to(page);
                tracker.suspend_until(Instant::now() + self.settle_delay);
                viewport.scroll_to(offset, ScrollBehavior::Smooth);
                info!("Scrolled to page {} at offset {}.", page, offset);
                return NavigationOutcome::Scrolled { page, offset };
            }
        }

        let offset = f64::from(page - 1) * average_page_height;
        tracker.reset_to(page);
        tracker.suspend_until(Instant::now() + self.settle_delay);
        viewport.scroll_to(offset, ScrollBehavior::Instant);
        info!(
            "Page {} never mounted after {} retries; scrolled to estimated offset {}.",
            page, self.max_attempts, offset
        );
        NavigationOutcome::Estimated { page, offset }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Mounts every container after `mount_after` lookups. Pages are 1000px apart.
    pub(crate) struct FakeViewport {
        pub mount_after: Option<u32>,
        pub lookups: Cell<u32>,
        pub scrolls: Vec<(f64, ScrollBehavior)>,
    }

    impl FakeViewport {
        pub fn mounted() -> Self {
            Self::mounting_after(Some(0))
        }

        pub fn mounting_after(mount_after: Option<u32>) -> Self {
            Self {
                mount_after,
                lookups: Cell::new(0),
                scrolls: Vec::new(),
            }
        }
    }

    impl Viewport for FakeViewport {
        fn page_top(&self, page: u32) -> Option<f64> {
            let seen = self.lookups.get();
            self.lookups.set(seen + 1);
            match self.mount_after {
                Some(after) if seen >= after => Some(f64::from(page - 1) * 1000.0),
                _ => None,
            }
        }

        fn scroll_to(&mut self, offset: f64, behavior: ScrollBehavior) {
            self.scrolls.push((offset, behavior));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scrolls_straight_to_a_mounted_page() {
        let controller = NavigationController::default();
        let mut viewport = FakeViewport::mounted();
        let mut tracker = VisibilityTracker::new(10);

        let outcome = controller.go_to(&mut viewport, &mut tracker, 3, 800.0).await;

        assert_eq!(outcome, NavigationOutcome::Scrolled { page: 3, offset: 2000.0 });
        assert_eq!(viewport.scrolls, vec![(2000.0, ScrollBehavior::Smooth)]);
        assert!(tracker.is_suspended(Instant::now()));
        assert!(!tracker.is_suspended(Instant::now() + SETTLE_DELAY));
        assert_eq!(tracker.current_page(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_growing_delays_until_mounted() {
        let controller = NavigationController::default();
        let mut viewport = FakeViewport::mounting_after(Some(3));
        let mut tracker = VisibilityTracker::new(10);
        let started = Instant::now();

        let outcome = controller.go_to(&mut viewport, &mut tracker, 2, 800.0).await;

        assert_eq!(outcome, NavigationOutcome::Scrolled { page: 2, offset: 1000.0 });
        assert_eq!(viewport.lookups.get(), 4);
        // 100 + 200 + 300 ms of backoff.
        assert_eq!(started.elapsed(), Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_an_estimated_offset() {
        let controller = NavigationController::default();
        let mut viewport = FakeViewport::mounting_after(None);
        let mut tracker = VisibilityTracker::new(10);

        let outcome = controller.go_to(&mut viewport, &mut tracker, 5, 850.0).await;

        assert_eq!(outcome, NavigationOutcome::Estimated { page: 5, offset: 3400.0 });
        assert_eq!(viewport.lookups.get(), MAX_ATTEMPTS + 1);
        assert_eq!(viewport.scrolls, vec![(3400.0, ScrollBehavior::Instant)]);
        assert!(tracker.is_suspended(Instant::now()));
    }
}
