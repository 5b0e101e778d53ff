//! crates/pagecite_core/src/viewer/session.rs
//!
//! One `ViewerSession` per open document. It owns the `ViewerState` and wires
//! the visibility tracker, render scheduler and navigation controller together.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::{Document, DocumentId, PageGeometry, Surface};
use crate::hub::NavigationRequest;
use crate::ports::{DocumentDecoder, PagePainter, PortResult};
use crate::viewer::navigation::{NavigationController, NavigationOutcome, Viewport};
use crate::viewer::scheduler::{PageState, RenderEvent, RenderScheduler};
use crate::viewer::visibility::{IntersectionEntry, VisibilityTracker};
use crate::viewer::{clamp_scale, same_scale, ViewerState, DEFAULT_SCALE, ZOOM_STEP};

/// Vertical gap between page containers, in pixels.
pub const PAGE_GAP: f64 = 16.0;
/// Page height assumed at scale 1.0 before any geometry is known.
pub const DEFAULT_PAGE_HEIGHT: f64 = 800.0;

pub struct ViewerSession {
    state: ViewerState,
    scheduler: RenderScheduler,
    tracker: VisibilityTracker,
    navigation: NavigationController,
    /// Geometry of the first page at scale 1.0.
    first_page: Option<PageGeometry>,
    is_open: bool,
    document_id: Option<DocumentId>,
    /// Sequence number of the last navigation request acted on.
    followed_seq: u64,
}

impl ViewerSession {
    pub fn new(painter: Arc<dyn PagePainter>) -> Self {
        Self {
            state: ViewerState::default(),
            scheduler: RenderScheduler::new(painter, 0, DEFAULT_SCALE),
            tracker: VisibilityTracker::new(0),
            navigation: NavigationController::default(),
            first_page: None,
            is_open: false,
            document_id: None,
            followed_seq: 0,
        }
    }

    pub fn with_prefetch_margin(mut self, margin: u32) -> Self {
        self.tracker = self.tracker.with_margin(margin);
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationController) -> Self {
        self.navigation = navigation;
        self
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document_id
    }

    pub fn page_state(&self, page: u32) -> PageState {
        self.scheduler.state(page)
    }

    pub fn surface(&self, page: u32) -> Option<Arc<Surface>> {
        self.scheduler.surface(page)
    }

    pub fn visible_pages(&self) -> &BTreeSet<u32> {
        self.scheduler.visible()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.scheduler.subscribe()
    }

    /// Earliest instant at which `tick` has something to emit.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tracker.next_deadline()
    }

    /// Estimated distance between consecutive page tops at the current scale.
    pub fn average_page_height(&self) -> f64 {
        let scale = f64::from(self.state.scale);
        match self.first_page {
            Some(geometry) if geometry.height > 0.0 => f64::from(geometry.height) * scale + PAGE_GAP,
            _ => DEFAULT_PAGE_HEIGHT * scale,
        }
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    /// Opens the document with `page_count` pages. `first_page` is the first
    /// page's geometry at scale 1.0, when the decoder could provide it. A
    /// navigation requested before opening is carried out here.
    pub async fn open<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
        page_count: u32,
        first_page: Option<PageGeometry>,
    ) -> Option<NavigationOutcome> {
        info!("Opening viewer with {} pages.", page_count);
        self.scheduler.reset(page_count);
        self.tracker.set_page_count(page_count);
        self.first_page = first_page;
        self.state.total_pages = page_count;
        self.state.current_page = u32::from(page_count > 0);
        self.state.painted.clear();
        self.is_open = true;

        match self.state.pending_target.take() {
            Some(page) => self.go_to(viewport, page).await,
            None => None,
        }
    }

    /// Decodes `document` and opens it, using its first page's geometry for
    /// offset estimates. Navigation requests for other documents are ignored
    /// from here on.
    pub async fn open_document<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
        decoder: &dyn DocumentDecoder,
        document: &Document,
    ) -> PortResult<Option<NavigationOutcome>> {
        let decoded = decoder.open(document.bytes.clone()).await?;
        let page_count = decoded.page_count();
        let first_page = if page_count > 0 {
            decoded.page_geometry(1, DEFAULT_SCALE).await.ok()
        } else {
            None
        };
        self.document_id = Some(document.id);
        Ok(self.open(viewport, page_count, first_page).await)
    }

    /// Forwards a batch of intersection reports.
    pub fn observe(&mut self, entries: &[IntersectionEntry], now: Instant) -> bool {
        self.is_open && self.tracker.observe(entries, now)
    }

    /// Applies the debounced visible set once it is due and refreshes the
    /// current page. Returns whether a new visible set was handed to the scheduler.
    pub fn tick(&mut self, now: Instant) -> bool {
        let emitted = match self.tracker.poll(now) {
            Some(pages) => {
                debug!("Visible pages now {:?}.", pages);
                self.scheduler.set_visible(pages);
                true
            }
            None => false,
        };
        if !self.tracker.is_suspended(now) {
            if let Some(page) = self.tracker.current_page() {
                self.state.current_page = page;
            }
        }
        emitted
    }

    //=====================================================================================
    // Zoom
    //=====================================================================================

    /// Sets the zoom scale, clamped to the allowed range. Every painted page is
    /// invalidated when the scale actually changes.
    pub fn set_zoom(&mut self, scale: f32) -> bool {
        let scale = clamp_scale(scale);
        if same_scale(scale, self.state.scale) {
            return false;
        }
        info!("Zoom {} -> {}.", self.state.scale, scale);
        self.state.scale = scale;
        self.state.painted.clear();
        self.scheduler.set_scale(scale);
        true
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.state.scale + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.state.scale - ZOOM_STEP)
    }

    //=====================================================================================
    // Navigation
    //=====================================================================================

    /// Scrolls to `page`, clamped to the document. Before `open` the target is
    /// remembered and `None` is returned.
    pub async fn go_to<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
        page: u32,
    ) -> Option<NavigationOutcome> {
        if !self.is_open {
            debug!("Viewer not open yet; deferring navigation to page {}.", page);
            self.state.pending_target = Some(page);
            return None;
        }
        if self.state.total_pages == 0 {
            return None;
        }
        let page = page.clamp(1, self.state.total_pages);
        let average = self.average_page_height();
        let outcome = self
            .navigation
            .go_to(viewport, &mut self.tracker, page, average)
            .await;

        // Observation is suspended while the scroll settles, so the target's
        // neighbourhood is requested directly.
        self.state.current_page = outcome.page();
        let around = self.tracker.around(outcome.page());
        self.scheduler.set_visible(around);
        Some(outcome)
    }

    /// Acts on a navigation request published by the hub. Requests already
    /// followed, or aimed at another document, are ignored.
    pub async fn follow<V: Viewport + ?Sized>(
        &mut self,
        viewport: &mut V,
        request: &NavigationRequest,
    ) -> Option<NavigationOutcome> {
        if request.seq <= self.followed_seq {
            return None;
        }
        if matches!(self.document_id, Some(id) if id != request.document_id) {
            return None;
        }
        self.followed_seq = request.seq;
        self.go_to(viewport, request.page).await
    }

    //=====================================================================================
    // Render events
    //=====================================================================================

    /// Waits for the next paint notification and keeps `ViewerState::painted`
    /// in sync with the scheduler.
    pub async fn next_event(&mut self) -> Option<RenderEvent> {
        let event = self.scheduler.next_event().await;
        self.state.painted = self.scheduler.painted_pages();
        event
    }

    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        let events = self.scheduler.drain_events();
        self.state.painted = self.scheduler.painted_pages();
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::navigation::tests::FakeViewport;
    use crate::viewer::navigation::ScrollBehavior;
    use crate::viewer::scheduler::tests::SlowPainter;
    use crate::viewer::{MAX_SCALE, MIN_SCALE};
    use std::time::Duration;

    fn pages(list: &[u32]) -> BTreeSet<u32> {
        list.iter().copied().collect()
    }

    fn letter() -> Option<PageGeometry> {
        Some(PageGeometry {
            width: 612.0,
            height: 792.0,
        })
    }

    async fn paint_n(session: &mut ViewerSession, n: usize) {
        for _ in 0..n {
            session.next_event().await.expect("event");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_observations_drive_painting() {
        let painter = SlowPainter::new(Duration::from_millis(20));
        let mut session = ViewerSession::new(painter.clone());
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 10, letter()).await;

        let start = Instant::now();
        assert!(session.observe(&[IntersectionEntry::visible(5, 1.0)], start));
        assert!(!session.tick(start + Duration::from_millis(50)));
        assert!(session.visible_pages().is_empty());

        assert_eq!(session.next_deadline(), Some(start + Duration::from_millis(100)));
        assert!(session.tick(start + Duration::from_millis(100)));
        assert_eq!(session.visible_pages(), &pages(&[3, 4, 5, 6, 7]));
        assert_eq!(session.state().current_page, 5);

        paint_n(&mut session, 5).await;
        assert_eq!(session.state().painted, pages(&[3, 4, 5, 6, 7]));
        assert!(session.surface(4).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_invalidates_and_repaints_only_visible_pages() {
        let painter = SlowPainter::new(Duration::from_millis(10));
        let mut session = ViewerSession::new(painter.clone()).with_prefetch_margin(0);
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 10, letter()).await;

        let now = Instant::now();
        session.observe(
            &[
                IntersectionEntry::visible(3, 0.2),
                IntersectionEntry::visible(4, 1.0),
                IntersectionEntry::visible(5, 0.4),
            ],
            now,
        );
        session.tick(now + Duration::from_millis(100));
        paint_n(&mut session, 3).await;
        assert_eq!(session.state().painted, pages(&[3, 4, 5]));

        assert!(session.set_zoom(1.5));

        assert!(session.state().painted.is_empty());
        for page in [3, 4, 5] {
            assert_eq!(session.page_state(page), PageState::Painting { scale: 1.5 });
        }
        assert_eq!(session.page_state(6), PageState::NotPainted);

        paint_n(&mut session, 3).await;
        assert_eq!(session.state().painted, pages(&[3, 4, 5]));
        assert_eq!(session.surface(3).unwrap().width, 150);
    }

    #[tokio::test(start_paused = true)]
    async fn zoom_is_stepped_and_clamped() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);

        assert!(session.zoom_in());
        assert_eq!(session.state().scale, 1.25);
        assert!(session.set_zoom(10.0));
        assert_eq!(session.state().scale, MAX_SCALE);
        assert!(!session.zoom_in());

        assert!(session.set_zoom(0.6));
        assert!(session.zoom_out());
        assert_eq!(session.state().scale, MIN_SCALE);
        assert!(!session.zoom_out());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_before_open_is_applied_on_open() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounted();

        assert_eq!(session.go_to(&mut viewport, 7).await, None);
        assert_eq!(session.state().pending_target, Some(7));

        let outcome = session.open(&mut viewport, 10, letter()).await;

        assert_eq!(outcome, Some(NavigationOutcome::Scrolled { page: 7, offset: 6000.0 }));
        assert_eq!(session.state().pending_target, None);
        assert_eq!(session.state().current_page, 7);
        assert_eq!(session.visible_pages(), &pages(&[5, 6, 7, 8, 9]));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_suspends_observation_while_settling() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 10, letter()).await;

        session.go_to(&mut viewport, 9).await;
        let now = Instant::now();
        assert!(!session.observe(&[IntersectionEntry::visible(2, 1.0)], now));
        session.tick(now + Duration::from_millis(100));
        assert_eq!(session.state().current_page, 9);

        let settled = now + Duration::from_millis(600);
        assert!(session.observe(&[IntersectionEntry::visible(8, 1.0)], settled));
        session.tick(settled + Duration::from_millis(100));
        assert_eq!(session.state().current_page, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn pages_seen_before_a_jump_do_not_come_back() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 20, letter()).await;

        let start = Instant::now();
        session.observe(&[IntersectionEntry::visible(2, 1.0)], start);
        session.tick(start + Duration::from_millis(100));
        assert_eq!(session.state().current_page, 2);

        session.go_to(&mut viewport, 15).await;
        let now = Instant::now();
        assert!(!session.observe(
            &[IntersectionEntry::hidden(2), IntersectionEntry::visible(15, 1.0)],
            now
        ));
        let settled = now + Duration::from_millis(600);
        session.tick(settled);
        assert_eq!(session.state().current_page, 15);

        session.observe(
            &[IntersectionEntry::visible(16, 0.6), IntersectionEntry::visible(15, 0.4)],
            settled,
        );
        session.tick(settled + Duration::from_millis(100));
        assert_eq!(session.state().current_page, 16);
        assert_eq!(session.visible_pages(), &pages(&[13, 14, 15, 16, 17, 18]));
    }

    #[tokio::test(start_paused = true)]
    async fn a_tiny_zoom_change_keeps_painted_pages() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter).with_prefetch_margin(0);
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 5, letter()).await;
        let now = Instant::now();
        session.observe(&[IntersectionEntry::visible(1, 1.0)], now);
        session.tick(now + Duration::from_millis(100));
        paint_n(&mut session, 1).await;

        assert!(!session.set_zoom(1.00005));
        assert_eq!(session.state().scale, 1.0);
        assert_eq!(session.state().painted, pages(&[1]));
        assert!(matches!(session.page_state(1), PageState::Painted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn follows_each_navigation_request_once() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounted();
        let document = uuid::Uuid::new_v4();
        session.open(&mut viewport, 10, letter()).await;
        session.document_id = Some(document);

        let request = NavigationRequest { seq: 1, document_id: document, page: 4 };
        assert_eq!(
            session.follow(&mut viewport, &request).await,
            Some(NavigationOutcome::Scrolled { page: 4, offset: 3000.0 })
        );
        assert_eq!(session.follow(&mut viewport, &request).await, None);

        let elsewhere = NavigationRequest { seq: 2, document_id: uuid::Uuid::new_v4(), page: 6 };
        assert_eq!(session.follow(&mut viewport, &elsewhere).await, None);

        let again = NavigationRequest { seq: 3, document_id: document, page: 4 };
        assert!(session.follow(&mut viewport, &again).await.is_some());
        assert_eq!(viewport.scrolls.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unmounted_target_scrolls_to_an_estimate() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounting_after(None);
        session.open(&mut viewport, 10, letter()).await;

        let outcome = session.go_to(&mut viewport, 3).await;

        // (3 - 1) × (792 + 16)
        assert_eq!(outcome, Some(NavigationOutcome::Estimated { page: 3, offset: 1616.0 }));
        assert_eq!(viewport.scrolls, vec![(1616.0, ScrollBehavior::Instant)]);
    }

    #[tokio::test(start_paused = true)]
    async fn targets_are_clamped_to_the_document() {
        let painter = SlowPainter::new(Duration::from_millis(1));
        let mut session = ViewerSession::new(painter);
        let mut viewport = FakeViewport::mounted();
        session.open(&mut viewport, 4, None).await;

        let outcome = session.go_to(&mut viewport, 40).await.unwrap();
        assert_eq!(outcome.page(), 4);
        assert_eq!(session.average_page_height(), DEFAULT_PAGE_HEIGHT);
    }
}
