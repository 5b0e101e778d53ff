//! crates/pagecite_core/src/viewer/scheduler.rs
//!
//! The render scheduler decides which pages to paint, keeps at most one paint in
//! flight per page, and throws away every painted result when the scale changes.
//!
//! Paints run as tokio tasks. Each carries a `CancellationToken` and a generation
//! number; completions come back over a channel and are only applied when their
//! generation is still the page's current one, so a superseded paint can never
//! mark its page as painted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::Surface;
use crate::ports::{PagePainter, PortError, PortResult};
use crate::viewer::same_scale;

const EVENT_CAPACITY: usize = 64;

/// Paint state of a single page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageState {
    NotPainted,
    Painting { scale: f32 },
    Painted { scale: f32 },
}

/// Notifications published as paints finish.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Painted { page: u32, scale: f32 },
    Failed { page: u32, message: String },
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

struct PaintCompletion {
    page: u32,
    generation: u64,
    scale: f32,
    result: PortResult<Surface>,
}

pub struct RenderScheduler {
    painter: Arc<dyn PagePainter>,
    page_count: u32,
    scale: f32,
    visible: BTreeSet<u32>,
    states: BTreeMap<u32, PageState>,
    surfaces: HashMap<u32, Arc<Surface>>,
    in_flight: HashMap<u32, InFlight>,
    next_generation: u64,
    completions_tx: mpsc::UnboundedSender<PaintCompletion>,
    completions_rx: mpsc::UnboundedReceiver<PaintCompletion>,
    events: broadcast::Sender<RenderEvent>,
}

impl RenderScheduler {
    pub fn new(painter: Arc<dyn PagePainter>, page_count: u32, scale: f32) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            painter,
            page_count,
            scale,
            visible: BTreeSet::new(),
            states: (1..=page_count).map(|p| (p, PageState::NotPainted)).collect(),
            surfaces: HashMap::new(),
            in_flight: HashMap::new(),
            next_generation: 0,
            completions_tx,
            completions_rx,
            events,
        }
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn visible(&self) -> &BTreeSet<u32> {
        &self.visible
    }

    pub fn state(&self, page: u32) -> PageState {
        self.states.get(&page).copied().unwrap_or(PageState::NotPainted)
    }

    /// True only for pages painted at the current scale.
    pub fn is_painted(&self, page: u32) -> bool {
        matches!(self.state(page), PageState::Painted { scale } if same_scale(scale, self.scale))
    }

    pub fn painted_pages(&self) -> BTreeSet<u32> {
        self.states
            .keys()
            .copied()
            .filter(|p| self.is_painted(*p))
            .collect()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// The surface of a page painted at the current scale.
    pub fn surface(&self, page: u32) -> Option<Arc<Surface>> {
        if self.is_painted(page) {
            self.surfaces.get(&page).cloned()
        } else {
            None
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderEvent> {
        self.events.subscribe()
    }

    //=====================================================================================
    // Operations
    //=====================================================================================

    /// Replaces the visible set and requests every visible page that needs paint.
    pub fn set_visible(&mut self, pages: BTreeSet<u32>) {
        self.visible = pages
            .into_iter()
            .filter(|p| (1..=self.page_count).contains(p))
            .collect();

        let candidates: Vec<u32> = self
            .visible
            .iter()
            .copied()
            .filter(|p| match self.state(*p) {
                PageState::NotPainted => true,
                PageState::Painted { scale } => !same_scale(scale, self.scale),
                PageState::Painting { .. } => false,
            })
            .collect();
        for page in candidates {
            self.request_paint(page);
        }
    }

    /// Changes the scale. Every in-flight paint is cancelled and every page goes
    /// back to `NotPainted` before the visible set is requested again.
    pub fn set_scale(&mut self, scale: f32) {
        if same_scale(scale, self.scale) {
            return;
        }
        debug!("Scale {} -> {}; invalidating all pages.", self.scale, scale);
        self.cancel_all();
        self.scale = scale;
        for state in self.states.values_mut() {
            *state = PageState::NotPainted;
        }
        self.surfaces.clear();

        let visible = std::mem::take(&mut self.visible);
        self.set_visible(visible);
    }

    /// Starts painting `page` at the current scale unless it is already painting
    /// or painted at that scale. Returns whether a paint was started.
    pub fn request_paint(&mut self, page: u32) -> bool {
        if !(1..=self.page_count).contains(&page) {
            return false;
        }
        match self.state(page) {
            PageState::Painting { scale } | PageState::Painted { scale }
                if same_scale(scale, self.scale) =>
            {
                return false;
            }
            _ => {}
        }

        if let Some(stale) = self.in_flight.remove(&page) {
            stale.token.cancel();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();
        let scale = self.scale;
        self.in_flight.insert(
            page,
            InFlight {
                generation,
                token: token.clone(),
            },
        );
        self.states.insert(page, PageState::Painting { scale });

        let painter = self.painter.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(PortError::Cancelled),
                result = painter.paint(page, scale, token.clone()) => result,
            };
            let _ = tx.send(PaintCompletion {
                page,
                generation,
                scale,
                result,
            });
        });
        true
    }

    /// Cancels every in-flight paint and drops all state, e.g. when the document
    /// is reopened with a different page count.
    pub fn reset(&mut self, page_count: u32) {
        self.cancel_all();
        self.page_count = page_count;
        self.visible.clear();
        self.surfaces.clear();
        self.states = (1..=page_count).map(|p| (p, PageState::NotPainted)).collect();
    }

    /// Waits for the next paint that produces a notification. Cancelled and
    /// superseded paints are absorbed silently.
    pub async fn next_event(&mut self) -> Option<RenderEvent> {
        loop {
            let completion = self.completions_rx.recv().await?;
            if let Some(event) = self.apply(completion) {
                return Some(event);
            }
        }
    }

    /// Applies every completion that has already arrived, without waiting.
    pub fn drain_events(&mut self) -> Vec<RenderEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            events.extend(self.apply(completion));
        }
        events
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    fn cancel_all(&mut self) {
        for (_, in_flight) in self.in_flight.drain() {
            in_flight.token.cancel();
        }
    }

    fn apply(&mut self, completion: PaintCompletion) -> Option<RenderEvent> {
        let PaintCompletion {
            page,
            generation,
            scale,
            result,
        } = completion;

        match self.in_flight.get(&page) {
            Some(current) if current.generation == generation => {
                self.in_flight.remove(&page);
            }
            _ => {
                debug!("Discarding superseded paint of page {} (generation {}).", page, generation);
                return None;
            }
        }

        let event = match result {
            Ok(surface) => {
                self.states.insert(page, PageState::Painted { scale });
                self.surfaces.insert(page, Arc::new(surface));
                RenderEvent::Painted { page, scale }
            }
            Err(PortError::Cancelled) => {
                self.states.insert(page, PageState::NotPainted);
                return None;
            }
            Err(e) => {
                warn!("Painting page {} failed: {}", page, e);
                self.states.insert(page, PageState::NotPainted);
                RenderEvent::Failed {
                    page,
                    message: e.to_string(),
                }
            }
        };
        let _ = self.events.send(event.clone());
        Some(event)
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

//=========================================================================================
// Tests
//=========================================================================================
