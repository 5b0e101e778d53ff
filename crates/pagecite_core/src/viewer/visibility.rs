//! crates/pagecite_core/src/viewer/visibility.rs
//!
//! Tracks which page containers intersect the scrollable viewport.
//!
//! This is a plain state machine: observation batches arm a debounce deadline,
//! and `poll` emits the merged visible set once the deadline has passed. Time is
//! passed in as `tokio::time::Instant` so tests can drive it with a paused clock.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tokio::time::Instant;

/// Pages painted ahead of and behind the intersecting ones.
pub const PREFETCH_MARGIN: u32 = 2;

/// Quiet period before a batch of observations is emitted.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// One intersection report for a page container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionEntry {
    pub page: u32,
    /// Fraction of the container inside the viewport, `0.0..=1.0`.
    pub ratio: f32,
    pub intersecting: bool,
}

impl IntersectionEntry {
    pub fn visible(page: u32, ratio: f32) -> Self {
        Self { page, ratio, intersecting: true }
    }

    pub fn hidden(page: u32) -> Self {
        Self { page, ratio: 0.0, intersecting: false }
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    page_count: u32,
    margin: u32,
    debounce: Duration,
    intersecting: BTreeMap<u32, f32>,
    deadline: Option<Instant>,
    suspended_until: Option<Instant>,
}

impl VisibilityTracker {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            margin: PREFETCH_MARGIN,
            debounce: DEBOUNCE,
            intersecting: BTreeMap::new(),
            deadline: None,
            suspended_until: None,
        }
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Resizes for a (re)opened document and forgets every observation.
    pub fn set_page_count(&mut self, page_count: u32) {
        self.page_count = page_count;
        self.intersecting.clear();
        self.deadline = None;
    }

    /// Forgets every intersection and treats `page` as fully visible. Used after a
    /// programmatic scroll, whose own reports arrive while observation is suspended.
    pub fn reset_to(&mut self, page: u32) {
        self.intersecting.clear();
        self.deadline = None;
        if (1..=self.page_count).contains(&page) {
            self.intersecting.insert(page, 1.0);
        }
    }

    /// Records a batch of intersection reports and (re)arms the debounce timer.
    /// Returns false when the batch was dropped because observation is suspended.
    pub fn observe(&mut self, entries: &[IntersectionEntry], now: Instant) -> bool {
        if self.is_suspended(now) {
            return false;
        }
        for entry in entries {
            if !(1..=self.page_count).contains(&entry.page) {
                continue;
            }
            if entry.intersecting && entry.ratio.is_finite() {
                self.intersecting.insert(entry.page, entry.ratio.clamp(0.0, 1.0));
            } else {
                self.intersecting.remove(&entry.page);
            }
        }
        self.deadline = Some(now + self.debounce);
        true
    }

    /// Emits the visible set once the debounce deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<BTreeSet<u32>> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                Some(self.visible_pages())
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Intersecting pages expanded by the prefetch margin, clamped to the document.
    pub fn visible_pages(&self) -> BTreeSet<u32> {
        let mut pages = BTreeSet::new();
        for &page in self.intersecting.keys() {
            pages.extend(self.around(page));
        }
        pages
    }

    /// `page` plus the prefetch margin on each side.
    pub fn around(&self, page: u32) -> BTreeSet<u32> {
        if self.page_count == 0 {
            return BTreeSet::new();
        }
        let first = page.saturating_sub(self.margin).max(1);
        let last = page.saturating_add(self.margin).min(self.page_count);
        (first..=last).collect()
    }

    /// The page with the largest visible ratio; ties go to the lower page.
    pub fn current_page(&self) -> Option<u32> {
        let mut best: Option<(u32, f32)> = None;
        for (&page, &ratio) in &self.intersecting {
            match best {
                Some((_, best_ratio)) if ratio <= best_ratio => {}
                _ => best = Some((page, ratio)),
            }
        }
        best.map(|(page, _)| page)
    }

    /// Ignores observations until `until`, so a programmatic scroll is not
    /// fought by the reports it triggers.
    pub fn suspend_until(&mut self, until: Instant) {
        self.suspended_until = Some(until);
        self.deadline = None;
    }

    pub fn is_suspended(&self, now: Instant) -> bool {
        matches!(self.suspended_until, Some(until) if now < until)
    }
}
