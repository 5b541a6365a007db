//! Scroll-driven page visibility for continuous mode
//!
//! Pages are stacked vertically with a fixed gap. The tracker compares the
//! viewport against the page rectangles and reports pages entering the
//! lookahead area, leaving it, and drifting far enough away that their
//! canvas should be released.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::types::PageSize;

/// Vertical placement of every page at one scale
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageLayout {
    tops: Vec<f32>,
    heights: Vec<f32>,
    total_height: f32,
}

impl PageLayout {
    /// Stack `sizes` at `scale` with `gap` pixels between pages
    #[must_use]
    pub fn new(sizes: &[PageSize], scale: f32, gap: f32) -> Self {
        let mut tops = Vec::with_capacity(sizes.len());
        let mut heights = Vec::with_capacity(sizes.len());
        let mut y = 0.0_f32;

        for (idx, size) in sizes.iter().enumerate() {
            if idx > 0 {
                y += gap;
            }
            let height = size.at_scale(scale).height.max(0.0);
            tops.push(y);
            heights.push(height);
            y += height;
        }

        Self {
            tops,
            heights,
            total_height: y,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.tops.len()
    }

    /// Top edge of a 1-based page
    #[must_use]
    pub fn top(&self, page: usize) -> Option<f32> {
        page.checked_sub(1).and_then(|idx| self.tops.get(idx)).copied()
    }

    #[must_use]
    pub fn height(&self, page: usize) -> Option<f32> {
        page.checked_sub(1).and_then(|idx| self.heights.get(idx)).copied()
    }

    #[must_use]
    pub fn bottom(&self, page: usize) -> Option<f32> {
        Some(self.top(page)? + self.height(page)?)
    }

    #[must_use]
    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    /// Page whose vertical extent (gap below included) contains `offset`
    #[must_use]
    pub fn page_at(&self, offset: f32) -> Option<usize> {
        if self.tops.is_empty() {
            return None;
        }
        let idx = self.tops.partition_point(|top| *top <= offset);
        Some(idx.max(1))
    }

    /// Distance in pixels between a page and the span `[start, end]`,
    /// 0 when they overlap
    fn distance(&self, idx: usize, start: f32, end: f32) -> f32 {
        let top = self.tops[idx];
        let bottom = top + self.heights[idx];
        if bottom < start {
            start - bottom
        } else if top > end {
            top - end
        } else {
            0.0
        }
    }

    fn overlap(&self, idx: usize, start: f32, end: f32) -> f32 {
        let top = self.tops[idx];
        let bottom = top + self.heights[idx];
        (bottom.min(end) - top.max(start)).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VisibilityEvent {
    /// Page came within the lookahead margin of the viewport
    Entered(usize),
    /// Page moved out of the lookahead area; `distance` is measured from
    /// the viewport edge
    Left { page: usize, distance: f32 },
    /// Page is beyond the clear distance; drop its pixels
    Clear(usize),
}

/// Tracks which pages are near the viewport in continuous mode
#[derive(Clone, Debug)]
pub struct VisibilityTracker {
    lookahead: f32,
    clear_distance: f32,
    /// Pages inside the lookahead area
    near: BTreeSet<usize>,
    /// Pages that entered at some point and have not been cleared since
    live: BTreeSet<usize>,
    /// Pages overlapping the viewport itself
    visible: BTreeSet<usize>,
    current_page: usize,
}

impl VisibilityTracker {
    #[must_use]
    pub fn new(lookahead: f32, clear_distance: f32) -> Self {
        Self {
            lookahead: lookahead.max(0.0),
            clear_distance: clear_distance.max(0.0),
            near: BTreeSet::new(),
            live: BTreeSet::new(),
            visible: BTreeSet::new(),
            current_page: 1,
        }
    }

    /// Recompute visibility for the viewport `[scroll_top, scroll_top + viewport_height]`
    pub fn update(
        &mut self,
        layout: &PageLayout,
        scroll_top: f32,
        viewport_height: f32,
    ) -> Vec<VisibilityEvent> {
        let view_start = scroll_top;
        let view_end = scroll_top + viewport_height.max(0.0);
        let mut events = vec![];
        self.visible.clear();

        let mut best: Option<(usize, f32)> = None;
        for idx in 0..layout.page_count() {
            let page = idx + 1;
            let distance = layout.distance(idx, view_start, view_end);

            if distance <= self.lookahead {
                if self.near.insert(page) {
                    self.live.insert(page);
                    events.push(VisibilityEvent::Entered(page));
                }
            } else if self.near.remove(&page) {
                events.push(VisibilityEvent::Left { page, distance });
            }

            if distance > self.clear_distance && self.live.remove(&page) {
                events.push(VisibilityEvent::Clear(page));
            }

            let overlap = layout.overlap(idx, view_start, view_end);
            if overlap > 0.0 {
                self.visible.insert(page);
                if best.is_none_or(|(_, most)| overlap > most) {
                    best = Some((page, overlap));
                }
            }
        }

        // Pages past the end of a shrunken layout
        let count = layout.page_count();
        self.near.retain(|page| *page <= count);
        let stale: Vec<usize> = self.live.range(count + 1..).copied().collect();
        for page in stale {
            self.live.remove(&page);
            events.push(VisibilityEvent::Clear(page));
        }

        if let Some((page, _)) = best {
            self.current_page = page;
        } else if let Some(page) = layout.page_at(view_start) {
            self.current_page = page;
        }

        events
    }

    /// Forget lookahead membership so the next `update` re-announces every
    /// nearby page. Used after the layout changes scale.
    pub fn relayout(&mut self) {
        self.near.clear();
    }

    pub fn reset(&mut self) {
        self.near.clear();
        self.live.clear();
        self.visible.clear();
        self.current_page = 1;
    }

    /// Page with the largest visible overlap, lowest index on ties
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Page is inside the lookahead area
    #[must_use]
    pub fn is_near(&self, page: usize) -> bool {
        self.near.contains(&page)
    }

    /// Pages overlapping the viewport as of the last `update`
    pub fn visible_pages(&self) -> impl Iterator<Item = usize> + '_ {
        self.visible.iter().copied()
    }
}

/// Coalesces scroll offsets so visibility runs at most once per interval
#[derive(Clone, Debug)]
pub struct ScrollThrottle {
    interval: Duration,
    last_run: Option<Instant>,
    pending: Option<f32>,
}

impl ScrollThrottle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            pending: None,
        }
    }

    /// Offer a new scroll offset. Returns the offset to process now, or
    /// keeps it as the trailing value for `flush`.
    pub fn offer(&mut self, offset: f32, now: Instant) -> Option<f32> {
        if self.ready(now) {
            self.last_run = Some(now);
            self.pending = None;
            Some(offset)
        } else {
            self.pending = Some(offset);
            None
        }
    }

    /// Deliver the trailing offset once the interval has passed
    pub fn flush(&mut self, now: Instant) -> Option<f32> {
        if self.pending.is_some() && self.ready(now) {
            self.last_run = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// When the trailing offset becomes deliverable
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending?;
        self.last_run.map(|last| last + self.interval)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.last_run = None;
        self.pending = None;
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_run
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(pages: usize) -> PageLayout {
        PageLayout::new(&vec![PageSize::new(100.0, 500.0); pages], 1.0, 10.0)
    }

    fn entered(events: &[VisibilityEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                VisibilityEvent::Entered(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    fn cleared(events: &[VisibilityEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                VisibilityEvent::Clear(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn layout_stacks_pages_with_gap() {
        let layout = layout(3);
        assert_eq!(layout.top(1), Some(0.0));
        assert_eq!(layout.top(2), Some(510.0));
        assert_eq!(layout.bottom(3), Some(1520.0));
        assert_eq!(layout.total_height(), 1520.0);
        assert_eq!(layout.top(0), None);
        assert_eq!(layout.top(4), None);
    }

    #[test]
    fn page_at_offset() {
        let layout = layout(3);
        assert_eq!(layout.page_at(0.0), Some(1));
        assert_eq!(layout.page_at(505.0), Some(1));
        assert_eq!(layout.page_at(510.0), Some(2));
        assert_eq!(layout.page_at(99_999.0), Some(3));
        assert_eq!(PageLayout::default().page_at(0.0), None);
    }

    #[test]
    fn lookahead_announces_pages_before_they_are_visible() {
        let layout = layout(5);
        let mut tracker = VisibilityTracker::new(200.0, 1000.0);

        // Viewport [0, 400]; page 2 starts at 510, within 200px
        let events = tracker.update(&layout, 0.0, 400.0);
        assert_eq!(entered(&events), vec![1, 2]);
        assert_eq!(tracker.current_page(), 1);

        // Nothing new on a repeat
        assert!(tracker.update(&layout, 0.0, 400.0).is_empty());
    }

    #[test]
    fn leaving_and_clearing_are_separate() {
        let layout = layout(10);
        let mut tracker = VisibilityTracker::new(200.0, 1000.0);
        tracker.update(&layout, 0.0, 400.0);

        // Page 1 bottom at 500, viewport starts at 1020: left, not cleared
        let events = tracker.update(&layout, 1020.0, 400.0);
        assert!(events.contains(&VisibilityEvent::Left {
            page: 1,
            distance: 520.0
        }));
        assert!(cleared(&events).is_empty());

        // Page 1 now 1540px away: cleared
        let events = tracker.update(&layout, 2040.0, 400.0);
        assert!(cleared(&events).contains(&1));
        assert!(!cleared(&events).contains(&4));
    }

    #[test]
    fn current_page_is_max_overlap() {
        let layout = layout(5);
        let mut tracker = VisibilityTracker::new(0.0, 1000.0);

        // Viewport [300, 800]: page 1 overlaps 200, page 2 overlaps 290
        tracker.update(&layout, 300.0, 500.0);
        assert_eq!(tracker.current_page(), 2);
    }

    #[test]
    fn never_reports_pages_outside_layout() {
        let layout = layout(2);
        let mut tracker = VisibilityTracker::new(5000.0, 10_000.0);
        let events = tracker.update(&layout, 0.0, 10_000.0);
        assert_eq!(entered(&events), vec![1, 2]);
    }

    #[test]
    fn relayout_reannounces_near_pages() {
        let layout = layout(5);
        let mut tracker = VisibilityTracker::new(200.0, 1000.0);
        tracker.update(&layout, 0.0, 400.0);

        tracker.relayout();
        let events = tracker.update(&layout, 0.0, 400.0);
        assert_eq!(entered(&events), vec![1, 2]);
    }

    #[test]
    fn shrinking_layout_clears_missing_pages() {
        let mut tracker = VisibilityTracker::new(200.0, 1000.0);
        tracker.update(&layout(3), 0.0, 2000.0);

        let events = tracker.update(&layout(1), 0.0, 2000.0);
        assert_eq!(cleared(&events), vec![2, 3]);
        assert!(!tracker.is_near(2));
        assert_eq!(tracker.visible_pages().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn visible_pages_exclude_lookahead() {
        // Pages at 0, 510, 1020, 1530
        let layout = layout(4);
        let mut tracker = VisibilityTracker::new(200.0, 1000.0);
        tracker.update(&layout, 0.0, 400.0);

        assert!(tracker.is_near(2));
        assert_eq!(tracker.visible_pages().collect::<Vec<_>>(), vec![1]);

        tracker.update(&layout, 600.0, 300.0);
        assert!((1..=3).all(|page| tracker.is_near(page)));
        assert_eq!(tracker.visible_pages().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn throttle_coalesces_offsets() {
        let start = Instant::now();
        let mut throttle = ScrollThrottle::new(Duration::from_millis(100));

        assert_eq!(throttle.offer(10.0, start), Some(10.0));
        assert_eq!(throttle.offer(20.0, start + Duration::from_millis(10)), None);
        assert_eq!(throttle.offer(30.0, start + Duration::from_millis(20)), None);
        assert_eq!(
            throttle.deadline(),
            Some(start + Duration::from_millis(100))
        );

        assert_eq!(throttle.flush(start + Duration::from_millis(50)), None);
        assert_eq!(
            throttle.flush(start + Duration::from_millis(100)),
            Some(30.0)
        );
        assert!(!throttle.has_pending());
        assert_eq!(throttle.flush(start + Duration::from_millis(300)), None);
    }
}
