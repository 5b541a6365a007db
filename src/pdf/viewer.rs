//! PDF viewer - ties the render pipeline together
//!
//! The viewer owns the page buffer, the scheduler, the view state and the
//! render targets. Host input (navigation, zoom, scrolling) becomes
//! `Command`s and visibility events; worker output arrives through `poll`.
//! Everything here runs on the host's thread; rasterization happens on the
//! render worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::cache::{CacheKey, PageBuffer};
use super::canvas::Canvas;
use super::engine::PdfEngine;
use super::error::ViewerError;
use super::fetch::{DocumentSource, Fetch};
use super::presenter::TransitionPresenter;
use super::request::{RenderRequest, RenderResponse, Slot};
use super::scheduler::{Completion, Dispatch, RenderScheduler};
use super::state::{Command, Effect, RenderState};
use super::types::{DocumentInfo, SharedEntry, scale_key};
use super::visibility::{PageLayout, ScrollThrottle, VisibilityEvent, VisibilityTracker};
use super::worker::RenderWorker;
use crate::settings::{ViewerMode, ViewerSettings};

/// Overall document state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerPhase {
    Unloaded,
    Loading,
    Ready,
    /// Loading failed; `retry_load` tries the same source again
    Error(ViewerError),
}

/// Per-page display state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PageState {
    #[default]
    Blank,
    /// Render queued or running
    Loading,
    Rendered,
    /// Render failed after the automatic retry
    Failed(ViewerError),
}

/// Notifications for the host
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    /// Document opened
    Loaded { page_count: usize },
    /// First page of the document is on screen
    Ready,
    /// Document failed to load
    Error(ViewerError),
    PageChanged(usize),
    ScaleChanged(f32),
    /// A page gave up after its retry
    PageFailed { page: usize, error: ViewerError },
}

pub struct PdfViewer {
    settings: ViewerSettings,
    worker: RenderWorker,
    scheduler: RenderScheduler,
    buffer: PageBuffer,
    state: RenderState,
    phase: ViewerPhase,
    source: Option<DocumentSource>,
    generation: u64,
    info: Option<DocumentInfo>,
    page_states: Vec<PageState>,
    events: Vec<ViewerEvent>,
    ready_sent: bool,

    // Continuous mode
    layout: PageLayout,
    tracker: VisibilityTracker,
    throttle: ScrollThrottle,
    canvases: Vec<Canvas>,
    scroll_top: f32,
    viewport_height: f32,

    // Single-page mode
    presenter: TransitionPresenter,
    preload_queue: VecDeque<usize>,
}

impl PdfViewer {
    /// Create a viewer for local and in-memory sources
    pub fn new(engine: Arc<dyn PdfEngine>, settings: ViewerSettings) -> Result<Self, ViewerError> {
        Self::build(engine, None, settings)
    }

    /// Create a viewer that can also open URL sources
    pub fn with_fetcher(
        engine: Arc<dyn PdfEngine>,
        fetcher: Arc<dyn Fetch>,
        settings: ViewerSettings,
    ) -> Result<Self, ViewerError> {
        Self::build(engine, Some(fetcher), settings)
    }

    fn build(
        engine: Arc<dyn PdfEngine>,
        fetcher: Option<Arc<dyn Fetch>>,
        settings: ViewerSettings,
    ) -> Result<Self, ViewerError> {
        let worker = RenderWorker::spawn(engine, fetcher)?;
        let scheduler = RenderScheduler::new(worker.sender(), settings.retry_delay());

        Ok(Self {
            worker,
            scheduler,
            buffer: PageBuffer::new(settings.buffer_capacity, settings.protect_radius),
            state: RenderState::new(settings.zoom_limits()),
            phase: ViewerPhase::Unloaded,
            source: None,
            generation: 0,
            info: None,
            page_states: Vec::new(),
            events: Vec::new(),
            ready_sent: false,
            layout: PageLayout::default(),
            tracker: VisibilityTracker::new(settings.lookahead_px, settings.clear_distance_px),
            throttle: ScrollThrottle::new(settings.scroll_throttle()),
            canvases: Vec::new(),
            scroll_top: 0.0,
            viewport_height: 0.0,
            presenter: TransitionPresenter::new(settings.transition()),
            preload_queue: VecDeque::new(),
            settings,
        })
    }

    /// Open a new document, tearing down the current one first
    pub fn open(&mut self, source: DocumentSource) {
        self.teardown();
        self.generation += 1;
        self.scheduler.set_generation(self.generation);

        info!("Loading {}", source.describe());
        self.worker.send(RenderRequest::Open {
            generation: self.generation,
            source: source.clone(),
        });
        self.source = Some(source);
        self.phase = ViewerPhase::Loading;
    }

    /// Close the current document
    pub fn close(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.teardown();
        self.worker.send(RenderRequest::Close {
            generation: self.generation,
        });
        // Anything still in flight belongs to a dead generation now
        self.generation += 1;
        self.scheduler.set_generation(self.generation);
        self.source = None;
        self.phase = ViewerPhase::Unloaded;
    }

    /// Re-attempt opening the same source after a load error.
    ///
    /// Returns false when there is no failed load to retry.
    pub fn retry_load(&mut self) -> bool {
        if !matches!(self.phase, ViewerPhase::Error(_)) {
            return false;
        }
        let Some(source) = self.source.clone() else {
            return false;
        };
        self.open(source);
        true
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.dispatch(Command::GoToPage(page));
    }

    pub fn next_page(&mut self) {
        self.dispatch(Command::NextPage);
    }

    pub fn prev_page(&mut self) {
        self.dispatch(Command::PrevPage);
    }

    pub fn zoom_in(&mut self) {
        self.dispatch(Command::ZoomIn);
    }

    pub fn zoom_out(&mut self) {
        self.dispatch(Command::ZoomOut);
    }

    pub fn set_zoom(&mut self, factor: f32) {
        self.dispatch(Command::SetZoom(factor));
    }

    pub fn reset_view(&mut self) {
        self.dispatch(Command::ResetView);
    }

    /// Scale pages so the first page fills `container_width`
    pub fn fit_to_width(&mut self, container_width: f32) {
        self.dispatch(Command::FitToWidth(container_width));
    }

    pub fn reload(&mut self) {
        self.dispatch(Command::Reload);
    }

    pub fn set_viewport_height(&mut self, height: f32) {
        self.viewport_height = height.max(0.0);
        if self.is_continuous() && self.phase == ViewerPhase::Ready {
            self.update_visibility(self.scroll_top, true);
        }
    }

    /// Report a scroll position. Work is coalesced by the scroll throttle;
    /// a trailing offset is applied by a later `poll`.
    pub fn scroll_to(&mut self, offset: f32, now: Instant) {
        if !self.is_continuous() {
            return;
        }
        if let Some(offset) = self.throttle.offer(offset, now) {
            self.update_visibility(offset, true);
        }
    }

    /// Process worker output, due retries, pending scrolls and fades.
    ///
    /// Returns the number of worker responses handled.
    pub fn poll(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while let Some(response) = self.worker.try_recv() {
            self.handle_response(response, now);
            handled += 1;
        }
        self.advance(now);
        handled
    }

    /// Block until nothing is loading, rendering, fading or waiting to
    /// retry. Returns false on timeout.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            self.poll(now);
            if self.is_idle() {
                return true;
            }
            if now >= deadline {
                return false;
            }

            let mut wait = deadline - now;
            if let Some(due) = self.next_deadline() {
                wait = wait.min(due.saturating_duration_since(now));
            }
            if let Some(response) = self.worker.recv_timeout(wait.max(Duration::from_millis(1))) {
                self.handle_response(response, Instant::now());
            }
        }
    }

    /// True when there is no outstanding work
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase != ViewerPhase::Loading
            && self.scheduler.is_idle()
            && self.presenter.is_idle()
            && !self.throttle.has_pending()
            && self.preload_queue.is_empty()
    }

    /// Drain pending notifications
    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    #[must_use]
    pub fn phase(&self) -> &ViewerPhase {
        &self.phase
    }

    #[must_use]
    pub fn mode(&self) -> ViewerMode {
        self.settings.mode
    }

    #[must_use]
    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    #[must_use]
    pub fn source(&self) -> Option<&DocumentSource> {
        self.source.as_ref()
    }

    /// Current page (1-based), 0 when nothing is loaded
    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    /// Effective render scale
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale()
    }

    #[must_use]
    pub fn zoom_factor(&self) -> f32 {
        self.state.zoom.factor()
    }

    #[must_use]
    pub fn base_scale(&self) -> f32 {
        self.state.zoom.base_scale
    }

    #[must_use]
    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.info.as_ref()
    }

    #[must_use]
    pub fn page_state(&self, page: usize) -> Option<&PageState> {
        page.checked_sub(1).and_then(|idx| self.page_states.get(idx))
    }

    /// Canvas of a page in continuous mode
    #[must_use]
    pub fn canvas(&self, page: usize) -> Option<&Canvas> {
        page.checked_sub(1).and_then(|idx| self.canvases.get(idx))
    }

    /// The visible canvas in single-page mode
    #[must_use]
    pub fn presented_canvas(&self) -> &Canvas {
        self.presenter.primary()
    }

    #[must_use]
    pub fn presenter(&self) -> &TransitionPresenter {
        &self.presenter
    }

    #[must_use]
    pub fn buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    #[must_use]
    pub fn scroll_top(&self) -> f32 {
        self.scroll_top
    }

    /// Pages overlapping the viewport in continuous mode
    #[must_use]
    pub fn visible_pages(&self) -> Vec<usize> {
        self.tracker.visible_pages().collect()
    }

    fn is_continuous(&self) -> bool {
        self.settings.mode == ViewerMode::Continuous
    }

    /// Cancel work and drop everything tied to the current document
    fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.buffer.clear();
        self.buffer.set_displayed(std::iter::empty());
        self.presenter.reset();
        self.preload_queue.clear();
        self.tracker.reset();
        self.throttle.reset();
        self.canvases.clear();
        self.page_states.clear();
        self.layout = PageLayout::default();
        self.info = None;
        self.scroll_top = 0.0;
        self.ready_sent = false;
        let _ = self.state.apply(Command::Unload);
    }

    fn dispatch(&mut self, command: Command) {
        let page_before = self.state.current_page;
        let scale_before = scale_key(self.state.scale());

        let effects = self.state.apply(command);

        if scale_key(self.state.scale()) != scale_before {
            self.events.push(ViewerEvent::ScaleChanged(self.state.scale()));
        }
        if self.state.current_page != page_before && self.state.current_page > 0 {
            self.events
                .push(ViewerEvent::PageChanged(self.state.current_page));
        }
        self.run_effects(effects);
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::InvalidateCache => self.invalidate(),
                Effect::RenderVisible => self.render_visible(),
                Effect::ShowPage(page) => self.show_page(page),
                Effect::ReloadDocument => {
                    if let Some(source) = self.source.clone() {
                        self.open(source);
                    }
                }
            }
        }
    }

    /// Scale changed: nothing rendered so far is valid. Canvases keep their
    /// old pixels until redrawn but every page needs a new render.
    fn invalidate(&mut self) {
        self.scheduler.cancel_all();
        self.buffer.clear();
        self.preload_queue.clear();
        self.page_states.fill(PageState::Blank);
    }

    fn render_visible(&mut self) {
        if self.phase != ViewerPhase::Ready {
            return;
        }
        let page = self.state.current_page;
        let scale = self.state.scale();
        self.buffer.set_focus(page, scale);

        if self.is_continuous() {
            self.relayout();
            let top = self.layout.top(page).unwrap_or(0.0);
            self.update_visibility(top, false);
        } else {
            self.show_page(page);
        }
    }

    fn relayout(&mut self) {
        let sizes = self
            .info
            .as_ref()
            .map(|info| info.page_sizes.as_slice())
            .unwrap_or_default();
        self.layout = PageLayout::new(sizes, self.state.scale(), self.settings.page_gap_px);
        self.tracker.relayout();
    }

    fn show_page(&mut self, page: usize) {
        if self.phase != ViewerPhase::Ready {
            return;
        }
        let scale = self.state.scale();
        self.buffer.set_focus(page, scale);

        if self.is_continuous() {
            let top = self.layout.top(page).unwrap_or(0.0);
            self.update_visibility(top, false);
            return;
        }

        if !self.presenter.show_page(page, scale) {
            return;
        }
        self.scheduler.cancel(Slot::Preload);
        self.preload_queue.clear();

        match self
            .scheduler
            .request_render(page, scale, Slot::Primary, &mut self.buffer)
        {
            Dispatch::Cached(entry) => self.present(entry, Instant::now()),
            Dispatch::Queued(_) => self.set_page_state(page, PageState::Loading),
        }
        self.sync_displayed();
    }

    fn present(&mut self, entry: SharedEntry, now: Instant) {
        let page = entry.page;
        if self.presenter.frame_ready(entry, now) {
            self.set_page_state(page, PageState::Rendered);
            if let Some(committed) = self.presenter.tick(now) {
                self.on_committed(committed);
            }
        }
    }

    /// A frame reached the primary canvas
    fn on_committed(&mut self, page: usize) {
        debug!("Presented page {page}");
        self.mark_ready();
        self.sync_displayed();

        let count = self.state.page_count;
        self.preload_queue = [page + 1, page.saturating_sub(1)]
            .into_iter()
            .filter(|p| (1..=count).contains(p))
            .collect();
        self.start_next_preload();
    }

    fn start_next_preload(&mut self) {
        let scale = self.state.scale();
        while let Some(page) = self.preload_queue.pop_front() {
            if self.buffer.contains(page, scale) {
                continue;
            }
            if let Dispatch::Queued(_) =
                self.scheduler
                    .request_render(page, scale, Slot::Preload, &mut self.buffer)
            {
                return;
            }
        }
    }

    /// Move the viewport and react to pages entering and leaving it.
    ///
    /// `follow` lets the most visible page become the current page; explicit
    /// navigation keeps the page it asked for.
    fn update_visibility(&mut self, offset: f32, follow: bool) {
        let max_top = (self.layout.total_height() - self.viewport_height).max(0.0);
        self.scroll_top = offset.clamp(0.0, max_top);

        let events = self
            .tracker
            .update(&self.layout, self.scroll_top, self.viewport_height);
        let scale = self.state.scale();

        for event in events {
            match event {
                VisibilityEvent::Entered(page) => self.page_entered(page, scale),
                VisibilityEvent::Left { page, distance } => {
                    debug!("Page {page} left view ({distance:.0}px)");
                    if self.scheduler.cancel(Slot::Page(page))
                        && self.page_state(page) == Some(&PageState::Loading)
                    {
                        self.set_page_state(page, PageState::Blank);
                    }
                }
                VisibilityEvent::Clear(page) => {
                    if let Some(canvas) = page.checked_sub(1).and_then(|i| self.canvases.get_mut(i)) {
                        canvas.clear();
                    }
                    if self.page_state(page) == Some(&PageState::Rendered) {
                        self.set_page_state(page, PageState::Blank);
                    }
                }
            }
        }

        if follow {
            let current = self.tracker.current_page();
            if current != self.state.current_page && self.state.page_count > 0 {
                self.state.set_current_page_no_render(current);
                self.events.push(ViewerEvent::PageChanged(current));
            }
        }
        self.buffer.set_focus(self.state.current_page, scale);
        self.sync_displayed();
    }

    fn page_entered(&mut self, page: usize, scale: f32) {
        if page == 0 || page > self.state.page_count {
            return;
        }
        if self.canvas(page).is_some_and(|c| c.shows(page, scale)) {
            return;
        }
        match self
            .scheduler
            .request_render(page, scale, Slot::Page(page), &mut self.buffer)
        {
            Dispatch::Cached(entry) => self.draw_page(entry),
            Dispatch::Queued(_) => self.set_page_state(page, PageState::Loading),
        }
    }

    fn draw_page(&mut self, entry: SharedEntry) {
        let page = entry.page;
        let Some(canvas) = page.checked_sub(1).and_then(|i| self.canvases.get_mut(i)) else {
            return;
        };
        canvas.draw(entry);
        self.set_page_state(page, PageState::Rendered);
        self.mark_ready();
        self.sync_displayed();
    }

    fn handle_response(&mut self, response: RenderResponse, now: Instant) {
        match response {
            RenderResponse::DocumentInfo { generation, info } => {
                if generation != self.generation {
                    debug!("Ignoring document info for generation {generation}");
                    return;
                }
                self.document_loaded(info);
            }
            RenderResponse::LoadFailed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                warn!("Failed to load document: {error}");
                self.phase = ViewerPhase::Error(error.clone());
                self.events.push(ViewerEvent::Error(error));
            }
            other => {
                if let Some(completion) =
                    self.scheduler
                        .handle_response(other, &mut self.buffer, now)
                {
                    self.complete(completion, now);
                }
            }
        }
    }

    fn document_loaded(&mut self, info: DocumentInfo) {
        let page_count = info.page_count;
        info!("Document ready: {page_count} pages");

        self.buffer.set_page_count(page_count);
        self.page_states = vec![PageState::Blank; page_count];
        self.canvases = vec![Canvas::new(); page_count];
        let native_width = info.first_page_width().unwrap_or_default();
        self.info = Some(info);
        self.phase = ViewerPhase::Ready;
        self.events.push(ViewerEvent::Loaded { page_count });

        let scale_before = scale_key(self.state.scale());
        let effects = self.state.apply(Command::SetDocument {
            page_count,
            native_width,
        });
        if scale_key(self.state.scale()) != scale_before {
            self.events.push(ViewerEvent::ScaleChanged(self.state.scale()));
        }
        self.events
            .push(ViewerEvent::PageChanged(self.state.current_page));
        self.run_effects(effects);
    }

    fn complete(&mut self, completion: Completion, now: Instant) {
        match completion {
            Completion::Rendered { slot, entry } => match slot {
                Slot::Primary => self.present(entry, now),
                Slot::Page(_) => {
                    if entry.matches(entry.page, self.state.scale())
                        && self.tracker.is_near(entry.page)
                    {
                        self.draw_page(entry);
                    }
                }
                Slot::Preload => self.start_next_preload(),
            },
            // Nobody is looking at a preload; the page renders again when shown
            Completion::Failed {
                slot: Slot::Preload,
                page,
                error,
                ..
            } => {
                debug!("Preload of page {page} failed: {error}");
                self.start_next_preload();
            }
            Completion::Failed {
                slot, page, error, ..
            } => {
                self.set_page_state(page, PageState::Failed(error.clone()));
                self.events.push(ViewerEvent::PageFailed { page, error });
                if slot == Slot::Primary {
                    self.presenter.render_failed(page);
                }
            }
        }
    }

    fn advance(&mut self, now: Instant) {
        if let Some(offset) = self.throttle.flush(now) {
            self.update_visibility(offset, true);
        }

        for completion in self.scheduler.tick(now, &mut self.buffer) {
            self.complete(completion, now);
        }

        if let Some(page) = self.presenter.tick(now) {
            self.on_committed(page);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.scheduler.next_retry_due(),
            self.throttle.deadline(),
            self.presenter.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn mark_ready(&mut self) {
        if !self.ready_sent {
            self.ready_sent = true;
            self.events.push(ViewerEvent::Ready);
        }
    }

    fn set_page_state(&mut self, page: usize, state: PageState) {
        if let Some(slot) = page.checked_sub(1).and_then(|i| self.page_states.get_mut(i)) {
            *slot = state;
        }
    }

    /// Tell the buffer which entries are on screen.
    ///
    /// In continuous mode that is every page overlapping the viewport, both
    /// what its canvas holds and the current-scale render it is waiting for.
    fn sync_displayed(&mut self) {
        if self.is_continuous() {
            let scale = self.state.scale();
            let keys: Vec<_> = self
                .tracker
                .visible_pages()
                .flat_map(|page| {
                    let drawn = self.canvas(page).and_then(Canvas::key);
                    drawn.into_iter().chain([CacheKey::new(page, scale)])
                })
                .collect();
            self.buffer.set_displayed(keys);
        } else {
            self.buffer.set_displayed(self.presenter.displayed_keys());
        }
    }
}

impl Drop for PdfViewer {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
        self.worker.shutdown();
    }
}
