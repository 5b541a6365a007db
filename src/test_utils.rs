//! Scriptable stand-ins for the rasterization engine and fetcher.
//!
//! `FakeEngine` hands out documents whose pages are flat colour fills, one
//! colour per page, and lets tests inject open failures, render failures,
//! transient errors and blocked renders.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::pdf::{
    CancelToken, DocumentSource, EngineError, Fetch, PageSize, PdfDocument, PdfEngine, Raster,
    SourceData,
};

/// Natural size of every fake page unless configured otherwise
pub const FAKE_PAGE_SIZE: PageSize = PageSize::new(200.0, 300.0);

/// Fill colour of a fake page
#[must_use]
pub fn page_color(page: usize) -> [u8; 3] {
    let tag = (page % 251) as u8;
    [tag, 0x80, 0xFF - tag]
}

#[derive(Default)]
struct FakeState {
    page_sizes: Vec<PageSize>,
    open_failures: usize,
    render_failures: HashMap<usize, usize>,
    transient_failures: HashMap<usize, usize>,
    dropped_renders: HashMap<usize, usize>,
    ignore_cancellation: bool,
    held: bool,
    open_count: usize,
    close_count: usize,
    render_count: usize,
    renders_started: usize,
    active_renders: usize,
    max_active_renders: usize,
    lifecycle: Vec<&'static str>,
    opened: Vec<String>,
    rendered: Vec<(usize, f32)>,
}

struct Shared {
    state: Mutex<FakeState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory `PdfEngine` for tests
#[derive(Clone)]
pub struct FakeEngine {
    shared: Arc<Shared>,
}

impl FakeEngine {
    pub fn with_pages(count: usize) -> Self {
        Self::with_sizes(vec![FAKE_PAGE_SIZE; count])
    }

    pub fn with_sizes(page_sizes: Vec<PageSize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(FakeState {
                    page_sizes,
                    ..FakeState::default()
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// A source this engine will accept
    pub fn source(&self) -> DocumentSource {
        DocumentSource::Path(PathBuf::from("fake.pdf"))
    }

    /// Fail the next `count` opens as corrupt documents
    pub fn fail_next_opens(&self, count: usize) {
        self.shared.lock().open_failures = count;
    }

    /// Fail the next `count` renders of `page`
    pub fn fail_renders(&self, page: usize, count: usize) {
        self.shared.lock().render_failures.insert(page, count);
    }

    /// Fail the next `count` renders of `page` with a transient error
    pub fn fail_transient(&self, page: usize, count: usize) {
        self.shared.lock().transient_failures.insert(page, count);
    }

    /// Abandon the next `count` renders of `page` with `EngineError::Cancelled`
    /// although nobody cancelled them
    pub fn drop_renders(&self, page: usize, count: usize) {
        self.shared.lock().dropped_renders.insert(page, count);
    }

    /// Render to completion even after cancellation, like an engine
    /// without mid-flight cancellation
    pub fn ignore_cancellation(&self) {
        self.shared.lock().ignore_cancellation = true;
    }

    /// Block renders until `release_renders`
    pub fn hold_renders(&self) {
        self.shared.lock().held = true;
    }

    pub fn release_renders(&self) {
        self.shared.lock().held = false;
        self.shared.changed.notify_all();
    }

    /// Wait until at least `count` renders have started
    pub fn wait_for_renders_started(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.renders_started < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn open_count(&self) -> usize {
        self.shared.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.shared.lock().close_count
    }

    /// Completed rasterizations
    pub fn render_count(&self) -> usize {
        self.shared.lock().render_count
    }

    /// Most renders ever running at the same time
    pub fn max_active_renders(&self) -> usize {
        self.shared.lock().max_active_renders
    }

    /// Ordered "open" / "close" calls
    pub fn lifecycle_log(&self) -> Vec<&'static str> {
        self.shared.lock().lifecycle.clone()
    }

    /// Description of every source passed to `open`
    pub fn opened_sources(&self) -> Vec<String> {
        self.shared.lock().opened.clone()
    }

    /// `(page, scale)` of every completed render
    pub fn rendered(&self) -> Vec<(usize, f32)> {
        self.shared.lock().rendered.clone()
    }
}

impl PdfEngine for FakeEngine {
    fn open(&self, data: SourceData<'_>) -> Result<Box<dyn PdfDocument>, EngineError> {
        let mut state = self.shared.lock();
        state.opened.push(match data {
            SourceData::File(path) => path.display().to_string(),
            SourceData::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        });

        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(EngineError::Corrupt("scripted open failure".into()));
        }

        state.open_count += 1;
        state.lifecycle.push("open");
        Ok(Box::new(FakeDocument {
            shared: self.shared.clone(),
            page_sizes: state.page_sizes.clone(),
        }))
    }
}

struct FakeDocument {
    shared: Arc<Shared>,
    page_sizes: Vec<PageSize>,
}

impl FakeDocument {
    fn size(&self, page: usize) -> Result<PageSize, EngineError> {
        page.checked_sub(1)
            .and_then(|idx| self.page_sizes.get(idx))
            .copied()
            .ok_or_else(|| EngineError::generic(format!("no page {page}")))
    }
}

impl PdfDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&mut self, page: usize) -> Result<PageSize, EngineError> {
        self.size(page)
    }

    fn render(
        &mut self,
        page: usize,
        scale: f32,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError> {
        let size = self.size(page)?;

        let mut state = self.shared.lock();
        state.renders_started += 1;
        state.active_renders += 1;
        state.max_active_renders = state.max_active_renders.max(state.active_renders);
        self.shared.changed.notify_all();

        while state.held {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.active_renders -= 1;

        if cancel.is_cancelled() && !state.ignore_cancellation {
            return Err(EngineError::Cancelled);
        }
        if let Some(left) = state.dropped_renders.get_mut(&page).filter(|n| **n > 0) {
            *left -= 1;
            return Err(EngineError::Cancelled);
        }
        if let Some(left) = state.transient_failures.get_mut(&page).filter(|n| **n > 0) {
            *left -= 1;
            return Err(EngineError::Transient(format!("page {page} hiccup")));
        }
        if let Some(left) = state.render_failures.get_mut(&page).filter(|n| **n > 0) {
            *left -= 1;
            return Err(EngineError::generic(format!("scripted failure on page {page}")));
        }

        state.render_count += 1;
        state.rendered.push((page, scale));
        let (width, height) = size.at_scale(scale).pixel_size();
        Ok(Raster::filled(width, height, page_color(page)))
    }

    fn close(&mut self) {
        let mut state = self.shared.lock();
        state.close_count += 1;
        state.lifecycle.push("close");
    }
}

/// In-memory `Fetch` serving canned responses
#[derive(Clone, Default)]
pub struct FakeFetcher {
    responses: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fetches: Arc<Mutex<usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: Vec<u8>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), body);
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        *self.fetches.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
            .ok_or_else(|| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{url}: 404"),
                ))
            })
    }
}
