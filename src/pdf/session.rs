//! Document session - owns one loaded document handle

use std::sync::Arc;

use log::{debug, info, warn};

use super::cancel::CancelToken;
use super::engine::{EngineError, PdfDocument, PdfEngine, SourceData};
use super::error::ViewerError;
use super::fetch::{DocumentSource, Fetch};
use super::types::{DocumentInfo, PageEntry, PageSize, Viewport};

/// A page resolved against a live session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageHandle {
    /// Page number (1-based)
    pub page: usize,
    pub size: PageSize,
}

/// One loaded document.
///
/// A session only exists fully loaded: `open` either returns a session with a
/// valid handle and known page count, or an error and nothing else.
pub struct DocumentSession {
    source: DocumentSource,
    /// Bytes of a fetched URL source, kept so a reopen does not refetch
    fetched: Option<Arc<[u8]>>,
    engine: Arc<dyn PdfEngine>,
    handle: Option<Box<dyn PdfDocument>>,
    page_count: usize,
}

impl DocumentSession {
    /// Load `source` and open it with `engine`
    pub fn open(
        engine: Arc<dyn PdfEngine>,
        fetcher: Option<&dyn Fetch>,
        source: DocumentSource,
    ) -> Result<Self, ViewerError> {
        let fetched = match &source {
            DocumentSource::Url(url) => {
                let fetcher = fetcher
                    .ok_or_else(|| ViewerError::load(format!("no fetcher configured for {url}")))?;
                let bytes = fetcher.fetch(url).map_err(|e| ViewerError::load(e.to_string()))?;
                Some(Arc::<[u8]>::from(bytes))
            }
            DocumentSource::Path(_) | DocumentSource::Bytes(_) => None,
        };

        let mut handle = open_handle(engine.as_ref(), &source, fetched.as_deref())
            .map_err(|e| ViewerError::load(e.to_string()))?;

        let page_count = handle.page_count();
        if page_count == 0 {
            handle.close();
            return Err(ViewerError::load("document has no pages"));
        }

        info!(
            "Opened {} ({page_count} pages)",
            source.describe()
        );

        Ok(Self {
            source,
            fetched,
            engine,
            handle: Some(handle),
            page_count,
        })
    }

    #[must_use]
    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    /// Collect page count and every page's natural size
    pub fn info(&mut self) -> Result<DocumentInfo, ViewerError> {
        let mut page_sizes = Vec::with_capacity(self.page_count);
        for page in 1..=self.page_count {
            page_sizes.push(self.page(page)?.size);
        }
        Ok(DocumentInfo {
            page_count: self.page_count,
            page_sizes,
        })
    }

    /// Resolve a 1-based page
    pub fn page(&mut self, page: usize) -> Result<PageHandle, ViewerError> {
        self.check_range(page)?;
        let size = self
            .with_recovery(|doc| doc.page_size(page))
            .map_err(|e| ViewerError::render(page, e.to_string()))?;
        Ok(PageHandle { page, size })
    }

    /// Page dimensions at `scale`. No I/O.
    #[must_use]
    pub fn viewport(page: &PageHandle, scale: f32) -> Viewport {
        page.size.at_scale(scale)
    }

    /// Rasterize a 1-based page at `scale`
    pub fn render(
        &mut self,
        page: usize,
        scale: f32,
        cancel: &CancelToken,
    ) -> Result<PageEntry, ViewerError> {
        let handle = self.page(page)?;
        let raster = self
            .with_recovery(|doc| doc.render(page, scale, cancel))
            .map_err(|e| match e {
                EngineError::Cancelled => ViewerError::Cancelled,
                other => ViewerError::render(page, other.to_string()),
            })?;

        Ok(PageEntry {
            page,
            scale,
            raster,
            natural: handle.size,
        })
    }

    /// Release the document handle. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            debug!("Released {}", self.source.describe());
        }
    }

    fn check_range(&self, page: usize) -> Result<(), ViewerError> {
        if page == 0 || page > self.page_count {
            return Err(ViewerError::PageNotFound {
                page,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    /// Run `op` against the handle; on a transient failure reopen once and retry once
    fn with_recovery<T>(
        &mut self,
        mut op: impl FnMut(&mut dyn PdfDocument) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let handle = self.handle.as_deref_mut().ok_or(EngineError::Closed)?;
        match op(handle) {
            Err(err) if err.is_transient() => {
                warn!("{err}; reopening {}", self.source.describe());
                self.reopen()?;
                let handle = self.handle.as_deref_mut().ok_or(EngineError::Closed)?;
                op(handle)
            }
            other => other,
        }
    }

    fn reopen(&mut self) -> Result<(), EngineError> {
        if let Some(mut old) = self.handle.take() {
            old.close();
        }
        let handle = open_handle(self.engine.as_ref(), &self.source, self.fetched.as_deref())?;
        if handle.page_count() != self.page_count {
            warn!(
                "Page count changed on reopen: {} -> {}",
                self.page_count,
                handle.page_count()
            );
            self.page_count = handle.page_count();
        }
        self.handle = Some(handle);
        Ok(())
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn open_handle(
    engine: &dyn PdfEngine,
    source: &DocumentSource,
    fetched: Option<&[u8]>,
) -> Result<Box<dyn PdfDocument>, EngineError> {
    match (source, fetched) {
        (_, Some(bytes)) => engine.open(SourceData::Bytes(bytes)),
        (DocumentSource::Path(path), None) => engine.open(SourceData::File(path)),
        (DocumentSource::Bytes(bytes), None) => engine.open(SourceData::Bytes(bytes)),
        (DocumentSource::Url(url), None) => Err(EngineError::generic(format!(
            "{url} has not been fetched"
        ))),
    }
}
