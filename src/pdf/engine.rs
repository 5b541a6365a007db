//! Rasterization engine boundary
//!
//! The viewer never decodes PDF data itself. A `PdfEngine` opens documents
//! and hands back `PdfDocument` handles that report page geometry and
//! rasterize single pages. Page numbers at this boundary are 1-based.

use std::path::Path;

use super::cancel::CancelToken;
use super::types::{PageSize, Raster};

/// Document bytes or location as handed to an engine
#[derive(Clone, Copy, Debug)]
pub enum SourceData<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

/// Errors from rasterization engines
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported document format")]
    Unsupported,

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Internal hiccup worth one reopen-and-retry
    #[error("transient engine failure: {0}")]
    Transient(String),

    #[error("rasterization cancelled")]
    Cancelled,

    #[error("document handle already released")]
    Closed,

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Opens documents. Shared with the render worker thread.
pub trait PdfEngine: Send + Sync {
    /// Open a document. Must not return a half-initialized handle.
    fn open(&self, data: SourceData<'_>) -> Result<Box<dyn PdfDocument>, EngineError>;
}

/// A loaded document handle.
///
/// Handles live on the render worker thread only, so they need not be `Send`.
pub trait PdfDocument {
    fn page_count(&self) -> usize;

    /// Natural size of a 1-based page
    fn page_size(&mut self, page: usize) -> Result<PageSize, EngineError>;

    /// Rasterize a 1-based page at `scale`.
    ///
    /// Implementations may return `EngineError::Cancelled` early once
    /// `cancel` fires; ignoring it is allowed.
    fn render(
        &mut self,
        page: usize,
        scale: f32,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError>;

    /// Release native resources. Called at most once per handle.
    fn close(&mut self) {}
}
