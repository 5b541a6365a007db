//! Render request and response types

use super::cancel::CancelToken;
use super::error::ViewerError;
use super::fetch::DocumentSource;
use super::types::{DocumentInfo, PageEntry};

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A render target that holds at most one in-flight task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The visible page in single-page mode
    Primary,
    /// Speculative neighbor render into the buffer
    Preload,
    /// A page canvas in continuous-scroll mode
    Page(usize),
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum RenderRequest {
    /// Destroy any open session, then open `source`
    Open {
        generation: u64,
        source: DocumentSource,
    },

    /// Destroy the session of `generation` if it is still open
    Close { generation: u64 },

    /// Rasterize a page
    Page {
        id: RequestId,
        generation: u64,
        page: usize,
        scale: f32,
        cancel: CancelToken,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Document metadata (sent on load)
    DocumentInfo { generation: u64, info: DocumentInfo },

    /// Opening the document failed
    LoadFailed {
        generation: u64,
        error: ViewerError,
    },

    /// Rendered page data
    Page { id: RequestId, entry: PageEntry },

    /// Request was cancelled before or while rendering
    Cancelled(RequestId),

    /// Error during rendering
    Error { id: RequestId, error: ViewerError },
}
