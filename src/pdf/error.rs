//! Viewer error taxonomy

/// Errors surfaced by the viewer core
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ViewerError {
    /// Document fetch or decode failed. Needs a manual retry.
    #[error("failed to load document: {reason}")]
    Load { reason: String },

    /// Requested page is outside `[1, page_count]`
    #[error("page {page} not found (document has {page_count} pages)")]
    PageNotFound { page: usize, page_count: usize },

    /// Rasterization failed for a reason other than cancellation
    #[error("failed to render page {page}: {reason}")]
    Render { page: usize, reason: String },

    /// Superseded by a newer request; never shown to the user
    #[error("render cancelled")]
    Cancelled,

    /// The render worker thread could not be started or has gone away
    #[error("render worker unavailable: {reason}")]
    Worker { reason: String },
}

impl ViewerError {
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    pub fn render(page: usize, reason: impl Into<String>) -> Self {
        Self::Render {
            page,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
