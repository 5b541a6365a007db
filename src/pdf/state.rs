//! Viewport state management
//!
//! Zoom, fit-to-width and page navigation are pure state transitions that
//! return the effects the viewer has to carry out.

use super::types::scale_key;
use super::zoom::{Zoom, ZoomLimits};

/// Current view state for a PDF document
#[derive(Clone, Debug)]
pub struct RenderState {
    pub zoom: Zoom,

    /// Current page (1-based), 0 while no document is loaded
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// Unscaled width of the first page, once known
    pub native_width: Option<f32>,

    /// Last container width passed to fit-to-width
    pub container_width: Option<f32>,
}

impl RenderState {
    #[must_use]
    pub fn new(limits: ZoomLimits) -> Self {
        Self {
            zoom: Zoom::new(limits),
            current_page: 0,
            page_count: 0,
            native_width: None,
            container_width: None,
        }
    }

    /// Scale pages are rendered at
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.zoom.effective_scale()
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Reload => {
                vec![Effect::InvalidateCache, Effect::ReloadDocument]
            }

            Command::SetDocument {
                page_count,
                native_width,
            } => {
                self.page_count = page_count;
                self.native_width = Some(native_width);
                self.current_page = self.current_page.clamp(1, page_count.max(1));
                if let Some(container) = self.container_width {
                    self.zoom.fit_to_width(container, native_width);
                }
                vec![Effect::RenderVisible]
            }

            Command::Unload => {
                self.page_count = 0;
                self.current_page = 0;
                self.native_width = None;
                vec![Effect::InvalidateCache]
            }

            Command::ZoomIn => self.rescale(Zoom::step_in),

            Command::ZoomOut => self.rescale(Zoom::step_out),

            Command::SetZoom(factor) => self.rescale(|z| z.set_factor(factor)),

            Command::ResetView => self.rescale(Zoom::reset),

            Command::FitToWidth(container_width) => {
                self.container_width = Some(container_width);
                match self.native_width {
                    Some(native) => self.rescale(|z| z.fit_to_width(container_width, native)),
                    // Applied once the document reports its page width
                    None => vec![],
                }
            }

            Command::GoToPage(page) => self.go_to(page),

            Command::NextPage => self.go_to(self.current_page.saturating_add(1)),

            Command::PrevPage => self.go_to(self.current_page.saturating_sub(1)),
        }
    }

    fn go_to(&mut self, page: usize) -> Vec<Effect> {
        if self.page_count == 0 {
            return vec![];
        }
        let clamped = page.clamp(1, self.page_count);
        if self.current_page != clamped {
            self.current_page = clamped;
            vec![Effect::ShowPage(clamped)]
        } else {
            vec![]
        }
    }

    fn rescale(&mut self, f: impl FnOnce(&mut Zoom)) -> Vec<Effect> {
        let before = scale_key(self.scale());
        f(&mut self.zoom);
        if scale_key(self.scale()) != before {
            vec![Effect::InvalidateCache, Effect::RenderVisible]
        } else {
            vec![]
        }
    }

    /// Set the current page without triggering any render effects.
    /// Used when scrolling moves the current page.
    pub fn set_current_page_no_render(&mut self, page: usize) {
        if self.page_count > 0 {
            self.current_page = page.clamp(1, self.page_count);
        }
    }
}

/// Commands that modify view state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Reload the document from the same source
    Reload,
    /// A document finished loading
    SetDocument { page_count: usize, native_width: f32 },
    /// The document was closed
    Unload,
    ZoomIn,
    ZoomOut,
    SetZoom(f32),
    /// Zoom back to 100% of the fit-to-width base
    ResetView,
    /// Fit the first page into a container of this width
    FitToWidth(f32),
    /// Go to a specific page (1-based)
    GoToPage(usize),
    NextPage,
    PrevPage,
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Invalidate the entire page buffer
    InvalidateCache,
    /// Re-render whatever is on screen at the current scale
    RenderVisible,
    /// Bring a page into view
    ShowPage(usize),
    /// Reopen the document
    ReloadDocument,
}
