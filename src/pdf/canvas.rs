//! Render targets

use super::cache::CacheKey;
use super::types::{PageEntry, SharedEntry};

/// A drawable surface holding at most one complete page image.
///
/// Drawing replaces the content as a whole, so a canvas never shows a
/// partially written frame.
#[derive(Clone, Debug)]
pub struct Canvas {
    content: Option<SharedEntry>,
    width: u32,
    height: u32,
    opacity: f32,
    writes: u64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    #[must_use]
    pub fn new() -> Self {
        Self {
            content: None,
            width: 0,
            height: 0,
            opacity: 1.0,
            writes: 0,
        }
    }

    pub fn draw(&mut self, entry: SharedEntry) {
        self.width = entry.raster.width;
        self.height = entry.raster.height;
        self.content = Some(entry);
        self.writes += 1;
    }

    /// Copy another canvas's pixels and dimensions onto this one
    pub fn copy_from(&mut self, other: &Canvas) {
        match &other.content {
            Some(entry) => self.draw(entry.clone()),
            None => self.clear(),
        }
    }

    /// Discard pixels and reset dimensions
    pub fn clear(&mut self) {
        self.content = None;
        self.width = 0;
        self.height = 0;
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    #[must_use]
    pub fn content(&self) -> Option<&PageEntry> {
        self.content.as_deref()
    }

    #[must_use]
    pub fn page(&self) -> Option<usize> {
        self.content.as_ref().map(|entry| entry.page)
    }

    #[must_use]
    pub fn scale(&self) -> Option<f32> {
        self.content.as_ref().map(|entry| entry.scale)
    }

    /// True if the canvas holds `page` rendered at `scale`
    #[must_use]
    pub fn shows(&self, page: usize, scale: f32) -> bool {
        self.content
            .as_ref()
            .is_some_and(|entry| entry.matches(page, scale))
    }

    #[must_use]
    pub fn key(&self) -> Option<CacheKey> {
        self.content.as_deref().map(CacheKey::for_entry)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.is_none()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.content.as_ref()?.raster.pixel(x, y)
    }

    /// Number of frames drawn onto this canvas
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes
    }
}
