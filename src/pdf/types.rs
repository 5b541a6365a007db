//! Core types for PDF rendering

use std::sync::Arc;

/// Natural (scale 1.0) page dimensions in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Dimensions of the page when rendered at `scale`
    #[must_use]
    pub fn at_scale(self, scale: f32) -> Viewport {
        Viewport {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

/// Page dimensions at a given scale, in pixels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Whole-pixel raster size, never smaller than 1x1
    #[must_use]
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (self.width.ceil() as u32).max(1),
            (self.height.ceil() as u32).max(1),
        )
    }
}

/// Raw rendered page image.
///
/// RGB pixel data, 3 bytes per pixel, row-major without padding. This is the
/// hand-off format between a rasterization engine and the canvases.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    /// Raw RGB pixel data (3 bytes per pixel: R, G, B)
    pub pixels: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl Raster {
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    /// A white raster of the given size
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0xFF, 0xFF, 0xFF])
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let len = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(len * 3);
        for _ in 0..len {
            pixels.extend_from_slice(&rgb);
        }
        Self::new(width, height, pixels)
    }

    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// RGB value of the pixel at (x, y)
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels
            .get(offset..offset + 3)
            .map(|px| [px[0], px[1], px[2]])
    }

    /// Convert into an `image` buffer for encoding.
    ///
    /// Returns `None` when the pixel buffer does not match the dimensions.
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// A rasterized page as held by the page buffer.
///
/// The image is only valid for the scale it was rendered at.
#[derive(Clone)]
pub struct PageEntry {
    /// Page number (1-based)
    pub page: usize,
    /// Scale factor used for rendering
    pub scale: f32,
    /// Rendered image data
    pub raster: Raster,
    /// Unscaled page dimensions
    pub natural: PageSize,
}

impl PageEntry {
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.natural.at_scale(self.scale)
    }

    /// True if this entry was rendered for `page` at `scale`
    #[must_use]
    pub fn matches(&self, page: usize, scale: f32) -> bool {
        self.page == page && scale_key(self.scale) == scale_key(scale)
    }
}

impl std::fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageEntry")
            .field("page", &self.page)
            .field("scale", &self.scale)
            .field("width_px", &self.raster.width)
            .field("height_px", &self.raster.height)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a buffered page
pub type SharedEntry = Arc<PageEntry>;

/// Document metadata (sent on load)
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentInfo {
    pub page_count: usize,
    /// Natural size of every page, index 0 is page 1
    pub page_sizes: Vec<PageSize>,
}

impl DocumentInfo {
    /// Natural size of a 1-based page
    #[must_use]
    pub fn page_size(&self, page: usize) -> Option<PageSize> {
        page.checked_sub(1).and_then(|idx| self.page_sizes.get(idx)).copied()
    }

    #[must_use]
    pub fn first_page_width(&self) -> Option<f32> {
        self.page_sizes.first().map(|size| size.width)
    }
}

/// Scale stored as millionths for stable hashing and comparison
#[must_use]
pub fn scale_key(scale: f32) -> u32 {
    (scale * 1_000_000.0).round() as u32
}
