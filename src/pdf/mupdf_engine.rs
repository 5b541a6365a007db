//! MuPDF-backed rasterization engine

use log::debug;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::cancel::CancelToken;
use super::engine::{EngineError, PdfDocument, PdfEngine, SourceData};
use super::types::{PageSize, Raster};

const PDF_MAGIC: &str = "application/pdf";

/// Opens documents with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

impl PdfEngine for MupdfEngine {
    fn open(&self, data: SourceData<'_>) -> Result<Box<dyn PdfDocument>, EngineError> {
        let doc = match data {
            SourceData::File(path) => {
                if !path.exists() {
                    return Err(EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} does not exist", path.display()),
                    )));
                }
                Document::open(path.to_string_lossy().as_ref())?
            }
            SourceData::Bytes(bytes) => {
                if !bytes.starts_with(b"%PDF") {
                    return Err(EngineError::Unsupported);
                }
                Document::from_bytes(bytes, PDF_MAGIC)?
            }
        };

        let page_count = usize::try_from(doc.page_count()?)
            .map_err(|_| EngineError::Corrupt("negative page count".into()))?;
        debug!("MuPDF opened document with {page_count} pages");

        Ok(Box::new(MupdfDocument {
            doc: Some(doc),
            page_count,
        }))
    }
}

struct MupdfDocument {
    doc: Option<Document>,
    page_count: usize,
}

impl MupdfDocument {
    fn doc(&self) -> Result<&Document, EngineError> {
        self.doc.as_ref().ok_or(EngineError::Closed)
    }

    fn page_index(page: usize) -> Result<i32, EngineError> {
        page.checked_sub(1)
            .and_then(|idx| i32::try_from(idx).ok())
            .ok_or_else(|| EngineError::generic(format!("invalid page number {page}")))
    }
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&mut self, page: usize) -> Result<PageSize, EngineError> {
        let page = self.doc()?.load_page(Self::page_index(page)?)?;
        let bounds = page.bounds()?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn render(
        &mut self,
        page: usize,
        scale: f32,
        cancel: &CancelToken,
    ) -> Result<Raster, EngineError> {
        let loaded = self.doc()?.load_page(Self::page_index(page)?)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let rgb = Colorspace::device_rgb();
        let pixmap = loaded.to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)?;
        let pixels = pixmap_to_rgb(&pixmap)?;
        Ok(Raster::new(pixmap.width() as u32, pixmap.height() as u32, pixels))
    }

    fn close(&mut self) {
        self.doc = None;
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(EngineError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
