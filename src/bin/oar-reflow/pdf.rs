//! PDF rasterization through PDFium.

use image::RgbImage;
use oar_reflow::core::{AdapterResult, DocumentSource, Rasterizer};
use pdfium_render::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Failed to initialize PDFium: {0}")]
    InitError(String),

    #[error("Failed to load PDF: {0}")]
    LoadError(String),

    #[error("Failed to render page {page}: {message}")]
    RenderError { page: usize, message: String },

    #[error("Expected PDF input, got {0}")]
    NotPdf(&'static str),
}

/// Directories searched for the PDFium shared library before the system path.
const LIBRARY_DIRS: &[&str] = &["./", "/usr/lib", "/usr/local/lib", "/opt/homebrew/lib"];

/// Renders PDF pages at `zoom` times 72 dpi.
///
/// PDFium is bound on every call, so the rasterizer itself is freely shared
/// between threads.
#[derive(Debug, Clone, Default)]
pub struct PdfRasterizer {
    /// Searched before [`LIBRARY_DIRS`].
    library_dir: Option<PathBuf>,
}

impl PdfRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, PdfError> {
        let mut dirs: Vec<PathBuf> = self.library_dir.iter().cloned().collect();
        dirs.extend(LIBRARY_DIRS.iter().map(PathBuf::from));
        for dir in &dirs {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
        }
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| PdfError::InitError(format!("Could not find PDFium library: {}", e)))
    }

    fn render(&self, bytes: &[u8], zoom: f32, page_from: usize, page_to: usize) -> Result<Vec<RgbImage>, PdfError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::LoadError(e.to_string()))?;

        let mut images = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            if index < page_from {
                continue;
            }
            if index >= page_to {
                break;
            }
            let width_px = (page.width().value * zoom).round() as i32;
            let height_px = (page.height().value * zoom).round() as i32;
            let render_config = PdfRenderConfig::new()
                .set_target_width(width_px)
                .set_target_height(height_px)
                .render_form_data(true)
                .render_annotations(true);
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| PdfError::RenderError {
                    page: index + 1,
                    message: e.to_string(),
                })?;
            images.push(bitmap.as_image().to_rgb8());
        }
        tracing::debug!(target: "pdf", pages = images.len(), page_from, "pdf rendered");
        Ok(images)
    }
}

impl Rasterizer for PdfRasterizer {
    fn rasterize(
        &self,
        source: &DocumentSource,
        zoom: f32,
        page_from: usize,
        page_to: usize,
    ) -> AdapterResult<Vec<RgbImage>> {
        let DocumentSource::Pdf(bytes) = source else {
            return Err(PdfError::NotPdf(source.kind()).into());
        };
        Ok(self.render(bytes, zoom, page_from, page_to)?)
    }
}
