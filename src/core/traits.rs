//! Model adapter interfaces.
//!
//! The engine never runs a model itself. Rendering, OCR, layout detection,
//! table-structure detection and merge scoring are delegated to the adapters
//! defined here. Every call is treated as blocking and fallible; failures are
//! wrapped into [`ReflowError::ModelAdapter`](crate::core::ReflowError) by the
//! engine and abort the document.

use crate::core::errors::{ReflowError, ReflowResult};
use crate::processors::Rect;
use crate::reflow::ConcatFeatures;
use image::RgbImage;
use std::fmt::Debug;

/// Error type returned by adapters.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by adapters.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// A document handed to the engine.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Raw PDF bytes.
    Pdf(Vec<u8>),
    /// One encoded page image (PNG, JPEG).
    Image(Vec<u8>),
    /// Pages already rendered by the caller.
    Pages(Vec<RgbImage>),
}

impl DocumentSource {
    /// Classifies raw bytes by their magic number.
    pub fn from_bytes(bytes: Vec<u8>) -> ReflowResult<Self> {
        if bytes.starts_with(b"%PDF") {
            return Ok(Self::Pdf(bytes));
        }
        match image::guess_format(&bytes) {
            Ok(image::ImageFormat::Png | image::ImageFormat::Jpeg) => Ok(Self::Image(bytes)),
            Ok(other) => Err(ReflowError::unsupported_input(format!(
                "image format {other:?} has no decoder"
            ))),
            Err(_) => Err(ReflowError::unsupported_input(
                "input is neither a PDF nor a recognized image",
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocumentSource::Pdf(_) => "pdf",
            DocumentSource::Image(_) => "image",
            DocumentSource::Pages(_) => "pages",
        }
    }
}

/// Renders document pages.
pub trait Rasterizer: Debug + Send + Sync {
    /// Renders pages `page_from..page_to` (0-based, end exclusive, clamped to
    /// the document) at `zoom` times 72 dpi.
    fn rasterize(
        &self,
        source: &DocumentSource,
        zoom: f32,
        page_from: usize,
        page_to: usize,
    ) -> AdapterResult<Vec<RgbImage>>;
}

/// A recognized text line in page pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub rect: Rect,
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub score: f32,
}

impl OcrLine {
    pub fn new(rect: Rect, text: impl Into<String>, score: f32) -> Self {
        Self {
            rect,
            text: text.into(),
            score,
        }
    }
}

/// OCR output for one page.
///
/// `chars` holds native character boxes (for example from a PDF text layer)
/// when available; they refine the recognized line text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrPage {
    pub lines: Vec<OcrLine>,
    pub chars: Vec<OcrLine>,
}

/// Recognizes text on a rendered page.
pub trait TextRecognizer: Debug + Send + Sync {
    /// `page_index` is 0-based within the rendered range.
    fn ocr(&self, page_index: usize, image: &RgbImage) -> AdapterResult<OcrPage>;

    /// Recognizes text on a table crop, already turned by `crop.rotation`.
    /// Coordinates are crop pixels.
    fn ocr_table(&self, crop: &TableCrop) -> AdapterResult<OcrPage> {
        self.ocr(crop.page_index, &crop.image)
    }
}

/// A labelled rectangle produced by a detector, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDetection {
    pub label: String,
    pub rect: Rect,
    pub score: f32,
}

impl RegionDetection {
    pub fn new(label: impl Into<String>, rect: Rect, score: f32) -> Self {
        Self {
            label: label.into(),
            rect,
            score,
        }
    }
}

/// Detects layout regions on rendered pages.
pub trait LayoutDetector: Debug + Send + Sync {
    /// Returns one detection list per input page, in order.
    fn detect_layout(&self, pages: &[RgbImage]) -> AdapterResult<Vec<Vec<RegionDetection>>>;
}

/// Clockwise quarter turns applied to a table crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum TableRotation {
    #[default]
    Upright,
    Cw90,
    Cw180,
    Cw270,
}

impl TableRotation {
    /// Every orientation, upright first.
    pub const ALL: [TableRotation; 4] = [
        TableRotation::Upright,
        TableRotation::Cw90,
        TableRotation::Cw180,
        TableRotation::Cw270,
    ];

    pub fn degrees(self) -> u16 {
        match self {
            TableRotation::Upright => 0,
            TableRotation::Cw90 => 90,
            TableRotation::Cw180 => 180,
            TableRotation::Cw270 => 270,
        }
    }

    pub fn from_degrees(degrees: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.degrees() == degrees % 360)
    }

    /// Turns `image` clockwise by this rotation.
    pub fn apply(self, image: &RgbImage) -> RgbImage {
        match self {
            TableRotation::Upright => image.clone(),
            TableRotation::Cw90 => image::imageops::rotate90(image),
            TableRotation::Cw180 => image::imageops::rotate180(image),
            TableRotation::Cw270 => image::imageops::rotate270(image),
        }
    }
}

/// A cropped table region submitted for structure detection.
#[derive(Debug, Clone)]
pub struct TableCrop {
    /// 0-based page index within the rendered range.
    pub page_index: usize,
    /// Position of the table among the tables of its page.
    pub table_index: usize,
    /// Turn already applied to `image`.
    pub rotation: TableRotation,
    pub image: RgbImage,
}

/// Detects rows, columns, headers and spanning cells inside table crops.
pub trait TableStructureDetector: Debug + Send + Sync {
    /// Returns one band list per crop, in crop pixel coordinates.
    fn detect_table_structure(&self, crops: &[TableCrop])
    -> AdapterResult<Vec<Vec<RegionDetection>>>;
}

/// Scores whether the lower box of a pair continues the upper one.
pub trait ConcatenationScorer: Send + Sync {
    /// Returns a probability in `[0, 1]`; above the configured threshold the
    /// pair is merged.
    fn score(&self, features: &ConcatFeatures) -> AdapterResult<f32>;
}

impl<F> ConcatenationScorer for F
where
    F: Fn(&ConcatFeatures) -> f32 + Send + Sync,
{
    fn score(&self, features: &ConcatFeatures) -> AdapterResult<f32> {
        Ok(self(features))
    }
}
