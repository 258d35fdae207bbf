//! Output records handed to the caller.

use super::position::{PagePosition, PositionTag, extract_positions, remove_tags};
use crate::core::errors::ProcessingStage;
use crate::processors::Rect;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// A group of text lines, each suffixed with its position tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
}

impl TextChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The text with position tags stripped.
    pub fn plain_text(&self) -> String {
        remove_tags(&self.text)
    }

    pub fn positions(&self) -> Vec<PositionTag> {
        extract_positions(&self.text)
    }
}

/// Rendered table body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "body", rename_all = "snake_case")]
pub enum TableContent {
    Html(String),
    /// One sentence per data row.
    Verbalized(Vec<String>),
}

impl TableContent {
    pub fn as_text(&self) -> String {
        match self {
            TableContent::Html(html) => html.clone(),
            TableContent::Verbalized(lines) => lines.join("\n"),
        }
    }
}

/// A reconstructed table with the crop of its region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableChunk {
    pub content: TableContent,
    pub positions: Vec<PagePosition>,
    #[serde(skip)]
    pub image: Option<RgbImage>,
}

/// A figure region with any text recognized inside it and its captions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureChunk {
    pub text: Vec<String>,
    pub positions: Vec<PagePosition>,
    #[serde(skip)]
    pub image: Option<RgbImage>,
}

/// Extracted visual element, in emission order (figures before tables).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VisualChunk {
    Figure(FigureChunk),
    Table(TableChunk),
}

impl VisualChunk {
    pub fn positions(&self) -> &[PagePosition] {
        match self {
            VisualChunk::Figure(f) => &f.positions,
            VisualChunk::Table(t) => &t.positions,
        }
    }

    pub fn image(&self) -> Option<&RgbImage> {
        match self {
            VisualChunk::Figure(f) => f.image.as_ref(),
            VisualChunk::Table(t) => t.image.as_ref(),
        }
    }

    /// Text stored alongside the crop.
    pub fn text(&self) -> String {
        match self {
            VisualChunk::Figure(f) => f.text.join("\n"),
            VisualChunk::Table(t) => t.content.as_text(),
        }
    }
}

/// Whether the pipeline ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    #[default]
    Complete,
    /// Cancellation was observed once `after` had run. When `after` is OCR,
    /// only a prefix of the pages may have been recognized.
    Cancelled { after: ProcessingStage },
}

/// Result of [`crate::reflow::ReflowEngine::parse`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflowOutput {
    pub chunks: Vec<TextChunk>,
    pub visuals: Vec<VisualChunk>,
    pub is_english: bool,
    pub completion: Completion,
}

impl ReflowOutput {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    /// All chunks joined with blank lines, tags included.
    pub fn text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableChunk> {
        self.visuals.iter().filter_map(|v| match v {
            VisualChunk::Table(t) => Some(t),
            VisualChunk::Figure(_) => None,
        })
    }

    pub fn figures(&self) -> impl Iterator<Item = &FigureChunk> {
        self.visuals.iter().filter_map(|v| match v {
            VisualChunk::Figure(f) => Some(f),
            VisualChunk::Table(_) => None,
        })
    }
}

/// One entry of [`crate::reflow::ReflowEngine::parse_into_boxes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedBox {
    pub page: usize,
    pub rect: Rect,
    pub text: String,
    /// Layout type name, empty for untagged text.
    pub layout_type: String,
    pub position_tag: String,
    pub positions: Vec<PagePosition>,
    #[serde(skip)]
    pub image: Option<RgbImage>,
}
