//! Layout region types.

use crate::processors::{Detection, Rect, Spatial};
use serde::{Deserialize, Serialize};

/// Semantic class of a layout region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutType {
    Title,
    Text,
    Table,
    Figure,
    Header,
    Footer,
    FigureCaption,
    TableCaption,
    Reference,
    Equation,
}

impl LayoutType {
    /// Order in which boxes are matched against region types. Noise regions
    /// are claimed first so that page furniture never lands in body text.
    pub const ASSIGNMENT_ORDER: [LayoutType; 10] = [
        LayoutType::Footer,
        LayoutType::Header,
        LayoutType::Reference,
        LayoutType::FigureCaption,
        LayoutType::TableCaption,
        LayoutType::Title,
        LayoutType::Table,
        LayoutType::Text,
        LayoutType::Figure,
        LayoutType::Equation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutType::Title => "title",
            LayoutType::Text => "text",
            LayoutType::Table => "table",
            LayoutType::Figure => "figure",
            LayoutType::Header => "header",
            LayoutType::Footer => "footer",
            LayoutType::FigureCaption => "figure caption",
            LayoutType::TableCaption => "table caption",
            LayoutType::Reference => "reference",
            LayoutType::Equation => "equation",
        }
    }

    /// Parses a detector label such as `"Table Caption"` or `"figure_caption"`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['_', '-'], " ");
        let kind = match normalized.as_str() {
            "title" => LayoutType::Title,
            "text" | "paragraph" => LayoutType::Text,
            "table" => LayoutType::Table,
            "figure" | "image" => LayoutType::Figure,
            "header" | "page header" => LayoutType::Header,
            "footer" | "page footer" => LayoutType::Footer,
            "figure caption" | "image caption" => LayoutType::FigureCaption,
            "table caption" => LayoutType::TableCaption,
            "reference" => LayoutType::Reference,
            "equation" | "formula" => LayoutType::Equation,
            _ => return None,
        };
        Some(kind)
    }

    /// Header, footer and reference regions hold page furniture.
    pub fn is_page_furniture(&self) -> bool {
        matches!(
            self,
            LayoutType::Header | LayoutType::Footer | LayoutType::Reference
        )
    }

    pub fn is_caption(&self) -> bool {
        matches!(self, LayoutType::FigureCaption | LayoutType::TableCaption)
    }

    /// Regions whose boxes never merge with prose.
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            LayoutType::Table | LayoutType::Figure | LayoutType::Equation
        )
    }
}

impl std::fmt::Display for LayoutType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected layout region, in document-global page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub kind: LayoutType,
    pub rect: Rect,
    pub score: f32,
    /// 1-based page number within the rendered range.
    pub page: usize,
    /// Whether any box was assigned to this region.
    #[serde(default)]
    pub visited: bool,
}

impl LayoutRegion {
    pub fn new(kind: LayoutType, rect: Rect, score: f32, page: usize) -> Self {
        Self {
            kind,
            rect,
            score,
            page,
            visited: false,
        }
    }
}

impl Spatial for LayoutRegion {
    fn rect(&self) -> &Rect {
        &self.rect
    }
}

impl Detection for LayoutRegion {
    fn kind_key(&self) -> Option<&str> {
        Some(self.kind.as_str())
    }

    fn score(&self) -> Option<f32> {
        Some(self.score)
    }
}

/// The layout assignment carried by a text box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTag {
    pub kind: LayoutType,
    /// `"{type}-{index}"`, unique per page.
    pub id: String,
    pub score: Option<f32>,
}

impl LayoutTag {
    pub fn new(kind: LayoutType, index: usize, score: Option<f32>) -> Self {
        Self {
            kind,
            id: format!("{}-{}", kind.as_str(), index),
            score,
        }
    }

    /// Tag for the `index`-th region of its type on a page.
    ///
    /// Equations are carried as figures so they leave the text flow, but keep
    /// an `equation-*` id.
    pub fn for_region(region: &LayoutRegion, index: usize) -> Self {
        let mut tag = Self::new(region.kind, index, Some(region.score));
        if region.kind == LayoutType::Equation {
            tag.kind = LayoutType::Figure;
        }
        tag
    }
}
