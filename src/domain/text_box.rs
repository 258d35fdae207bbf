//! The text box flowing through every pipeline stage.

use super::layout::{LayoutTag, LayoutType};
use super::table::TableRole;
use crate::processors::{Rect, Spatial};
use serde::{Deserialize, Serialize};

/// A recognized text fragment.
///
/// Coordinates are document-global page units: the vertical axis of page `n`
/// is offset by the summed heights of pages `1..n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    /// 1-based page number within the rendered range.
    pub page: usize,
    pub rect: Rect,
    pub text: String,
    #[serde(default)]
    pub layout: Option<LayoutTag>,
    #[serde(default)]
    pub table: TableRole,
    /// Boxes sharing this box's visual row, set during concatenation.
    #[serde(default)]
    pub in_row: usize,
    /// Text column of the page, counted from the left.
    #[serde(default)]
    pub page_column: usize,
}

impl TextBox {
    pub fn new(page: usize, rect: Rect, text: impl Into<String>) -> Self {
        Self {
            page,
            rect,
            text: text.into(),
            layout: None,
            table: TableRole::default(),
            in_row: 0,
            page_column: 0,
        }
    }

    pub fn with_layout(mut self, layout: LayoutTag) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn layout_kind(&self) -> Option<LayoutType> {
        self.layout.as_ref().map(|l| l.kind)
    }

    pub fn layout_id(&self) -> Option<&str> {
        self.layout.as_ref().map(|l| l.id.as_str())
    }

    pub fn is_layout(&self, kind: LayoutType) -> bool {
        self.layout_kind() == Some(kind)
    }

    /// Same page and same layout region.
    pub fn shares_region_with(&self, other: &TextBox) -> bool {
        self.page == other.page && self.layout_id() == other.layout_id()
    }

    /// Average character width, or `None` for empty text.
    pub fn char_width(&self) -> Option<f32> {
        let n = self.text.chars().count();
        (n > 0).then(|| self.rect.width() / n as f32)
    }
}

impl Spatial for TextBox {
    fn rect(&self) -> &Rect {
        &self.rect
    }

    fn row_index(&self) -> Option<usize> {
        self.table.row_index()
    }

    fn column_index(&self) -> Option<usize> {
        self.table.column_index()
    }
}
