//! Table-structure bands and the per-box table role.

use crate::processors::{Detection, Rect, Spatial};
use serde::{Deserialize, Serialize};

/// Class of a table-structure detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    Table,
    Column,
    Row,
    ColumnHeader,
    ProjectedRowHeader,
    SpanningCell,
}

impl BandKind {
    /// Parses labels such as `"table column header"`.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['_', '-'], " ");
        let kind = match normalized.as_str() {
            "table" => BandKind::Table,
            "table column" | "column" => BandKind::Column,
            "table row" | "row" => BandKind::Row,
            "table column header" | "column header" => BandKind::ColumnHeader,
            "table projected row header" | "projected row header" => {
                BandKind::ProjectedRowHeader
            }
            "table spanning cell" | "spanning cell" => BandKind::SpanningCell,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BandKind::Table => "table",
            BandKind::Column => "table column",
            BandKind::Row => "table row",
            BandKind::ColumnHeader => "table column header",
            BandKind::ProjectedRowHeader => "table projected row header",
            BandKind::SpanningCell => "table spanning cell",
        }
    }

    /// Rows and both header kinds partition the table vertically.
    pub fn is_row_like(&self) -> bool {
        matches!(
            self,
            BandKind::Row | BandKind::ColumnHeader | BandKind::ProjectedRowHeader
        )
    }

    pub fn is_header(&self) -> bool {
        matches!(self, BandKind::ColumnHeader | BandKind::ProjectedRowHeader)
    }
}

/// A structure band in document-global page units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBand {
    pub kind: BandKind,
    pub rect: Rect,
    pub score: f32,
    /// 1-based page number.
    pub page: usize,
    /// Layout id of the table region this band was detected in.
    pub table_id: String,
}

impl Spatial for TableBand {
    fn rect(&self) -> &Rect {
        &self.rect
    }
}

/// Bands are deduplicated per list; rows and headers compete with each other.
impl Detection for TableBand {
    fn kind_key(&self) -> Option<&str> {
        None
    }

    fn score(&self) -> Option<f32> {
        Some(self.score)
    }
}

/// Row membership with the band's vertical extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowBand {
    pub index: usize,
    pub top: f32,
    pub bottom: f32,
}

/// Column membership with the band's horizontal extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBand {
    pub index: usize,
    pub left: f32,
    pub right: f32,
}

/// Table tags attached to a box inside a table region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRole {
    pub row: Option<RowBand>,
    pub header: Option<usize>,
    pub column: Option<ColumnBand>,
    pub span: Option<usize>,
    /// Extent of the header band or spanning cell this box belongs to.
    pub span_extent: Option<Rect>,
}

impl TableRole {
    pub fn row_index(&self) -> Option<usize> {
        self.row.map(|r| r.index)
    }

    pub fn column_index(&self) -> Option<usize> {
        self.column.map(|c| c.index)
    }

    pub fn is_empty(&self) -> bool {
        self.row.is_none() && self.header.is_none() && self.column.is_none() && self.span.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_kind_labels() {
        assert_eq!(
            BandKind::from_label("table column header"),
            Some(BandKind::ColumnHeader)
        );
        assert_eq!(
            BandKind::from_label("table_spanning_cell"),
            Some(BandKind::SpanningCell)
        );
        assert!(BandKind::ProjectedRowHeader.is_row_like());
        assert!(BandKind::ColumnHeader.is_header());
        assert!(!BandKind::Row.is_header());
        assert!(!BandKind::Column.is_row_like());
    }

    #[test]
    fn test_role_indices() {
        let role = TableRole {
            row: Some(RowBand {
                index: 2,
                top: 0.0,
                bottom: 10.0,
            }),
            ..Default::default()
        };
        assert_eq!(role.row_index(), Some(2));
        assert_eq!(role.column_index(), None);
        assert!(!role.is_empty());
        assert!(TableRole::default().is_empty());
    }
}
