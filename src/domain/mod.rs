//! Document model shared by the reflow stages.
//!
//! - [`TextBox`]: the atomic recognized fragment, carried through every stage
//! - [`LayoutRegion`] / [`LayoutTag`]: layout detections and the assignment a box receives
//! - [`TableBand`] / [`TableRole`]: table-structure bands and per-box row/column tags
//! - [`DocumentPages`]: page sizes, line metrics and the document-global y axis
//! - [`PositionTag`]: the inline `@@..##` source reference
//! - [`ReflowOutput`]: chunks handed back to the caller

pub mod chunk;
pub mod layout;
pub mod page;
pub mod position;
pub mod table;
pub mod text_box;

pub use chunk::{
    Completion, FigureChunk, ParsedBox, ReflowOutput, TableChunk, TableContent, TextChunk,
    VisualChunk,
};
pub use layout::{LayoutRegion, LayoutTag, LayoutType};
pub use page::{DocumentPages, PageGeometry};
pub use position::{PagePosition, PositionTag, PositionTagError, extract_positions, remove_tags};
pub use table::{BandKind, ColumnBand, RowBand, TableBand, TableRole};
pub use text_box::TextBox;
