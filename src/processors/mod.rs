//! Low-level processing helpers shared by the reflow stages.
//!
//! - [`columns`]: text-column starts from line-leading boxes
//! - [`geometry`]: rectangles, overlap, tolerant sorts, band matching and detection cleanup
//! - [`text`]: tokenization, fragment joining, cell typing and language detection

pub mod columns;
pub mod geometry;
pub mod text;

pub use columns::{column_of, column_starts};
pub use geometry::{
    Detection, Rect, Spatial, find_horizontally_tightest_fit, find_overlapped,
    find_overlapped_with_threshold, layouts_cleanup, mean, median, nearest_band_match,
    sort_by_column_index, sort_by_row_index, sort_columns_first, sort_rows_first,
};
pub use text::{BlockType, block_type, detect_english, is_cjk, join_fragments, tokenize};
