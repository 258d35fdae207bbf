//! The layout reconstruction pipeline.
//!
//! [`ReflowEngine`] drives a document through these stages, in order:
//!
//! 1. [`ocr_ingest`]: rendered pages to cleaned, row-sorted [`TextBox`]es
//! 2. [`layout_tagger`]: layout regions assigned to boxes, page furniture removed
//! 3. [`table_structure`]: table orientation, then row, header, column and
//!    spanning-cell tags inside tables
//! 4. [`text_merge`]: fragments of one line joined
//! 5. [`concat`]: lines joined into paragraphs through a [`ConcatenationScorer`]
//! 6. [`page_filter`]: contents pages and dotted-leader pages dropped
//! 7. [`table_figure`]: tables and figures lifted out, tables rebuilt by [`table_builder`]
//! 8. [`scraps`]: stray fragments discarded, the rest emitted with position tags
//!
//! Stages share a read-only [`StageContext`].
//!
//! [`TextBox`]: crate::domain::TextBox
//! [`ConcatenationScorer`]: crate::core::ConcatenationScorer

pub mod concat;
pub mod engine;
pub mod features;
pub mod layout_tagger;
pub mod ocr_ingest;
pub mod page_filter;
pub mod replay;
pub mod scraps;
pub mod table_builder;
pub mod table_figure;
pub mod table_structure;
pub mod text_merge;

#[cfg(test)]
pub(crate) mod testing;

use crate::core::{PatternTables, ReflowConfig};
use crate::domain::DocumentPages;

pub use engine::{ReflowEngine, ReflowEngineBuilder};
pub use features::ConcatFeatures;
pub use replay::{LogisticScorer, RecordedDetections, ReplayAdapters};
pub use table_figure::{Extracted, PlacedVisual};

/// Everything a stage may read about the document being processed.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a ReflowConfig,
    pub patterns: &'a PatternTables,
    pub pages: &'a DocumentPages,
    /// Set once OCR has finished; false before that.
    pub is_english: bool,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a ReflowConfig,
        patterns: &'a PatternTables,
        pages: &'a DocumentPages,
        is_english: bool,
    ) -> Self {
        Self {
            config,
            patterns,
            pages,
            is_english,
        }
    }

    /// Median line height over all pages, never below 1.
    pub fn document_mean_height(&self) -> f32 {
        let heights: Vec<f32> = self.pages.iter().map(|p| p.mean_height).collect();
        crate::processors::median(&heights).max(1.0)
    }
}
