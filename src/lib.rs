//! # oar-reflow
//!
//! Rebuilds the reading order of rendered documents from the output of OCR,
//! layout and table-structure detectors.
//!
//! The engine never runs a model itself. It receives page images, asks its
//! adapters for text lines, layout regions and table bands, and reconciles the
//! noisy rectangles into:
//!
//! - paragraphs in reading order, every line suffixed with a position tag
//!   `@@<pages>\t<x0>\t<x1>\t<top>\t<bottom>##`
//! - tables rebuilt as HTML with `colspan`/`rowspan`, or as verbalized rows
//! - figures with their captions and crops
//!
//! ## Modules
//!
//! - [`core`]: configuration, errors, adapter traits, progress and cancellation
//! - [`domain`]: boxes, regions, bands, position tags and output records
//! - [`processors`]: geometry and text heuristics shared by the stages
//! - [`reflow`]: the stages and the [`ReflowEngine`] that drives them
//! - [`utils`]: tracing setup and page-image cropping
//!
//! ## Example
//!
//! ```no_run
//! use oar_reflow::prelude::*;
//!
//! let recording = RecordedDetections::from_path("recorded.json")?;
//! let pages = recording.blank_pages();
//! let engine = ReflowEngineBuilder::new(ReflowConfig::new().with_zoom(recording.zoom))
//!     .with_detectors(ReplayAdapters::new(recording))
//!     .build()?;
//!
//! let output = engine.parse(&DocumentSource::Pages(pages))?;
//! for chunk in &output.chunks {
//!     println!("{}", chunk.plain_text());
//! }
//! # Ok::<(), ReflowError>(())
//! ```

pub mod core;
pub mod domain;
pub mod processors;
pub mod reflow;
pub mod utils;

pub use reflow::{ReflowEngine, ReflowEngineBuilder};

/// The types most callers need.
pub mod prelude {
    pub use crate::core::{
        CancellationToken, ConcatenationScorer, DocumentSource, LayoutDetector, Progress,
        ProgressSink, Rasterizer, ReflowConfig, ReflowError, ReflowResult, TableOutput,
        TableStructureDetector, TextRecognizer,
    };
    pub use crate::domain::{
        Completion, ParsedBox, PositionTag, ReflowOutput, TableContent, TextChunk, VisualChunk,
        remove_tags,
    };
    pub use crate::reflow::{
        LogisticScorer, RecordedDetections, ReflowEngine, ReflowEngineBuilder, ReplayAdapters,
    };
}
