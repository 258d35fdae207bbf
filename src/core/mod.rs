//! The core module of the reflow pipeline.
//!
//! This module contains the fundamental components shared by every stage:
//! - Configuration and heuristic pattern tables
//! - Error handling
//! - Model adapter traits
//! - Progress reporting and cancellation

pub mod config;
pub mod errors;
pub mod progress;
pub mod traits;

pub use config::{
    ConfigError, ConfigValidator, ParallelPolicy, PatternSpec, PatternTables, ReflowConfig,
    TableOutput,
};
pub use errors::{AdapterKind, ProcessingStage, ReflowError, ReflowResult};
pub use progress::{CancellationToken, Progress, ProgressSink};
pub use traits::{
    AdapterError, AdapterResult, ConcatenationScorer, DocumentSource, LayoutDetector, OcrLine,
    OcrPage, Rasterizer, RegionDetection, TableCrop, TableRotation, TableStructureDetector,
    TextRecognizer,
};
