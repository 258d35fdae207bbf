//! Error types for the reflow pipeline.

mod types;

pub use types::{AdapterKind, ProcessingStage, ReflowError, ReflowResult};
