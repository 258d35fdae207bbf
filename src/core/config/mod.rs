//! Configuration management for the reflow pipeline.
//!
//! This module provides the engine configuration, the heuristic pattern
//! tables, parallelism settings and the validation trait they share.

pub mod errors;
pub mod parallel;
pub mod patterns;
pub mod reflow;

pub use errors::{ConfigError, ConfigValidator};
pub use parallel::ParallelPolicy;
pub use patterns::{LeveledPattern, PatternSpec, PatternTables};
pub use reflow::{ReflowConfig, TableOutput};
