//! Core error types for the reflow pipeline.
//!
//! This module defines the `ReflowError` enum, the `AdapterKind` enum naming
//! the model adapter behind a failure, and the `ProcessingStage` enum used for
//! stage timings and for reporting where a cancelled run stopped.

use thiserror::Error;

/// Stages of the reflow pipeline.
///
/// Used for stage timing logs and for reporting where a cancelled run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProcessingStage {
    /// Rendering pages to images.
    Rasterize,
    /// OCR over rendered pages.
    Ocr,
    /// Layout detection and box tagging.
    LayoutTagging,
    /// Table structure detection and band tagging.
    TableStructure,
    /// Horizontal and downward text merging.
    TextMerge,
    /// Contents-page and dotted-leader filtering.
    PageFilter,
    /// Table and figure extraction.
    TableFigureExtraction,
    /// Scrap filtering and position tagging.
    Emission,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Rasterize => write!(f, "rasterize"),
            ProcessingStage::Ocr => write!(f, "ocr"),
            ProcessingStage::LayoutTagging => write!(f, "layout tagging"),
            ProcessingStage::TableStructure => write!(f, "table structure"),
            ProcessingStage::TextMerge => write!(f, "text merge"),
            ProcessingStage::PageFilter => write!(f, "page filter"),
            ProcessingStage::TableFigureExtraction => write!(f, "table/figure extraction"),
            ProcessingStage::Emission => write!(f, "emission"),
        }
    }
}

/// Which external model adapter failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Rasterizer,
    Ocr,
    LayoutDetector,
    TableStructureDetector,
    ConcatenationScorer,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AdapterKind::Rasterizer => "rasterizer",
            AdapterKind::Ocr => "ocr",
            AdapterKind::LayoutDetector => "layout detector",
            AdapterKind::TableStructureDetector => "table structure detector",
            AdapterKind::ConcatenationScorer => "concatenation scorer",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while reconstructing a document.
///
/// Degenerate geometry is never reported here: such boxes are dropped on
/// ingestion. Cancellation is not an error either; it surfaces as a partial
/// result on the output.
#[derive(Error, Debug)]
pub enum ReflowError {
    /// An external model adapter call failed. Never retried internally.
    #[error("{adapter} failed: {context}")]
    ModelAdapter {
        /// The adapter that failed.
        adapter: AdapterKind,
        /// Additional context about the call.
        context: String,
        /// The underlying adapter error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The document type has no registered stage pipeline.
    #[error("unsupported input: {message}")]
    UnsupportedInput {
        /// A message describing the unsupported input.
        message: String,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error occurred while decoding an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for ReflowError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl From<crate::core::config::ConfigError> for ReflowError {
    fn from(error: crate::core::config::ConfigError) -> Self {
        Self::ConfigError {
            message: error.to_string(),
        }
    }
}

impl ReflowError {
    /// Wraps an adapter failure with the adapter it came from.
    pub fn adapter_failure(
        adapter: AdapterKind,
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ModelAdapter {
            adapter,
            context: context.into(),
            source: source.into(),
        }
    }

    /// Creates an unsupported-input error.
    pub fn unsupported_input(message: impl Into<String>) -> Self {
        Self::UnsupportedInput {
            message: message.into(),
        }
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error with context and details.
    ///
    /// # Arguments
    ///
    /// * `context` - What was being configured
    /// * `details` - What went wrong
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Returns true when the error came from an external model adapter.
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, Self::ModelAdapter { .. })
    }
}

/// Result alias used throughout the crate.
pub type ReflowResult<T> = Result<T, ReflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_failure_display() {
        let err = ReflowError::adapter_failure(AdapterKind::Ocr, "page 3", "device lost");
        assert_eq!(err.to_string(), "ocr failed: page 3");
        assert!(err.is_adapter_failure());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_detailed() {
        let err = ReflowError::config_error_detailed("zoom", "must be positive");
        assert_eq!(err.to_string(), "configuration: zoom: must be positive");
        assert!(!err.is_adapter_failure());
    }

    #[test]
    fn test_processing_stage_display() {
        assert_eq!(ProcessingStage::TableStructure.to_string(), "table structure");
        assert_eq!(
            ProcessingStage::TableFigureExtraction.to_string(),
            "table/figure extraction"
        );
        assert_eq!(ProcessingStage::Emission.to_string(), "emission");
    }
}
