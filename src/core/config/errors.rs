//! Configuration validation primitives.

use thiserror::Error;

/// Errors raised while validating or compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed domain.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// What was wrong.
        message: String,
    },
    /// A heuristic pattern failed to compile.
    #[error("invalid pattern '{pattern}' in {table}: {source}")]
    InvalidPattern {
        /// The table the pattern belongs to.
        table: &'static str,
        /// The offending pattern.
        pattern: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Validation hook for configuration structs.
pub trait ConfigValidator: Sized {
    /// Checks that every field is within its allowed domain.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Returns the default configuration.
    fn get_defaults() -> Self;
}

/// Checks that `value` lies in `[min, max]`.
pub(crate) fn ensure_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::invalid(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

/// Checks that `value` is strictly positive.
pub(crate) fn ensure_positive(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::invalid(format!(
            "{name} must be greater than 0, got {value}"
        )));
    }
    Ok(())
}
