//! Error types for sqlprint
//!
//! Fingerprinting is best-effort: malformed SQL still yields a fingerprint.
//! An `Error` therefore signals either a pipeline defect or a caller-imposed
//! limit, never "this is not valid SQL".

use thiserror::Error;

/// sqlprint error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Union branch/separator accounting broke while collapsing repeats.
    /// Indicates a defect in the pipeline, not a property of the input.
    #[error("Structural error: found {branches} union branches but {separators} separators")]
    StructuralError { branches: usize, separators: usize },

    /// Query exceeds the configured `max_query_bytes`
    #[error("Input too large: {len} bytes exceeds limit of {limit} bytes")]
    InputTooLarge { len: usize, limit: usize },

    /// Options file could not be read or parsed
    #[error("Config error: {0}")]
    ConfigError(String),
}

/// Result type alias for sqlprint operations
pub type Result<T> = std::result::Result<T, Error>;
