// error.rs — Error types for policy descriptors.

use thiserror::Error;

/// Errors that can occur while loading, validating, or translating a descriptor.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The descriptor is malformed. Every problem found is listed so the
    /// operator can fix them in one pass.
    #[error("invalid policy descriptor: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },

    /// A descriptor file could not be read.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// A descriptor file could not be parsed as YAML or JSON.
    #[error("failed to parse descriptor {path}: {reason}")]
    ParseError { path: String, reason: String },

    /// Failed to serialize the remote payload.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PolicyError {
    /// The individual validation problems, empty for non-validation errors.
    pub fn problems(&self) -> &[String] {
        match self {
            PolicyError::Invalid { problems } => problems,
            _ => &[],
        }
    }
}
