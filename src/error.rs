//! Error types for qspec.

use thiserror::Error;

/// The main error type for qspec operations.
#[derive(Debug, Error)]
pub enum QspecError {
    /// The query spec selects no relations, so there is no anchor.
    #[error("Query spec selects no relations")]
    EmptyQuerySpec,

    /// Failed to parse a compact text form (column, filter, schema block...).
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Schema could not be loaded or is malformed.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Snapshot data could not be loaded or is malformed.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Live query execution error.
    #[error("Execution error: {0}")]
    Execution(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QspecError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }
}

/// Result type alias for qspec operations.
pub type QspecResult<T> = Result<T, QspecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QspecError::parse(5, "unexpected character");
        assert_eq!(
            err.to_string(),
            "Parse error at position 5: unexpected character"
        );
        assert_eq!(
            QspecError::EmptyQuerySpec.to_string(),
            "Query spec selects no relations"
        );
    }
}
