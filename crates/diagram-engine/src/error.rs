//! Error types for the diagram engine

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;
use crate::validation::ValidationError;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur at the engine's I/O boundaries
///
/// Store mutations never produce these: they fail by returning `None`
/// and, where the user needs to know, emitting an `Error` event.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Document failed import validation
    #[error("Invalid workflow document: {}", summarize(.0))]
    InvalidDocument(Vec<ValidationError>),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence backend error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Validation findings carried by an invalid-document error
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::InvalidDocument(errors) => errors,
            _ => &[],
        }
    }
}

fn summarize(errors: &[ValidationError]) -> String {
    match errors {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_document_message() {
        let err = EngineError::InvalidDocument(vec![
            ValidationError::NodesNotArray,
            ValidationError::ConnectionsNotArray,
        ]);
        let message = err.to_string();
        assert!(message.contains("nodes must be an array"));
        assert!(message.contains("1 more"));
        assert_eq!(err.validation_errors().len(), 2);
    }
}
