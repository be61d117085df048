//! Error types for the SQL audit pipeline.

use strata_core::{ConfigError, FieldKind, SchemaError};
use thiserror::Error;

/// Errors that can occur while building, executing or decoding audit statements.
#[derive(Debug, Error)]
pub enum StrataError {
    /// No table mapping is configured for the topic.
    #[error("no table mapping found for audit event type: {topic}")]
    NoTableMapping { topic: String },

    /// The topic schema declares a type the pipeline cannot store.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A query refers to a field that has no column.
    #[error("field '{field}' is not mapped to a column for audit event type: {topic}")]
    UnmappedField { topic: String, field: String },

    /// A table or column name is not a plain SQL identifier.
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    /// Reads need the content identifier to be mapped.
    #[error("table mapping for {topic} does not map the '_id' field")]
    MissingIdMapping { topic: String },

    /// The event has none of the mapped fields.
    #[error("audit event for {topic} has no mapped fields")]
    NoMappedFields { topic: String },

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A parameter value does not match its declared kind.
    #[error("unable to bind parameter {index} as {kind}: {reason}")]
    Bind {
        index: usize,
        kind: FieldKind,
        reason: String,
    },

    /// A stored value could not be turned back into JSON.
    #[error("unable to decode stored value: {0}")]
    Decode(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection acquisition or statement failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No stored event has the requested identifier.
    #[error("entry not found for id: {id}")]
    NotFound { topic: String, id: String },

    /// The executor has been closed and no longer accepts events.
    #[error("audit event executor is closed")]
    ExecutorClosed,

    /// The handler is disabled.
    #[error("audit event handler '{0}' is disabled")]
    Disabled(String),
}

impl StrataError {
    /// Whether the error comes from configuration rather than I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoTableMapping { .. }
                | Self::Schema(_)
                | Self::UnmappedField { .. }
                | Self::InvalidIdentifier(_)
                | Self::MissingIdMapping { .. }
                | Self::Config(_)
                | Self::Disabled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_topic() {
        let err = StrataError::NoTableMapping {
            topic: "access".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no table mapping found for audit event type: access"
        );
        assert!(err.is_configuration());
        assert!(!StrataError::ExecutorClosed.is_configuration());
    }
}
