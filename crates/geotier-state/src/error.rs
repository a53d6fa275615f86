//! Error types for the geotier association store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error in {key}: {detail}")]
    Deserialize { key: String, detail: String },

    #[error("schema mismatch in {key}: {detail}")]
    SchemaMismatch { key: String, detail: String },
}

impl StateError {
    /// Errors that mean stored state cannot be trusted, as opposed to
    /// transient I/O failures.
    pub fn is_schema_fault(&self) -> bool {
        matches!(
            self,
            StateError::Deserialize { .. } | StateError::SchemaMismatch { .. }
        )
    }
}
