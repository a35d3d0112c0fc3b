//! Error types for the store, the to-do service and configuration.
//!
//! [`StoreError`] is what a [`DocumentStore`](crate::document_store::DocumentStore)
//! reports. [`TodoError`] is what callers of
//! [`TodoService`](crate::todo_service::TodoService) see: the service catches
//! the store signals it knows about and re-raises them with a readable message.

use thiserror::Error;

/// Signals raised by a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same (partition key, id) already exists.
    #[error("Entity with the specified id already exists in the system")]
    Conflict,

    /// No document exists for the given (partition key, id).
    #[error("Entity with the specified id does not exist in the system")]
    NotFound,

    /// The request was rejected before reaching storage (bad key or query).
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] lmdb::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Domain errors returned by the to-do service.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("Item with id {id} already exists")]
    Conflict { id: String },

    #[error("Item with id {id} not found")]
    NotFound { id: String },

    #[error("Failed to update item: {0}")]
    UpdateFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Raised when an environment variable holds a value that cannot be parsed.
#[derive(Debug, Error)]
#[error("Invalid {key} value '{value}': {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}
