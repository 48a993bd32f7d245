//! Error types for testdeck

use thiserror::Error;

/// Result type alias using testdeck Error
pub type Result<T> = std::result::Result<T, Error>;

/// testdeck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Selection is empty: at least one file::test pair is required")]
    EmptySelection,

    #[error("Invalid selection entry: {0}")]
    InvalidSelection(String),

    #[error("Result store root is not writable: {path}")]
    StoreNotWritable { path: String },

    #[error("Malformed result artifact at {path}: {reason}")]
    MalformedArtifact { path: String, reason: String },

    #[error("Test engine error: {0}")]
    Engine(String),

    #[error("Report assembly error: {0}")]
    Report(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Internal error: {0}")]
    Internal(String),
}
