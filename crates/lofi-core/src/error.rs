//! Error types for lofi core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Schema not found in package: {0}")]
    SchemaNotFound(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Type error: expected {expected}, cursor is at {found}")]
    TypeError { expected: String, found: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Dot counters exhausted for peer {0}")]
    ClockExhausted(String),

    #[error("Index out of range: {index} >= {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Incompatible store: {0}")]
    IncompatibleStore(String),
}

/// Result type alias for lofi core operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
