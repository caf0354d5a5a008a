//! lofi Storage Backends
//!
//! Provides pluggable persistence for workspaces:
//! - Memory (default): fast, volatile storage
//! - SQLite: embedded, file-backed persistence
//!
//! Besides documents a backend keeps small workspace settings (the local peer
//! id, the storage format version) and the peer address book.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use lofi_core::{DocId, DocumentMeta, PeerId};

/// Settings key holding the local peer id
pub const PEER_ID_KEY: &str = "peer_id";

/// Settings key holding the storage format version
pub const FORMAT_VERSION_KEY: &str = "format_version";

/// Prefix of the settings keys holding per-document clock reservations
pub const CLOCK_KEY_PREFIX: &str = "clock/";

/// Current storage format version
pub const FORMAT_VERSION: &[u8] = b"1";

/// Storage backend trait
///
/// Calls are synchronous and fail fast; callers decide whether to retry.
pub trait Storage: Send + Sync {
    /// Store a document, replacing any previous version
    fn store(&self, meta: &DocumentMeta, data: &[u8]) -> Result<(), StorageError>;

    /// Load a document
    fn load(&self, id: &DocId) -> Result<Option<(DocumentMeta, Vec<u8>)>, StorageError>;

    /// Delete a document
    fn delete(&self, id: &DocId) -> Result<bool, StorageError>;

    /// List documents, optionally only those created with the named schema
    fn list(&self, schema: Option<&str>) -> Result<Vec<DocumentMeta>, StorageError>;

    /// Check if a document exists
    fn exists(&self, id: &DocId) -> Result<bool, StorageError>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats, StorageError>;

    /// Read a workspace setting
    fn get_setting(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a workspace setting
    fn put_setting(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Add an address for a peer; adding an existing address is a no-op
    fn add_address(&self, peer: &PeerId, addr: &str) -> Result<(), StorageError>;

    /// Remove an address, returning whether it was present
    fn remove_address(&self, peer: &PeerId, addr: &str) -> Result<bool, StorageError>;

    /// Every known `(peer, address)` pair
    fn addresses(&self) -> Result<Vec<(PeerId, String)>, StorageError>;
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StorageError> for lofi_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => lofi_core::Error::NotFound(what),
            StorageError::Serialization(msg) => lofi_core::Error::Serialization(msg),
            other => lofi_core::Error::Storage(other.to_string()),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub document_count: usize,
    pub total_size_bytes: usize,
    pub address_count: usize,
}

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
