//! SQLite storage backend

use crate::{Storage, StorageError, StorageStats};
use lofi_core::{DocId, DocumentMeta, PeerId};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// SQLite storage backend
///
/// Embedded persistence for a single workspace. Writes are flushed before
/// each call returns.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a database at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(StorageError::Io(format!(
                    "directory does not exist: {}",
                    parent.display()
                )));
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        debug!(path = %path.display(), "Opened SQLite storage");

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };

        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                schema TEXT NOT NULL,
                meta BLOB NOT NULL,
                data BLOB NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_schema ON documents(schema);
            CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS addresses (
                peer TEXT NOT NULL,
                addr TEXT NOT NULL,
                PRIMARY KEY (peer, addr)
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }
}

fn decode_meta(bytes: &[u8]) -> Result<DocumentMeta, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl Storage for SqliteStorage {
    fn store(&self, meta: &DocumentMeta, data: &[u8]) -> Result<(), StorageError> {
        let meta_bytes = serde_json::to_vec(meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (id, schema, meta, data, updated_at)
            VALUES (?1, ?2, ?3, ?4, strftime('%s', 'now') * 1000)
            ON CONFLICT(id) DO UPDATE SET
                schema = excluded.schema,
                meta = excluded.meta,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![meta.id.to_string(), meta.schema, meta_bytes, data],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn load(&self, id: &DocId) -> Result<Option<(DocumentMeta, Vec<u8>)>, StorageError> {
        let conn = self.conn.lock();

        let result: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT meta, data FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        match result {
            Some((meta_bytes, data)) => Ok(Some((decode_meta(&meta_bytes)?, data))),
            None => Ok(None),
        }
    }

    fn delete(&self, id: &DocId) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let affected = conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])
            .map_err(db_err)?;

        Ok(affected > 0)
    }

    fn list(&self, schema: Option<&str>) -> Result<Vec<DocumentMeta>, StorageError> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT meta FROM documents WHERE ?1 IS NULL OR schema = ?1 \
                 ORDER BY updated_at DESC, id",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![schema], |row| row.get::<_, Vec<u8>>(0))
            .map_err(db_err)?;

        let mut metas = Vec::new();
        for row in rows {
            metas.push(decode_meta(&row.map_err(db_err)?)?);
        }
        Ok(metas)
    }

    fn exists(&self, id: &DocId) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        Ok(count > 0)
    }

    fn stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();

        let document_count: usize = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(db_err)?;

        let total_size: usize = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(meta) + LENGTH(data)), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let address_count: usize = conn
            .query_row("SELECT COUNT(*) FROM addresses", [], |row| row.get(0))
            .map_err(db_err)?;

        Ok(StorageStats {
            document_count,
            total_size_bytes: total_size,
            address_count,
        })
    }

    fn get_setting(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock();

        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn put_setting(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn add_address(&self, peer: &PeerId, addr: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR IGNORE INTO addresses (peer, addr) VALUES (?1, ?2)",
            params![peer.to_string(), addr],
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn remove_address(&self, peer: &PeerId, addr: &str) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let affected = conn
            .execute(
                "DELETE FROM addresses WHERE peer = ?1 AND addr = ?2",
                params![peer.to_string(), addr],
            )
            .map_err(db_err)?;

        Ok(affected > 0)
    }

    fn addresses(&self) -> Result<Vec<(PeerId, String)>, StorageError> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare("SELECT peer, addr FROM addresses ORDER BY peer, addr")
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_err)?;

        let mut all = Vec::new();
        for row in rows {
            let (peer, addr) = row.map_err(db_err)?;
            let peer: PeerId = peer
                .parse()
                .map_err(|e: lofi_core::Error| StorageError::Serialization(e.to_string()))?;
            all.push((peer, addr));
        }
        Ok(all)
    }
}
