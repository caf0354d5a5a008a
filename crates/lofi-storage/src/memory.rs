//! In-memory storage backend

use crate::{Storage, StorageError, StorageStats};
use dashmap::{DashMap, DashSet};
use lofi_core::{DocId, DocumentMeta, PeerId};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Fast, volatile storage for ephemeral workspaces and tests.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    /// Document data: id -> (meta_bytes, data_bytes)
    data: DashMap<DocId, (Vec<u8>, Vec<u8>)>,
    /// Total size tracking
    total_size: AtomicUsize,
    settings: DashMap<String, Vec<u8>>,
    addresses: DashSet<(PeerId, String)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_size: AtomicUsize::new(0),
            settings: DashMap::new(),
            addresses: DashSet::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn store(&self, meta: &DocumentMeta, data: &[u8]) -> Result<(), StorageError> {
        let meta_bytes = serde_json::to_vec(meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let new_size = meta_bytes.len() + data.len();

        // Update size tracking
        if let Some(existing) = self.data.get(&meta.id) {
            let old_size = existing.0.len() + existing.1.len();
            self.total_size.fetch_sub(old_size, Ordering::Relaxed);
        }
        self.total_size.fetch_add(new_size, Ordering::Relaxed);

        self.data.insert(meta.id, (meta_bytes, data.to_vec()));
        Ok(())
    }

    fn load(&self, id: &DocId) -> Result<Option<(DocumentMeta, Vec<u8>)>, StorageError> {
        match self.data.get(id) {
            Some(entry) => {
                let (meta_bytes, data) = entry.value();
                let meta: DocumentMeta = serde_json::from_slice(meta_bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some((meta, data.clone())))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, id: &DocId) -> Result<bool, StorageError> {
        match self.data.remove(id) {
            Some((_, (meta_bytes, data))) => {
                let size = meta_bytes.len() + data.len();
                self.total_size.fetch_sub(size, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self, schema: Option<&str>) -> Result<Vec<DocumentMeta>, StorageError> {
        let mut metas = Vec::new();
        for entry in self.data.iter() {
            let meta: DocumentMeta = serde_json::from_slice(&entry.value().0)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            if schema.map_or(true, |s| meta.schema == s) {
                metas.push(meta);
            }
        }
        metas.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(metas)
    }

    fn exists(&self, id: &DocId) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(id))
    }

    fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            document_count: self.data.len(),
            total_size_bytes: self.total_size.load(Ordering::Relaxed),
            address_count: self.addresses.len(),
        })
    }

    fn get_setting(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.settings.get(key).map(|v| v.value().clone()))
    }

    fn put_setting(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.settings.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn add_address(&self, peer: &PeerId, addr: &str) -> Result<(), StorageError> {
        self.addresses.insert((*peer, addr.to_string()));
        Ok(())
    }

    fn remove_address(&self, peer: &PeerId, addr: &str) -> Result<bool, StorageError> {
        Ok(self.addresses.remove(&(*peer, addr.to_string())).is_some())
    }

    fn addresses(&self) -> Result<Vec<(PeerId, String)>, StorageError> {
        let mut all: Vec<(PeerId, String)> = self.addresses.iter().map(|e| e.key().clone()).collect();
        all.sort();
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofi_core::SchemaHash;

    fn meta(n: u8, schema: &str) -> DocumentMeta {
        DocumentMeta::new(DocId::new([n; 32]), schema, SchemaHash::digest(schema.as_bytes()))
    }

    #[test]
    fn test_store_and_load() {
        let storage = MemoryStorage::new();
        let meta = meta(1, "todos");
        let data = b"hello world";

        storage.store(&meta, data).unwrap();

        let (loaded_meta, loaded_data) = storage.load(&meta.id).unwrap().unwrap();
        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded_data, data);
    }

    #[test]
    fn test_delete() {
        let storage = MemoryStorage::new();
        let meta = meta(2, "todos");

        storage.store(&meta, b"data").unwrap();
        assert!(storage.exists(&meta.id).unwrap());

        assert!(storage.delete(&meta.id).unwrap());
        assert!(!storage.exists(&meta.id).unwrap());
        assert!(!storage.delete(&meta.id).unwrap());
    }

    #[test]
    fn test_list_by_schema() {
        let storage = MemoryStorage::new();

        for i in 0..5 {
            storage.store(&meta(i, "todos"), b"data").unwrap();
        }

        for i in 10..13 {
            storage.store(&meta(i, "notes"), b"data").unwrap();
        }

        assert_eq!(storage.list(Some("todos")).unwrap().len(), 5);
        assert_eq!(storage.list(Some("notes")).unwrap().len(), 3);
        assert_eq!(storage.list(None).unwrap().len(), 8);
        assert!(storage.list(Some("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let storage = MemoryStorage::new();

        storage.store(&meta(1, "todos"), b"some data here").unwrap();
        storage.store(&meta(1, "todos"), b"more").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert!(stats.total_size_bytes > 0);
    }

    #[test]
    fn test_settings_and_addresses() {
        let storage = MemoryStorage::new();
        assert!(storage.get_setting("peer_id").unwrap().is_none());
        storage.put_setting("peer_id", &[1, 2, 3]).unwrap();
        assert_eq!(storage.get_setting("peer_id").unwrap(), Some(vec![1, 2, 3]));

        let peer = PeerId::new([4; 32]);
        storage.add_address(&peer, "10.0.0.1:4000").unwrap();
        storage.add_address(&peer, "10.0.0.1:4000").unwrap();
        storage.add_address(&peer, "[::1]:4000").unwrap();
        assert_eq!(storage.addresses().unwrap().len(), 2);

        assert!(storage.remove_address(&peer, "10.0.0.1:4000").unwrap());
        assert!(!storage.remove_address(&peer, "10.0.0.1:4000").unwrap());
        assert_eq!(
            storage.addresses().unwrap(),
            vec![(peer, "[::1]:4000".to_string())]
        );
    }
}
