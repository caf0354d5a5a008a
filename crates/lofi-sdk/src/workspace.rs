//! Workspace - owns documents, the local peer identity and the address book

use crate::doc::{Doc, StoredClock};
use dashmap::DashMap;
use lofi_core::{DocId, Document, DocumentMeta, Error, Package, PeerId, Result, Schema};
use lofi_storage::{
    MemoryStorage, SqliteStorage, Storage, StorageStats, FORMAT_VERSION, FORMAT_VERSION_KEY,
    PEER_ID_KEY,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of the document ids known when it was created
#[derive(Debug)]
pub struct DocIter {
    ids: std::vec::IntoIter<DocId>,
}

impl Iterator for DocIter {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        self.ids.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for DocIter {}

/// A local replica: documents, identity and known peer addresses
pub struct Sdk {
    storage: Arc<dyn Storage>,
    package: Arc<Package>,
    peer: PeerId,
    /// Open documents indexed by id
    documents: DashMap<DocId, Doc>,
    /// Address book cache, mirrored in storage
    addresses: DashMap<PeerId, BTreeSet<String>>,
}

impl Sdk {
    /// Open or initialise a workspace backed by a SQLite file at `path`
    pub fn create_persistent(path: impl AsRef<Path>, package: &[u8]) -> Result<Self> {
        let package = Package::from_json(package)?;
        let path = path.as_ref();
        info!(path = %path.display(), "Opening persistent workspace");
        let storage = SqliteStorage::new(path)?;
        Self::with_storage(Arc::new(storage), package)
    }

    /// A workspace that lives only in memory
    pub fn create_memory(package: &[u8]) -> Result<Self> {
        let package = Package::from_json(package)?;
        Self::with_storage(Arc::new(MemoryStorage::new()), package)
    }

    /// Open a workspace on any storage backend
    pub fn with_storage(storage: Arc<dyn Storage>, package: Package) -> Result<Self> {
        match storage.get_setting(FORMAT_VERSION_KEY)? {
            Some(version) if version != FORMAT_VERSION => {
                return Err(Error::IncompatibleStore(format!(
                    "storage format version {:?}, expected {:?}",
                    String::from_utf8_lossy(&version),
                    String::from_utf8_lossy(FORMAT_VERSION)
                )));
            }
            Some(_) => {}
            None => storage.put_setting(FORMAT_VERSION_KEY, FORMAT_VERSION)?,
        }

        let peer = match storage.get_setting(PEER_ID_KEY)? {
            Some(bytes) => PeerId::from_slice(&bytes)
                .map_err(|e| Error::IncompatibleStore(format!("stored peer id: {}", e)))?,
            None => {
                let peer = PeerId::random();
                storage.put_setting(PEER_ID_KEY, peer.as_bytes())?;
                info!(peer = %peer, "Generated peer id");
                peer
            }
        };

        let stored = storage.list(None)?;
        for meta in &stored {
            if let Some(entry) = package.get(&meta.schema) {
                if entry.schema.hash()? != meta.schema_hash {
                    return Err(Error::SchemaMismatch(format!(
                        "document {} was created with a different version of schema {:?}",
                        meta.id, meta.schema
                    )));
                }
            }
        }

        let addresses: DashMap<PeerId, BTreeSet<String>> = DashMap::new();
        for (peer, addr) in storage.addresses()? {
            addresses.entry(peer).or_default().insert(addr);
        }

        info!(
            peer = %peer.short(),
            documents = stored.len(),
            peers = addresses.len(),
            "Workspace ready"
        );

        Ok(Self {
            storage,
            package: Arc::new(package),
            peer,
            documents: DashMap::new(),
            addresses,
        })
    }

    /// This replica's identity
    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn stats(&self) -> Result<StorageStats> {
        Ok(self.storage.stats()?)
    }

    fn check_address(addr: &str) -> Result<()> {
        if addr.is_empty() || addr.chars().any(char::is_whitespace) {
            return Err(Error::InvalidAddress(addr.to_string()));
        }
        Ok(())
    }

    /// Remember a network address for `peer`
    pub fn add_address(&self, peer: &PeerId, addr: &str) -> Result<()> {
        Self::check_address(addr)?;
        self.storage.add_address(peer, addr)?;
        self.addresses
            .entry(*peer)
            .or_default()
            .insert(addr.to_string());
        debug!(peer = %peer.short(), addr, "Added address");
        Ok(())
    }

    /// Forget a network address; unknown addresses are ignored
    pub fn remove_address(&self, peer: &PeerId, addr: &str) -> Result<()> {
        self.storage.remove_address(peer, addr)?;
        if let Some(mut known) = self.addresses.get_mut(peer) {
            known.remove(addr);
        }
        self.addresses.remove_if(peer, |_, known| known.is_empty());
        debug!(peer = %peer.short(), addr, "Removed address");
        Ok(())
    }

    /// Known addresses of `peer`, sorted
    pub fn addresses(&self, peer: &PeerId) -> Vec<String> {
        self.addresses
            .get(peer)
            .map(|known| known.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Peers with at least one known address
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.addresses.iter().map(|e| *e.key()).collect();
        peers.sort();
        peers
    }

    /// Ids of stored documents, optionally only those of one schema
    pub fn list_documents(&self, schema: Option<&str>) -> Result<DocIter> {
        let ids: Vec<DocId> = self.storage.list(schema)?.into_iter().map(|m| m.id).collect();
        Ok(DocIter {
            ids: ids.into_iter(),
        })
    }

    fn schema(&self, name: &str) -> Result<&Schema> {
        self.package
            .get(name)
            .map(|entry| &entry.schema)
            .ok_or_else(|| Error::SchemaNotFound(name.to_string()))
    }

    /// Back the document's clock with workspace storage so counters handed
    /// out before a crash are not handed out again
    fn durable(&self, document: Document) -> Result<Document> {
        let clock = StoredClock::new(self.storage.clone());
        let floor = clock.floor(&document.id())?;
        Ok(document.with_clock_store(floor, Arc::new(clock)))
    }

    fn register(&self, doc: Doc) -> Doc {
        self.documents.entry(doc.id()).or_insert(doc).value().clone()
    }

    /// Create a new document of the named schema, owned by this peer
    pub fn create_document(&self, schema: &str) -> Result<Doc> {
        let document = self.durable(Document::create(self.peer, self.schema(schema)?.clone())?)?;
        let meta = DocumentMeta::new(document.id(), schema, document.schema_hash());
        let doc = Doc::new(document, meta, self.storage.clone());
        doc.persist()?;
        info!(doc = %doc.id(), schema, "Created document");
        Ok(self.register(doc))
    }

    pub fn open_document(&self, id: &DocId) -> Result<Doc> {
        if let Some(doc) = self.documents.get(id) {
            return Ok(doc.value().clone());
        }

        let (meta, data) = self
            .storage
            .load(id)?
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        let schema = self.schema(&meta.schema)?.clone();
        if schema.hash()? != meta.schema_hash {
            return Err(Error::SchemaMismatch(format!(
                "document {} was created with a different version of schema {:?}",
                id, meta.schema
            )));
        }
        let state = rmp_serde::from_slice(&data)?;
        let document = self.durable(Document::from_state(*id, self.peer, schema, state)?)?;
        debug!(doc = %id.short(), version = meta.version, "Loaded document");
        Ok(self.register(Doc::new(document, meta, self.storage.clone())))
    }

    /// Register a document created elsewhere, with no state yet.
    ///
    /// Adding a document that is already known returns it, as long as the
    /// schema matches.
    pub fn add_document(&self, id: DocId, schema: &str) -> Result<Doc> {
        if self.documents.contains_key(&id) || self.storage.exists(&id)? {
            let doc = self.open_document(&id)?;
            if doc.schema_name() != schema {
                return Err(Error::SchemaMismatch(format!(
                    "document {} uses schema {:?}, not {:?}",
                    id,
                    doc.schema_name(),
                    schema
                )));
            }
            return Ok(doc);
        }

        let document = self.durable(Document::new(id, self.peer, self.schema(schema)?.clone())?)?;
        let meta = DocumentMeta::new(id, schema, document.schema_hash());
        let doc = Doc::new(document, meta, self.storage.clone());
        doc.persist()?;
        info!(doc = %id, schema, "Added document");
        Ok(self.register(doc))
    }

    /// Delete the local copy of a document
    pub fn remove_document(&self, id: &DocId) -> Result<()> {
        let cached = self.documents.remove(id).is_some();
        let stored = self.storage.delete(id)?;
        if !cached && !stored {
            return Err(Error::NotFound(format!("document {}", id)));
        }
        info!(doc = %id, "Removed document");
        Ok(())
    }
}

impl std::fmt::Debug for Sdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sdk")
            .field("peer", &self.peer)
            .field("open_documents", &self.documents.len())
            .finish()
    }
}
