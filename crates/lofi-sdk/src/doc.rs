//! Persistent document handles

use lofi_core::{
    Causal, ClockStore, Cursor, DocId, Document, DocumentMeta, DotSet, Error, Result,
};
use lofi_storage::{Storage, CLOCK_KEY_PREFIX};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};

/// Clock reservations kept in the workspace settings
pub(crate) struct StoredClock {
    storage: Arc<dyn Storage>,
}

impl StoredClock {
    pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(doc: &DocId) -> String {
        format!("{}{}", CLOCK_KEY_PREFIX, doc)
    }

    /// Last counter reserved for `doc`, 0 if none
    pub(crate) fn floor(&self, doc: &DocId) -> Result<u64> {
        match self.storage.get_setting(&Self::key(doc))? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::IncompatibleStore(format!("clock of document {}", doc))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }
}

impl ClockStore for StoredClock {
    fn reserve(&self, doc: &DocId, counter: u64) -> Result<()> {
        self.storage
            .put_setting(&Self::key(doc), &counter.to_be_bytes())?;
        Ok(())
    }
}

struct DocInner {
    doc: RwLock<Document>,
    meta: Mutex<DocumentMeta>,
    storage: Arc<dyn Storage>,
}

/// A document owned by a workspace.
///
/// Cloning is cheap; clones share the same document. Applied deltas are
/// written to the workspace storage before they become visible.
#[derive(Clone)]
pub struct Doc {
    inner: Arc<DocInner>,
}

impl Doc {
    pub(crate) fn new(doc: Document, meta: DocumentMeta, storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(DocInner {
                doc: RwLock::new(doc),
                meta: Mutex::new(meta),
                storage,
            }),
        }
    }

    /// Write the current state to storage
    pub(crate) fn persist(&self) -> Result<()> {
        let doc = self.inner.doc.read();
        let data = rmp_serde::to_vec(doc.state())?;
        let meta = self.inner.meta.lock().clone();
        self.inner.storage.store(&meta, &data)?;
        Ok(())
    }

    pub fn id(&self) -> DocId {
        self.inner.doc.read().id()
    }

    pub fn meta(&self) -> DocumentMeta {
        self.inner.meta.lock().clone()
    }

    /// Name of the schema the document was created with
    pub fn schema_name(&self) -> String {
        self.inner.meta.lock().schema.clone()
    }

    /// Cursor at the root of the current snapshot
    pub fn cursor(&self) -> Cursor {
        self.inner.doc.read().cursor()
    }

    /// Copy of the full document state
    pub fn state(&self) -> Causal {
        self.inner.doc.read().state().clone()
    }

    pub fn ctx(&self) -> DotSet {
        self.inner.doc.read().ctx().clone()
    }

    /// The delta a replica with context `ctx` needs to catch up
    pub fn unjoin(&self, ctx: &DotSet) -> Causal {
        self.inner.doc.read().unjoin(ctx)
    }

    /// Join `delta` into the document and flush it to storage.
    ///
    /// Nothing changes if the delta does not fit the schema or the write
    /// fails. Entries whose author may not write where they land are dropped.
    pub fn apply(&self, delta: Causal) -> Result<()> {
        let mut doc = self.inner.doc.write();
        let delta = doc.admit(delta)?;

        let next = doc.state().clone().joined(&delta);
        let data = rmp_serde::to_vec(&next)?;
        let mut meta = self.inner.meta.lock().clone();
        meta.touch();
        if let Err(e) = self.inner.storage.store(&meta, &data) {
            warn!(doc = %meta.id.short(), error = %e, "Failed to flush document");
            return Err(e.into());
        }

        doc.apply(delta)?;
        *self.inner.meta.lock() = meta;
        debug!(doc = %doc.id().short(), "Flushed document");
        Ok(())
    }
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc")
            .field("meta", &*self.inner.meta.lock())
            .finish()
    }
}
