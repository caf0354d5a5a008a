//! Dot counters of the local peer
//!
//! Every delta a cursor authors takes fresh counters from the document's
//! [`Clock`]. Counters handed out for deltas that were never applied still
//! count as used, so a clock backed by a [`ClockStore`] records its high-water
//! mark before a counter leaves it. Reopening a document starts from that mark
//! rather than from the highest counter in the stored state.

use crate::dot::Dot;
use crate::error::{Error, Result};
use crate::id::{DocId, PeerId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Durable high-water mark of the counters a peer has handed out
pub trait ClockStore: Send + Sync {
    /// Record that counters up to and including `counter` may be in use
    fn reserve(&self, doc: &DocId, counter: u64) -> Result<()>;
}

pub struct Clock {
    doc: DocId,
    peer: PeerId,
    last: Mutex<u64>,
    store: Option<Arc<dyn ClockStore>>,
}

impl Clock {
    /// A clock whose next counter is `last + 1`
    pub fn new(doc: DocId, peer: PeerId, last: u64) -> Self {
        Self {
            doc,
            peer,
            last: Mutex::new(last),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ClockStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Highest counter handed out or observed so far
    pub fn last(&self) -> u64 {
        *self.last.lock()
    }

    /// Take the next dot. The counter is reserved in the store first.
    pub fn next(&self) -> Result<Dot> {
        let mut last = self.last.lock();
        let counter = last
            .checked_add(1)
            .ok_or_else(|| Error::ClockExhausted(self.peer.to_string()))?;
        if let Some(store) = &self.store {
            store.reserve(&self.doc, counter)?;
        }
        *last = counter;
        Ok(Dot::new(self.peer, counter))
    }

    /// Never hand out `counter` or anything below it
    pub fn observe(&self, counter: u64) {
        let mut last = self.last.lock();
        *last = (*last).max(counter);
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clock")
            .field("peer", &self.peer)
            .field("last", &self.last())
            .field("durable", &self.store.is_some())
            .finish()
    }
}
