//! Document types and operations

use crate::acl::{Acl, Actor, Permission, Policy};
use crate::causal::{Causal, Entry, Leaf};
use crate::clock::{Clock, ClockStore};
use crate::cursor::Cursor;
use crate::dot::{Dot, DotSet};
use crate::error::{Error, Result};
use crate::id::{DocId, PeerId, SchemaHash};
use crate::path::Path;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Document metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocId,
    pub schema: String,
    pub schema_hash: SchemaHash,
    pub created_at: u64,
    pub updated_at: u64,
    pub version: u64,
}

impl DocumentMeta {
    pub fn new(id: DocId, schema: impl Into<String>, schema_hash: SchemaHash) -> Self {
        let now = now_millis();

        Self {
            id,
            schema: schema.into(),
            schema_hash,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Record a successful apply
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = now_millis();
    }
}

/// A replicated document: the join of every delta applied to it
pub struct Document {
    id: DocId,
    peer: PeerId,
    schema: Schema,
    schema_hash: SchemaHash,
    state: Arc<Causal>,
    /// Counters of this peer. Shared with cursors so deltas authored before
    /// an apply still get distinct dots.
    clock: Arc<Clock>,
}

impl Document {
    /// An empty document, e.g. one announced by another peer but not yet synced
    pub fn new(id: DocId, peer: PeerId, schema: Schema) -> Result<Self> {
        Self::from_state(id, peer, schema, Causal::new())
    }

    /// Restore a document from stored state
    pub fn from_state(id: DocId, peer: PeerId, schema: Schema, state: Causal) -> Result<Self> {
        let schema_hash = schema.hash()?;
        let clock = Arc::new(Clock::new(id, peer, state.ctx().max(&peer)));
        Ok(Self {
            id,
            peer,
            schema,
            schema_hash,
            state: Arc::new(state),
            clock,
        })
    }

    /// Create a brand new document owned by `peer`.
    ///
    /// The genesis entry fixes the document id; `peer` is also granted `Own`
    /// on the root.
    pub fn create(peer: PeerId, schema: Schema) -> Result<Self> {
        let schema_hash = schema.hash()?;
        let nonce: u64 = rand::random();
        let genesis = Dot::new(peer, 1);
        let id = DocId::derive(&schema_hash, &peer, genesis.counter, nonce);

        let mut state = Causal::new();
        state.insert(
            genesis,
            Entry::new(Path::root(), Leaf::Policy(Policy::Genesis { nonce })),
        );
        state.insert(
            Dot::new(peer, 2),
            Entry::new(
                Path::root(),
                Leaf::Policy(Policy::Grant {
                    actor: Actor::Peer(peer),
                    permission: Permission::Own,
                    nonce: rand::random(),
                }),
            ),
        );

        debug!(doc = %id.short(), peer = %peer.short(), "Created document");
        Self::from_state(id, peer, schema, state)
    }

    /// Back the local clock with `store`, starting above `floor`, the last
    /// counter the store has reserved
    pub fn with_clock_store(mut self, floor: u64, store: Arc<dyn ClockStore>) -> Self {
        let last = self.clock.last().max(floor);
        self.clock = Arc::new(Clock::new(self.id, self.peer, last).with_store(store));
        self
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_hash(&self) -> SchemaHash {
        self.schema_hash
    }

    pub fn state(&self) -> &Causal {
        &self.state
    }

    pub fn ctx(&self) -> &DotSet {
        self.state.ctx()
    }

    /// Cursor at the root of the current snapshot
    pub fn cursor(&self) -> Cursor {
        Cursor::new(
            self.state.clone(),
            self.id,
            self.schema.clone(),
            self.schema_hash,
            self.peer,
            self.clock.clone(),
        )
    }

    pub fn acl(&self) -> Acl {
        Acl::evaluate(&self.state, &self.id, &self.schema_hash)
    }

    /// Check a delta against the schema without applying it
    pub fn validate(&self, delta: &Causal) -> Result<()> {
        if !delta.is_well_formed() {
            return Err(Error::InvalidEncoding(
                "delta stores dots outside its context".into(),
            ));
        }
        for (dot, entry) in delta.entries() {
            if let Leaf::Position(position) = &entry.leaf {
                if !position.is_canonical() {
                    return Err(Error::InvalidEncoding(format!(
                        "entry {} carries non-canonical position {:?}",
                        dot, position
                    )));
                }
            }
            let genesis_off_root = matches!(entry.leaf, Leaf::Policy(Policy::Genesis { .. }))
                && !entry.path.is_root();
            if genesis_off_root || !self.schema.accepts(entry.path.segments(), &entry.leaf) {
                return Err(Error::SchemaMismatch(format!(
                    "entry {} at {} does not fit the document schema",
                    dot, entry.path
                )));
            }
        }
        Ok(())
    }

    /// Validate `delta` and strip the content entries whose author lacks
    /// `Write` at the entry path.
    ///
    /// Permissions are judged against the document joined with the delta, so
    /// grants travelling with the content count. Stripped entries leave the
    /// context too, and arrive again with a later sync once a grant is known.
    pub fn admit(&self, mut delta: Causal) -> Result<Causal> {
        self.validate(&delta)?;
        let acl = Acl::evaluate(
            &self.state.as_ref().clone().joined(&delta),
            &self.id,
            &self.schema_hash,
        );
        let denied: DotSet = delta
            .entries()
            .filter(|(dot, entry)| {
                !entry.is_policy() && !acl.can(&dot.peer, Permission::Write, &entry.path)
            })
            .map(|(dot, _)| *dot)
            .collect();
        if !denied.is_empty() {
            info!(
                doc = %self.id.short(),
                dropped = denied.len(),
                "Dropped entries from unauthorized authors"
            );
            delta.forget(&denied);
        }
        Ok(delta)
    }

    /// Join `delta` into the document.
    ///
    /// Fails without side effects if any entry does not fit the schema.
    /// Entries from authors without `Write` are dropped, see [`Document::admit`].
    /// Applying the same delta twice, or deltas out of order, is safe.
    pub fn apply(&mut self, delta: Causal) -> Result<()> {
        let delta = self.admit(delta)?;
        // Cursors keep the previous snapshot alive; copy on write.
        Arc::make_mut(&mut self.state).join(&delta);
        self.clock.observe(self.state.ctx().max(&self.peer));
        debug!(
            doc = %self.id.short(),
            entries = delta.len(),
            live = self.state.len(),
            "Applied delta"
        );
        Ok(())
    }

    /// The delta a replica with context `ctx` needs to catch up
    pub fn unjoin(&self, ctx: &DotSet) -> Causal {
        self.state.unjoin(ctx)
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("entries", &self.state.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Primitive, PrimitiveKind, Segment};
    use crate::position::Position;
    use crate::schema::tests::todo_schema;
    use std::collections::BTreeSet;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    /// Two replicas of one document, created by peer 1. Peer 2 may write.
    fn replicas() -> (Document, Document) {
        let mut a = Document::create(peer(1), todo_schema()).unwrap();
        let grant = a
            .cursor()
            .acl_grant(Actor::Peer(peer(2)), Permission::Write)
            .unwrap();
        a.apply(grant).unwrap();
        let mut b = Document::new(a.id(), peer(2), todo_schema()).unwrap();
        b.apply(a.unjoin(b.ctx())).unwrap();
        (a, b)
    }

    fn field(name: &str) -> Path {
        Path::root().join(Segment::Field(name.into()))
    }

    /// A register write at `title` under `dot`, bypassing the cursor checks
    fn raw_title(dot: Dot, text: &str) -> Causal {
        let mut delta = Causal::new();
        delta.insert(
            dot,
            Entry::new(field("title"), Leaf::Value(Primitive::Str(text.into()))),
        );
        delta
    }

    fn sync(from: &Document, to: &mut Document) {
        let delta = from.unjoin(to.ctx());
        to.apply(delta).unwrap();
    }

    fn title(doc: &Document) -> Vec<String> {
        doc.cursor()
            .field("title")
            .unwrap()
            .reg_strs()
            .unwrap()
            .collect()
    }

    fn todo_titles(doc: &Document) -> Vec<String> {
        let todos = doc.cursor().field("todos").unwrap();
        (0..todos.array_length().unwrap())
            .flat_map(|i| {
                todos
                    .array_index(i)
                    .unwrap()
                    .field("title")
                    .unwrap()
                    .reg_strs()
                    .unwrap()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn push_todo(doc: &mut Document, text: &str) {
        let todos = doc.cursor().field("todos").unwrap();
        let len = todos.array_length().unwrap();
        let delta = todos
            .array_insert(len)
            .unwrap()
            .field("title")
            .unwrap()
            .reg_assign_str(text)
            .unwrap();
        doc.apply(delta).unwrap();
    }

    #[test]
    fn test_create_sets_root_authority() {
        let doc = Document::create(peer(1), todo_schema()).unwrap();
        assert_eq!(doc.acl().root(), Some(peer(1)));
        assert!(doc.cursor().acl_can(&peer(1), Permission::Own));
        assert!(!doc.cursor().acl_can(&peer(2), Permission::Read));
    }

    #[test]
    fn test_register_assign_then_read() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        let delta = doc.cursor().field("title").unwrap().reg_assign_str("groceries").unwrap();
        doc.apply(delta).unwrap();
        assert_eq!(title(&doc), vec!["groceries"]);
    }

    #[test]
    fn test_unwritten_register_is_empty() {
        let doc = Document::create(peer(1), todo_schema()).unwrap();
        assert!(title(&doc).is_empty());
    }

    #[test]
    fn test_concurrent_assigns_converge_then_collapse() {
        let (mut a, mut b) = replicas();
        let tags_a = a.cursor().field("tags").unwrap().map_key_str("x").unwrap();
        let tags_b = b.cursor().field("tags").unwrap().map_key_str("x").unwrap();
        let da = tags_a.reg_assign_u64(1).unwrap();
        let db = tags_b.reg_assign_u64(2).unwrap();
        a.apply(da.clone()).unwrap();
        b.apply(db.clone()).unwrap();
        a.apply(db).unwrap();
        b.apply(da).unwrap();

        let read = |doc: &Document| -> BTreeSet<u64> {
            doc.cursor()
                .walk("tags.x")
                .unwrap()
                .reg_u64s()
                .unwrap()
                .collect()
        };
        assert_eq!(read(&a), BTreeSet::from([1, 2]));
        assert_eq!(read(&b), BTreeSet::from([1, 2]));

        let d3 = a.cursor().walk("tags.x").unwrap().reg_assign_u64(3).unwrap();
        a.apply(d3.clone()).unwrap();
        b.apply(d3).unwrap();
        assert_eq!(read(&a), BTreeSet::from([3]));
        assert_eq!(read(&b), BTreeSet::from([3]));
    }

    #[test]
    fn test_flag_enable_wins_over_concurrent_disable() {
        let (mut a, mut b) = replicas();
        let enable = a.cursor().field("archived").unwrap().flag_enable().unwrap();
        a.apply(enable.clone()).unwrap();
        b.apply(enable).unwrap();
        assert!(b.cursor().field("archived").unwrap().flag_enabled().unwrap());

        let disable = a.cursor().field("archived").unwrap().flag_disable().unwrap();
        let reenable = b.cursor().field("archived").unwrap().flag_enable().unwrap();
        a.apply(disable.clone()).unwrap();
        assert!(!a.cursor().field("archived").unwrap().flag_enabled().unwrap());
        b.apply(reenable.clone()).unwrap();
        a.apply(reenable).unwrap();
        b.apply(disable).unwrap();

        assert!(a.cursor().field("archived").unwrap().flag_enabled().unwrap());
        assert!(b.cursor().field("archived").unwrap().flag_enabled().unwrap());
    }

    #[test]
    fn test_map_remove_keeps_concurrent_writes() {
        let (mut a, mut b) = replicas();
        let first = a.cursor().walk("tags.urgent").unwrap().reg_assign_u64(1).unwrap();
        a.apply(first.clone()).unwrap();
        b.apply(first).unwrap();

        let remove = a.cursor().walk("tags.urgent").unwrap().map_remove().unwrap();
        let concurrent = b.cursor().walk("tags.urgent").unwrap().reg_assign_u64(5).unwrap();
        a.apply(remove.clone()).unwrap();
        assert!(a.cursor().field("tags").unwrap().map_keys().unwrap().is_empty());

        a.apply(concurrent.clone()).unwrap();
        b.apply(concurrent).unwrap();
        b.apply(remove).unwrap();
        for doc in [&a, &b] {
            let values: Vec<u64> = doc.cursor().walk("tags.urgent").unwrap().reg_u64s().unwrap().collect();
            assert_eq!(values, vec![5]);
            assert_eq!(
                doc.cursor().field("tags").unwrap().map_keys().unwrap(),
                vec![Primitive::Str("urgent".into())]
            );
        }
    }

    #[test]
    fn test_array_insert_order_and_delete() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        push_todo(&mut doc, "milk");
        push_todo(&mut doc, "eggs");
        let front = doc
            .cursor()
            .field("todos")
            .unwrap()
            .array_insert(0)
            .unwrap()
            .field("title")
            .unwrap()
            .reg_assign_str("bread")
            .unwrap();
        doc.apply(front).unwrap();
        assert_eq!(todo_titles(&doc), vec!["bread", "milk", "eggs"]);

        let delete = doc.cursor().walk("todos[1]").unwrap().array_delete().unwrap();
        doc.apply(delete).unwrap();
        assert_eq!(todo_titles(&doc), vec!["bread", "eggs"]);
        assert!(matches!(
            doc.cursor().field("todos").unwrap().array_index(2),
            Err(Error::OutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_array_move() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        for text in ["a", "b", "c"] {
            push_todo(&mut doc, text);
        }
        let mv = doc.cursor().walk("todos[0]").unwrap().array_move(2).unwrap();
        doc.apply(mv).unwrap();
        assert_eq!(todo_titles(&doc), vec!["b", "c", "a"]);

        let mv = doc.cursor().walk("todos[2]").unwrap().array_move(1).unwrap();
        doc.apply(mv).unwrap();
        assert_eq!(todo_titles(&doc), vec!["b", "a", "c"]);

        assert!(matches!(
            doc.cursor().walk("todos[0]").unwrap().array_move(3),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_concurrent_move_of_deleted_element_is_noop() {
        let (mut a, mut b) = replicas();
        for text in ["a", "b"] {
            push_todo(&mut a, text);
        }
        sync(&a, &mut b);

        let delete = a.cursor().walk("todos[0]").unwrap().array_delete().unwrap();
        let mv = b.cursor().walk("todos[0]").unwrap().array_move(1).unwrap();
        a.apply(delete.clone()).unwrap();
        b.apply(mv.clone()).unwrap();
        a.apply(mv).unwrap();
        b.apply(delete).unwrap();

        assert_eq!(todo_titles(&a), vec!["b"]);
        assert_eq!(todo_titles(&b), vec!["b"]);
    }

    #[test]
    fn test_concurrent_inserts_converge() {
        let (mut a, mut b) = replicas();
        push_todo(&mut a, "from a");
        push_todo(&mut b, "from b");
        sync(&a, &mut b);
        sync(&b, &mut a);
        assert_eq!(todo_titles(&a), todo_titles(&b));
        assert_eq!(todo_titles(&a).len(), 2);
    }

    #[test]
    fn test_pending_element_cannot_move_or_delete() {
        let doc = Document::create(peer(1), todo_schema()).unwrap();
        let pending = doc.cursor().field("todos").unwrap().array_insert(0).unwrap();
        assert!(matches!(pending.array_move(0), Err(Error::NotFound(_))));
        assert!(matches!(pending.array_delete(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_type_errors() {
        let doc = Document::create(peer(1), todo_schema()).unwrap();
        let root = doc.cursor();
        assert!(matches!(root.flag_enabled(), Err(Error::TypeError { .. })));
        assert!(matches!(root.array_length(), Err(Error::TypeError { .. })));
        assert!(matches!(root.map_key_str("x"), Err(Error::TypeError { .. })));
        let title = root.field("title").unwrap();
        assert!(matches!(title.reg_u64s(), Err(Error::TypeError { .. })));
        assert!(matches!(title.reg_assign_u64(1), Err(Error::TypeError { .. })));
        assert!(matches!(title.field("x"), Err(Error::TypeError { .. })));
        let tags = root.field("tags").unwrap();
        assert!(matches!(tags.map_key_u64(1), Err(Error::TypeError { .. })));
        assert!(matches!(tags.map_remove(), Err(Error::TypeError { .. })));
    }

    #[test]
    fn test_apply_rejects_schema_mismatch_without_side_effects() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        let other = Document::create(peer(2), Schema::Struct(
            [("title".to_string(), Schema::Reg(PrimitiveKind::U64))].into(),
        ))
        .unwrap();
        let bad = other.cursor().field("title").unwrap().reg_assign_u64(3).unwrap();
        let before = doc.state().clone();

        assert!(matches!(doc.apply(bad), Err(Error::SchemaMismatch(_))));
        assert_eq!(*doc.state(), before);
    }

    #[test]
    fn test_apply_is_idempotent_and_order_independent() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        let genesis = doc.unjoin(&DotSet::new());
        let c = doc.cursor();
        let d1 = c.field("title").unwrap().reg_assign_str("one").unwrap();
        let d2 = c.field("archived").unwrap().flag_enable().unwrap();
        let d3 = c.walk("tags.k").unwrap().reg_assign_u64(9).unwrap();

        let mut forward = Document::new(doc.id(), peer(3), todo_schema()).unwrap();
        let mut backward = Document::new(doc.id(), peer(3), todo_schema()).unwrap();
        let mut batched = Document::new(doc.id(), peer(3), todo_schema()).unwrap();
        for replica in [&mut forward, &mut backward, &mut batched] {
            replica.apply(genesis.clone()).unwrap();
        }
        for d in [&d1, &d2, &d3, &d1] {
            forward.apply(d.clone()).unwrap();
        }
        for d in [&d3, &d2, &d2, &d1] {
            backward.apply(d.clone()).unwrap();
        }
        batched
            .apply(d1.clone().joined(&d2).joined(&d3))
            .unwrap();
        assert_eq!(forward.state(), backward.state());
        assert_eq!(forward.state(), batched.state());

        // Deltas authored from one cursor before applying get distinct dots.
        doc.apply(d1).unwrap();
        doc.apply(d2).unwrap();
        doc.apply(d3).unwrap();
        assert_eq!(title(&doc), vec!["one"]);
    }

    #[test]
    fn test_cursor_snapshot_is_stable() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        let before = doc.cursor().field("title").unwrap();
        let delta = before.reg_assign_str("x").unwrap();
        doc.apply(delta).unwrap();
        assert_eq!(before.reg_strs().unwrap().count(), 0);
        assert_eq!(title(&doc), vec!["x"]);
    }

    #[test]
    fn test_acl_grant_and_revoke_through_cursor() {
        let (mut a, mut b) = replicas();
        let notes = a.cursor().field("tags").unwrap();
        let grant = notes.acl_grant(Actor::Peer(peer(3)), Permission::Write).unwrap();
        a.apply(grant).unwrap();
        sync(&a, &mut b);
        assert!(b.cursor().field("tags").unwrap().acl_can(&peer(3), Permission::Write));
        assert!(b.cursor().walk("tags.x").unwrap().acl_can(&peer(3), Permission::Read));
        assert!(!b.cursor().acl_can(&peer(3), Permission::Read));

        // Peer 2 only holds Write and may not take the grant back.
        let tags_b = b.cursor().field("tags").unwrap();
        assert!(matches!(
            tags_b.acl_revoke(Actor::Peer(peer(3)), Permission::Write),
            Err(Error::PermissionDenied(_))
        ));

        let revoke = a
            .cursor()
            .field("tags")
            .unwrap()
            .acl_revoke(Actor::Peer(peer(3)), Permission::Write)
            .unwrap();
        assert_eq!(revoke.len(), 1);
        a.apply(revoke).unwrap();
        sync(&a, &mut b);
        assert!(!b.cursor().field("tags").unwrap().acl_can(&peer(3), Permission::Write));
        let none = a
            .cursor()
            .field("tags")
            .unwrap()
            .acl_revoke(Actor::Peer(peer(3)), Permission::Write)
            .unwrap();
        assert!(none.is_empty());

        // Removing a map key leaves the policies stored under it.
        let keyed = a.cursor().walk("tags.x").unwrap();
        a.apply(keyed.acl_grant(Actor::Anyone, Permission::Read).unwrap()).unwrap();
        let remove = a.cursor().walk("tags.x").unwrap().map_remove().unwrap();
        assert!(remove.ctx().is_empty());
    }

    #[test]
    fn test_cursor_refuses_unauthorized_edits() {
        let (a, _) = replicas();
        let mut c = Document::new(a.id(), peer(3), todo_schema()).unwrap();
        sync(&a, &mut c);

        let title = c.cursor().field("title").unwrap();
        assert!(matches!(title.reg_assign_str("hijack"), Err(Error::PermissionDenied(_))));
        assert!(matches!(
            c.cursor().field("archived").unwrap().flag_enable(),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            c.cursor().acl_grant(Actor::Peer(peer(3)), Permission::Read),
            Err(Error::PermissionDenied(_))
        ));

        // Write does not include handing out rights.
        let (_, b) = replicas();
        assert!(b.cursor().field("title").unwrap().reg_assign_str("ok").is_ok());
        assert!(matches!(
            b.cursor().acl_grant(Actor::Peer(peer(3)), Permission::Read),
            Err(Error::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_apply_drops_entries_from_unauthorized_authors() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        let forged = raw_title(Dot::new(peer(3), 1), "hijack");

        doc.apply(forged.clone()).unwrap();
        assert!(title(&doc).is_empty());
        assert!(!doc.ctx().contains(&Dot::new(peer(3), 1)));

        // Once the author holds Write the same entry is accepted.
        let grant = doc
            .cursor()
            .field("title")
            .unwrap()
            .acl_grant(Actor::Peer(peer(3)), Permission::Write)
            .unwrap();
        doc.apply(grant).unwrap();
        doc.apply(forged).unwrap();
        assert_eq!(title(&doc), vec!["hijack"]);
    }

    #[test]
    fn test_grant_travelling_with_content_admits_it() {
        let doc = Document::create(peer(1), todo_schema()).unwrap();
        let grant = doc
            .cursor()
            .acl_grant(Actor::Peer(peer(3)), Permission::Write)
            .unwrap();
        let batch = grant.joined(&raw_title(Dot::new(peer(3), 1), "mine"));

        let mut replica = Document::new(doc.id(), peer(4), todo_schema()).unwrap();
        replica.apply(doc.unjoin(&DotSet::new()).joined(&batch)).unwrap();
        assert_eq!(title(&replica), vec!["mine"]);
    }

    #[test]
    fn test_apply_rejects_non_canonical_positions() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        push_todo(&mut doc, "a");
        let element = doc.cursor().walk("todos[0]").unwrap().path().clone();

        let mut padded = Causal::new();
        padded.insert(
            Dot::new(peer(1), 90),
            Entry::new(element, Leaf::Position(Position::from_bytes(vec![1, 0]))),
        );
        let before = doc.state().clone();
        assert!(matches!(doc.apply(padded), Err(Error::InvalidEncoding(_))));
        assert_eq!(*doc.state(), before);
        push_todo(&mut doc, "b");
        assert_eq!(todo_titles(&doc), vec!["a", "b"]);
    }

    #[test]
    fn test_move_between_equal_neighbours_lands_after_both() {
        let (mut a, mut b) = replicas();
        // Both inserts into the empty array take the same position.
        push_todo(&mut a, "from a");
        push_todo(&mut b, "from b");
        sync(&a, &mut b);
        sync(&b, &mut a);
        push_todo(&mut a, "c");
        assert_eq!(todo_titles(&a), vec!["from a", "from b", "c"]);

        // No position fits between the two, so the element ends up after the
        // upper neighbour rather than at index 1.
        let mv = a.cursor().walk("todos[2]").unwrap().array_move(1).unwrap();
        a.apply(mv).unwrap();
        assert_eq!(todo_titles(&a), vec!["from a", "from b", "c"]);
    }

    #[test]
    fn test_exhausted_clock_fails_instead_of_wrapping() {
        let mut doc = Document::create(peer(1), todo_schema()).unwrap();
        doc.apply(raw_title(Dot::new(peer(1), u64::MAX), "last")).unwrap();
        assert_eq!(title(&doc), vec!["last"]);
        assert!(matches!(
            doc.cursor().field("title").unwrap().reg_assign_str("next"),
            Err(Error::ClockExhausted(_))
        ));
    }

    #[test]
    fn test_walk_rejects_keys_out_of_range() {
        let schema = Schema::Map {
            key: PrimitiveKind::I64,
            value: Box::new(Schema::Reg(PrimitiveKind::U64)),
        };
        let doc = Document::create(peer(1), schema).unwrap();
        assert!(doc.cursor().walk("[5]").is_ok());
        assert!(matches!(
            doc.cursor().walk("[9223372036854775808]"),
            Err(Error::InvalidPath(_))
        ));
    }
}
