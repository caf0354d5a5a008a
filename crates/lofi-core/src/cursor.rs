//! Cursors: navigation, reads and delta authoring
//!
//! A cursor is a path into one snapshot of a document. Navigation returns new
//! cursors, reads look at the snapshot, and mutations return a [`Causal`]
//! describing the edit. Nothing changes until the delta is applied to the
//! document, so deltas can be batched and joined first.
//!
//! Mutations check the ACL of the snapshot first: content edits need `Write`
//! at the cursor path, grants and revocations need `Control` or `Own`.

use crate::acl::{Acl, Actor, Permission, Policy};
use crate::causal::{Causal, Entry, Leaf};
use crate::clock::Clock;
use crate::dot::Dot;
use crate::error::{Error, Result};
use crate::id::{DocId, PeerId, SchemaHash};
use crate::path::{Path, Primitive, PrimitiveKind, Segment, Selector};
use crate::position::Position;
use crate::schema::Schema;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Rust types that registers can hold
pub trait RegisterValue: Sized {
    const KIND: PrimitiveKind;

    fn from_primitive(value: Primitive) -> Option<Self>;
}

impl RegisterValue for bool {
    const KIND: PrimitiveKind = PrimitiveKind::Bool;

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl RegisterValue for u64 {
    const KIND: PrimitiveKind = PrimitiveKind::U64;

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::U64(v) => Some(v),
            _ => None,
        }
    }
}

impl RegisterValue for i64 {
    const KIND: PrimitiveKind = PrimitiveKind::I64;

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::I64(v) => Some(v),
            _ => None,
        }
    }
}

impl RegisterValue for String {
    const KIND: PrimitiveKind = PrimitiveKind::Str;

    fn from_primitive(value: Primitive) -> Option<Self> {
        match value {
            Primitive::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Values of a register at the time the iterator was created
#[derive(Debug, Clone)]
pub struct RegisterValues<T> {
    inner: std::vec::IntoIter<T>,
}

impl<T> Iterator for RegisterValues<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for RegisterValues<T> {}

/// An array element inserted through this cursor but not yet written
#[derive(Debug, Clone)]
struct PendingElement {
    id: Dot,
    path: Path,
    position: Position,
}

/// A live array element
#[derive(Debug, Clone)]
struct Element {
    id: Dot,
    position: Position,
    position_dots: Vec<Dot>,
}

/// Live elements of the array at `array`, in order
fn elements_at(state: &Causal, array: &Path) -> Vec<Element> {
    let mut live = BTreeSet::new();
    let mut positions: BTreeMap<Dot, Vec<(Dot, &Position)>> = BTreeMap::new();
    for (dot, entry) in state.entries_under(array) {
        if entry.path.len() != array.len() + 1 {
            continue;
        }
        let Some(Segment::Elem(id)) = entry.path.last() else {
            continue;
        };
        match &entry.leaf {
            Leaf::Anchor if dot == id => {
                live.insert(*id);
            }
            Leaf::Position(position) => positions.entry(*id).or_default().push((*dot, position)),
            _ => {}
        }
    }

    let mut elements: Vec<Element> = live
        .into_iter()
        .map(|id| {
            let found = positions.remove(&id).unwrap_or_default();
            // The most recent position wins; concurrent moves resolve by dot.
            let position = found
                .iter()
                .max_by_key(|(dot, _)| *dot)
                .map(|(_, position)| (*position).clone())
                .unwrap_or_default();
            Element {
                id,
                position,
                position_dots: found.iter().map(|(dot, _)| *dot).collect(),
            }
        })
        .collect();
    elements.sort_by(|a, b| (&a.position, a.id).cmp(&(&b.position, b.id)));
    elements
}

#[derive(Debug, Clone)]
pub struct Cursor {
    state: Arc<Causal>,
    doc: DocId,
    schema_hash: SchemaHash,
    peer: PeerId,
    clock: Arc<Clock>,
    path: Path,
    schema: Schema,
    pending: Vec<PendingElement>,
}

impl Cursor {
    pub(crate) fn new(
        state: Arc<Causal>,
        doc: DocId,
        schema: Schema,
        schema_hash: SchemaHash,
        peer: PeerId,
        clock: Arc<Clock>,
    ) -> Self {
        Self {
            state,
            doc,
            schema_hash,
            peer,
            clock,
            path: Path::root(),
            schema,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema of the node the cursor points at
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn doc_id(&self) -> DocId {
        self.doc
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    fn type_error(&self, expected: impl Into<String>) -> Error {
        Error::TypeError {
            expected: expected.into(),
            found: format!("{} at {}", self.schema.kind_name(), self.path),
        }
    }

    fn descend(&self, segment: Segment, schema: Schema) -> Cursor {
        Cursor {
            path: self.path.join(segment),
            schema,
            ..self.clone()
        }
    }

    fn next_dot(&self) -> Result<Dot> {
        self.clock.next()
    }

    fn denied(&self, permission: Permission) -> Error {
        Error::PermissionDenied(format!(
            "peer {} lacks {} at {}",
            self.peer.short(),
            permission,
            self.path
        ))
    }

    /// Fail unless the local peer holds `permission` at this path
    fn authorize(&self, permission: Permission) -> Result<()> {
        if self.acl_can(&self.peer, permission) {
            Ok(())
        } else {
            Err(self.denied(permission))
        }
    }

    /// Add the entries that bring pending array elements into existence
    fn finish(&self, mut delta: Causal) -> Result<Causal> {
        for pending in &self.pending {
            delta.insert(pending.id, Entry::new(pending.path.clone(), Leaf::Anchor));
            delta.insert(
                self.next_dot()?,
                Entry::new(pending.path.clone(), Leaf::Position(pending.position.clone())),
            );
        }
        Ok(delta)
    }

    // Navigation

    pub fn field(&self, name: &str) -> Result<Cursor> {
        let Schema::Struct(fields) = &self.schema else {
            return Err(self.type_error("struct"));
        };
        let schema = fields
            .get(name)
            .ok_or_else(|| Error::InvalidPath(format!("no field {:?} at {}", name, self.path)))?
            .clone();
        Ok(self.descend(Segment::Field(name.to_string()), schema))
    }

    pub fn map_key(&self, key: impl Into<Primitive>) -> Result<Cursor> {
        let Schema::Map { key: kind, value } = &self.schema else {
            return Err(self.type_error("map"));
        };
        let key = key.into();
        if key.kind() != *kind {
            return Err(self.type_error(format!("map with {} keys", key.kind())));
        }
        let schema = (**value).clone();
        Ok(self.descend(Segment::Key(key), schema))
    }

    pub fn map_key_bool(&self, key: bool) -> Result<Cursor> {
        self.map_key(key)
    }

    pub fn map_key_u64(&self, key: u64) -> Result<Cursor> {
        self.map_key(key)
    }

    pub fn map_key_i64(&self, key: i64) -> Result<Cursor> {
        self.map_key(key)
    }

    pub fn map_key_str(&self, key: &str) -> Result<Cursor> {
        self.map_key(key)
    }

    fn array_schema(&self) -> Result<&Schema> {
        match &self.schema {
            Schema::Array(elem) => Ok(elem),
            _ => Err(self.type_error("array")),
        }
    }

    pub fn array_length(&self) -> Result<usize> {
        self.array_schema()?;
        Ok(elements_at(&self.state, &self.path).len())
    }

    /// Cursor to the element currently at `index`
    pub fn array_index(&self, index: usize) -> Result<Cursor> {
        let elem = self.array_schema()?.clone();
        let elements = elements_at(&self.state, &self.path);
        let element = elements.get(index).ok_or(Error::OutOfRange {
            index,
            len: elements.len(),
        })?;
        Ok(self.descend(Segment::Elem(element.id), elem))
    }

    /// Cursor to a new element that will sit at `index`.
    ///
    /// The element comes into existence with the first delta written through
    /// the returned cursor (or any cursor derived from it).
    pub fn array_insert(&self, index: usize) -> Result<Cursor> {
        let elem = self.array_schema()?.clone();
        let elements = elements_at(&self.state, &self.path);
        if index > elements.len() {
            return Err(Error::OutOfRange {
                index,
                len: elements.len() + 1,
            });
        }
        let lo = index.checked_sub(1).map(|i| &elements[i].position);
        let hi = elements.get(index).map(|e| &e.position);
        let position = Position::between(lo, hi);

        let id = self.next_dot()?;
        let mut cursor = self.descend(Segment::Elem(id), elem);
        cursor.pending.push(PendingElement {
            id,
            path: cursor.path.clone(),
            position,
        });
        Ok(cursor)
    }

    /// Navigate by a selector such as `todos[2].title`
    pub fn walk(&self, selector: &str) -> Result<Cursor> {
        let mut cursor = self.clone();
        for step in Selector::parse(selector) {
            let step = step?;
            cursor = match (&cursor.schema, &step) {
                (Schema::Struct(_), Selector::Name(name)) => cursor.field(name)?,
                (Schema::Map { key, .. }, Selector::Name(name)) => {
                    cursor.map_key(Primitive::parse(*key, name)?)?
                }
                (Schema::Map { key: PrimitiveKind::U64, .. }, Selector::Index(i)) => {
                    let key = u64::try_from(*i)
                        .map_err(|_| Error::InvalidPath(format!("key {} out of range", i)))?;
                    cursor.map_key(key)?
                }
                (Schema::Map { key: PrimitiveKind::I64, .. }, Selector::Index(i)) => {
                    let key = i64::try_from(*i)
                        .map_err(|_| Error::InvalidPath(format!("key {} out of range", i)))?;
                    cursor.map_key(key)?
                }
                (Schema::Array(_), Selector::Index(i)) => cursor.array_index(*i)?,
                _ => {
                    return Err(Error::InvalidPath(format!(
                        "cannot apply {:?} to {} at {}",
                        step,
                        cursor.schema.kind_name(),
                        cursor.path
                    )))
                }
            };
        }
        Ok(cursor)
    }

    // Flags

    fn flag_dots(&self) -> Result<Vec<Dot>> {
        if self.schema != Schema::Flag {
            return Err(self.type_error("flag"));
        }
        Ok(self
            .state
            .entries_at(&self.path)
            .filter(|(_, entry)| entry.leaf == Leaf::Flag)
            .map(|(dot, _)| *dot)
            .collect())
    }

    pub fn flag_enabled(&self) -> Result<bool> {
        Ok(!self.flag_dots()?.is_empty())
    }

    pub fn flag_enable(&self) -> Result<Causal> {
        let observed = self.flag_dots()?;
        self.authorize(Permission::Write)?;
        let mut delta = Causal::new();
        for dot in observed {
            delta.supersede(dot);
        }
        delta.insert(self.next_dot()?, Entry::new(self.path.clone(), Leaf::Flag));
        self.finish(delta)
    }

    pub fn flag_disable(&self) -> Result<Causal> {
        let observed = self.flag_dots()?;
        self.authorize(Permission::Write)?;
        let mut delta = Causal::new();
        for dot in observed {
            delta.supersede(dot);
        }
        self.finish(delta)
    }

    // Registers

    fn register_kind(&self) -> Result<PrimitiveKind> {
        match self.schema {
            Schema::Reg(kind) => Ok(kind),
            _ => Err(self.type_error("register")),
        }
    }

    /// Distinct concurrent values, oldest write first
    pub fn register_primitives(&self) -> Result<Vec<Primitive>> {
        self.register_kind()?;
        let mut values: Vec<Primitive> = Vec::new();
        for (_, entry) in self.state.entries_at(&self.path) {
            if let Leaf::Value(value) = &entry.leaf {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        Ok(values)
    }

    pub fn register_values<T: RegisterValue>(&self) -> Result<RegisterValues<T>> {
        let kind = self.register_kind()?;
        if kind != T::KIND {
            return Err(self.type_error(format!("{} register", T::KIND)));
        }
        let values: Vec<T> = self
            .register_primitives()?
            .into_iter()
            .filter_map(T::from_primitive)
            .collect();
        Ok(RegisterValues {
            inner: values.into_iter(),
        })
    }

    pub fn reg_bools(&self) -> Result<RegisterValues<bool>> {
        self.register_values()
    }

    pub fn reg_u64s(&self) -> Result<RegisterValues<u64>> {
        self.register_values()
    }

    pub fn reg_i64s(&self) -> Result<RegisterValues<i64>> {
        self.register_values()
    }

    pub fn reg_strs(&self) -> Result<RegisterValues<String>> {
        self.register_values()
    }

    /// Overwrite every value this cursor can see with `value`
    pub fn register_assign(&self, value: impl Into<Primitive>) -> Result<Causal> {
        let value = value.into();
        let kind = self.register_kind()?;
        if value.kind() != kind {
            return Err(self.type_error(format!("{} register", value.kind())));
        }
        self.authorize(Permission::Write)?;
        let mut delta = Causal::new();
        for (dot, entry) in self.state.entries_at(&self.path) {
            if let Leaf::Value(_) = entry.leaf {
                delta.supersede(*dot);
            }
        }
        delta.insert(self.next_dot()?, Entry::new(self.path.clone(), Leaf::Value(value)));
        self.finish(delta)
    }

    pub fn reg_assign_bool(&self, value: bool) -> Result<Causal> {
        self.register_assign(value)
    }

    pub fn reg_assign_u64(&self, value: u64) -> Result<Causal> {
        self.register_assign(value)
    }

    pub fn reg_assign_i64(&self, value: i64) -> Result<Causal> {
        self.register_assign(value)
    }

    pub fn reg_assign_str(&self, value: &str) -> Result<Causal> {
        self.register_assign(value)
    }

    // Maps

    /// Keys holding any content
    pub fn map_keys(&self) -> Result<Vec<Primitive>> {
        if !matches!(self.schema, Schema::Map { .. }) {
            return Err(self.type_error("map"));
        }
        let keys: BTreeSet<Primitive> = self
            .state
            .entries_under(&self.path)
            .filter(|(_, entry)| !entry.is_policy())
            .filter_map(|(_, entry)| match self.path.child_towards(&entry.path) {
                Some(Segment::Key(key)) => Some(key.clone()),
                _ => None,
            })
            .collect();
        Ok(keys.into_iter().collect())
    }

    /// Remove the map entry this cursor points at. Policies stay.
    pub fn map_remove(&self) -> Result<Causal> {
        if !matches!(self.path.last(), Some(Segment::Key(_))) {
            return Err(self.type_error("map entry"));
        }
        self.authorize(Permission::Write)?;
        let mut delta = Causal::new();
        for (dot, entry) in self.state.entries_under(&self.path) {
            if !entry.is_policy() {
                delta.supersede(*dot);
            }
        }
        Ok(delta)
    }

    // Arrays

    /// The array this element cursor belongs to and the element id
    fn element(&self) -> Result<(Path, Dot)> {
        match (self.path.last(), self.path.parent()) {
            (Some(Segment::Elem(id)), Some(array)) => {
                if self.pending.iter().any(|p| p.id == *id) {
                    return Err(Error::NotFound(format!("element {} is not inserted yet", id)));
                }
                if self.state.get(id).is_none() {
                    return Err(Error::NotFound(format!("element {} was deleted", id)));
                }
                Ok((array, *id))
            }
            _ => Err(self.type_error("array element")),
        }
    }

    /// Move the element this cursor points at to index `to`
    pub fn array_move(&self, to: usize) -> Result<Causal> {
        let (array, id) = self.element()?;
        self.authorize(Permission::Write)?;
        let elements = elements_at(&self.state, &array);
        if to >= elements.len() {
            return Err(Error::OutOfRange {
                index: to,
                len: elements.len(),
            });
        }
        let others: Vec<&Element> = elements.iter().filter(|e| e.id != id).collect();
        let lo = to.checked_sub(1).and_then(|i| others.get(i)).map(|e| &e.position);
        let hi = others.get(to).map(|e| &e.position);

        let mut delta = Causal::new();
        if let Some(current) = elements.iter().find(|e| e.id == id) {
            for dot in &current.position_dots {
                delta.supersede(*dot);
            }
        }
        delta.insert(
            self.next_dot()?,
            Entry::new(self.path.clone(), Leaf::Position(Position::between(lo, hi))),
        );
        self.finish(delta)
    }

    /// Delete the element this cursor points at, with all of its content
    pub fn array_delete(&self) -> Result<Causal> {
        self.element()?;
        self.authorize(Permission::Write)?;
        let mut delta = Causal::new();
        for (dot, entry) in self.state.entries_under(&self.path) {
            if !entry.is_policy() {
                delta.supersede(*dot);
            }
        }
        Ok(delta)
    }

    // Access control

    pub fn acl(&self) -> Acl {
        Acl::evaluate(&self.state, &self.doc, &self.schema_hash)
    }

    pub fn acl_can(&self, peer: &PeerId, permission: Permission) -> bool {
        self.acl().can(peer, permission, &self.path)
    }

    /// Grant `permission` at this path. Handing out `Read` or `Write` needs
    /// `Control`, anything else needs `Own`.
    pub fn acl_grant(&self, actor: Actor, permission: Permission) -> Result<Causal> {
        if !self.acl().may_grant(&self.peer, permission, &self.path) {
            let needed = if permission.controllable() {
                Permission::Control
            } else {
                Permission::Own
            };
            return Err(self.denied(needed));
        }
        let mut delta = Causal::new();
        delta.insert(
            self.next_dot()?,
            Entry::new(
                self.path.clone(),
                Leaf::Policy(Policy::Grant {
                    actor,
                    permission,
                    nonce: rand::random(),
                }),
            ),
        );
        self.finish(delta)
    }

    /// Revoke every effective grant at this path that gives `actor` at
    /// least `permission`. The delta is empty if there is none.
    pub fn acl_revoke(&self, actor: Actor, permission: Permission) -> Result<Causal> {
        let acl = self.acl();
        let targets: Vec<_> = acl
            .grants_at(&self.path)
            .filter(|grant| grant.actor == actor && grant.permission >= permission)
            .collect();
        if let Some(grant) = targets.iter().find(|grant| !acl.may_revoke(&self.peer, grant)) {
            return Err(self.denied(grant.permission.max(Permission::Control)));
        }
        let mut delta = Causal::new();
        for grant in targets {
            delta.insert(
                self.next_dot()?,
                Entry::new(
                    self.path.clone(),
                    Leaf::Policy(Policy::Revoke {
                        target: grant.dot,
                        nonce: grant.nonce,
                    }),
                ),
            );
        }
        Ok(delta)
    }
}
