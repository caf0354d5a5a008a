//! Causal deltas: a dot store paired with a causal context
//!
//! Every piece of document state is an [`Entry`] stored under the [`Dot`] that
//! created it. The context records every dot ever observed, so a dot that is
//! in the context but missing from the store has been removed. Joining two
//! causals therefore needs no tombstones: an entry survives unless the other
//! side has seen its dot and dropped it.

use crate::acl::Policy;
use crate::dot::{Dot, DotSet};
use crate::path::{Path, Primitive};
use crate::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The payload of a stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Leaf {
    /// An enable event of a flag
    Flag,
    /// A register write
    Value(Primitive),
    /// Existence of an array element; the entry's dot is the element id
    Anchor,
    /// Ordering of an array element
    Position(Position),
    /// Access control
    Policy(Policy),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub path: Path,
    pub leaf: Leaf,
}

impl Entry {
    pub fn new(path: Path, leaf: Leaf) -> Self {
        Self { path, leaf }
    }

    pub fn is_policy(&self) -> bool {
        matches!(self.leaf, Leaf::Policy(_))
    }
}

/// A set of entries together with the context they were produced in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Causal {
    store: BTreeMap<Dot, Entry>,
    ctx: DotSet,
}

impl Causal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ctx(&self) -> &DotSet {
        &self.ctx
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty() && self.ctx.is_empty()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn get(&self, dot: &Dot) -> Option<&Entry> {
        self.store.get(dot)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Dot, &Entry)> + '_ {
        self.store.iter()
    }

    /// Dots of the live entries, in order
    pub fn dots(&self) -> impl Iterator<Item = Dot> + '_ {
        self.store.keys().copied()
    }

    /// Entries at `path` or below it
    pub fn entries_under<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a Dot, &'a Entry)> + 'a {
        self.store
            .iter()
            .filter(move |(_, entry)| path.is_ancestor_of(&entry.path))
    }

    /// Entries exactly at `path`
    pub fn entries_at<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = (&'a Dot, &'a Entry)> + 'a {
        self.store.iter().filter(move |(_, entry)| entry.path == *path)
    }

    /// Add a new entry; its dot joins the context
    pub(crate) fn insert(&mut self, dot: Dot, entry: Entry) {
        self.ctx.insert(dot);
        self.store.insert(dot, entry);
    }

    /// Record `dot` as observed without keeping an entry for it, which removes
    /// it on join
    pub(crate) fn supersede(&mut self, dot: Dot) {
        self.ctx.insert(dot);
    }

    /// Drop the entries stored under `dots` along with the dots themselves,
    /// as if they had never been seen
    pub(crate) fn forget(&mut self, dots: &DotSet) {
        self.store.retain(|dot, _| !dots.contains(dot));
        self.ctx = self.ctx.difference(dots);
    }

    /// Merge `other` into `self`.
    ///
    /// An entry survives if the other side still stores it or has never seen
    /// its dot. Contexts are unioned.
    pub fn join(&mut self, other: &Causal) {
        self.store
            .retain(|dot, _| other.store.contains_key(dot) || !other.ctx.contains(dot));
        for (dot, entry) in &other.store {
            if !self.ctx.contains(dot) {
                self.store.insert(*dot, entry.clone());
            }
        }
        self.ctx.union(&other.ctx);
    }

    pub fn joined(mut self, other: &Causal) -> Causal {
        self.join(other);
        self
    }

    /// The delta a replica whose context is `ctx` is missing.
    ///
    /// Contains every entry the replica has not seen, plus the removal of
    /// every dot it has seen that is no longer live here.
    pub fn unjoin(&self, ctx: &DotSet) -> Causal {
        let store: BTreeMap<Dot, Entry> = self
            .store
            .iter()
            .filter(|(dot, _)| !ctx.contains(dot))
            .map(|(dot, entry)| (*dot, entry.clone()))
            .collect();
        let known_live: DotSet = self
            .store
            .keys()
            .filter(|dot| ctx.contains(dot))
            .copied()
            .collect();
        Causal {
            store,
            ctx: self.ctx.difference(&known_live),
        }
    }

    /// True if every stored dot is covered by the context
    pub fn is_well_formed(&self) -> bool {
        self.store.keys().all(|dot| self.ctx.contains(dot))
    }
}
