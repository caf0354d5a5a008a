//! Access control
//!
//! Policies are ordinary causal entries, so every replica that has seen the
//! same events computes the same answers. Evaluation runs in two steps:
//!
//! 1. Grants are authorized by a fixpoint that ignores revocations: a grant
//!    counts if its author is the document's root authority, or if another
//!    authorized grant lets the author hand out that permission at an
//!    ancestor path.
//! 2. A revocation removes one authorized grant if its author is the root
//!    authority, the grant's author, or holds at least `Control` (and at
//!    least the revoked permission) at an ancestor path.
//!
//! A revocation quotes the random nonce of the grant it targets and sits at
//! the grant's path, so only a peer that has seen the grant can revoke it.
//! A revocation naming a dot that is not (yet) such a grant stays inert.
//!
//! Cursors refuse to author edits their peer may not make, and documents drop
//! entries whose author lacks `Write` at the entry path when they join a
//! delta.

use crate::causal::{Causal, Leaf};
use crate::dot::Dot;
use crate::error::{Error, Result};
use crate::id::{DocId, PeerId, SchemaHash};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Control,
    Own,
}

impl Permission {
    /// Permissions a `Control` holder may grant to others
    pub fn controllable(self) -> bool {
        matches!(self, Permission::Read | Permission::Write)
    }
}

impl TryFrom<u8> for Permission {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Permission::Read),
            1 => Ok(Permission::Write),
            2 => Ok(Permission::Control),
            3 => Ok(Permission::Own),
            other => Err(Error::InvalidEncoding(format!("unknown permission {}", other))),
        }
    }
}

impl From<Permission> for u8 {
    fn from(perm: Permission) -> Self {
        perm as u8
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Permission::Read => write!(f, "read"),
            Permission::Write => write!(f, "write"),
            Permission::Control => write!(f, "control"),
            Permission::Own => write!(f, "own"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" | "r" => Ok(Permission::Read),
            "write" | "w" => Ok(Permission::Write),
            "control" | "c" => Ok(Permission::Control),
            "own" | "o" => Ok(Permission::Own),
            _ => Err(Error::InvalidEncoding(format!("unknown permission: {}", s))),
        }
    }
}

/// Who a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Actor {
    Peer(PeerId),
    Anyone,
}

impl Actor {
    pub fn matches(&self, peer: &PeerId) -> bool {
        match self {
            Actor::Peer(p) => p == peer,
            Actor::Anyone => true,
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Peer(peer) => write!(f, "{}", peer),
            Actor::Anyone => write!(f, "*"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            Ok(Actor::Anyone)
        } else {
            Ok(Actor::Peer(s.parse()?))
        }
    }
}

/// A policy entry. Its author is the peer of the dot it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Creation event of the document. Only valid at the root path.
    Genesis { nonce: u64 },
    Grant {
        actor: Actor,
        permission: Permission,
        nonce: u64,
    },
    /// Revokes the grant stored under `target`, whose nonce is `nonce`
    Revoke { target: Dot, nonce: u64 },
}

/// A grant as seen by the evaluator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRecord {
    pub dot: Dot,
    pub path: Path,
    pub actor: Actor,
    pub permission: Permission,
    pub nonce: u64,
}

impl GrantRecord {
    fn gives(&self, peer: &PeerId, path: &Path, permission: Permission) -> bool {
        self.actor.matches(peer) && self.permission >= permission && self.path.is_ancestor_of(path)
    }
}

/// Evaluated access control state of one document snapshot
#[derive(Debug, Clone, Default)]
pub struct Acl {
    root: Option<PeerId>,
    effective: Vec<GrantRecord>,
}

impl Acl {
    /// Evaluate every policy entry in `state`
    pub fn evaluate(state: &Causal, doc: &DocId, schema: &SchemaHash) -> Self {
        let root = state
            .entries()
            .filter_map(|(dot, entry)| match entry.leaf {
                Leaf::Policy(Policy::Genesis { nonce })
                    if entry.path.is_root()
                        && DocId::derive(schema, &dot.peer, dot.counter, nonce) == *doc =>
                {
                    Some(dot.peer)
                }
                _ => None,
            })
            .next();

        let grants: Vec<GrantRecord> = state
            .entries()
            .filter_map(|(dot, entry)| match &entry.leaf {
                Leaf::Policy(Policy::Grant {
                    actor,
                    permission,
                    nonce,
                }) => Some(GrantRecord {
                    dot: *dot,
                    path: entry.path.clone(),
                    actor: *actor,
                    permission: *permission,
                    nonce: *nonce,
                }),
                _ => None,
            })
            .collect();

        // Authorization fixpoint. Monotone, so the order of passes is irrelevant.
        let mut authorized: Vec<GrantRecord> = Vec::new();
        let mut pending = grants;
        loop {
            let before = authorized.len();
            let mut rest = Vec::with_capacity(pending.len());
            for grant in pending {
                let author = grant.dot.peer;
                let allowed = Some(author) == root
                    || authorized.iter().any(|held| {
                        held.gives(&author, &grant.path, Permission::Own)
                            || (grant.permission.controllable()
                                && held.gives(&author, &grant.path, Permission::Control))
                    });
                if allowed {
                    authorized.push(grant);
                } else {
                    rest.push(grant);
                }
            }
            pending = rest;
            if authorized.len() == before {
                break;
            }
        }

        let revoked: BTreeSet<Dot> = state
            .entries()
            .filter_map(|(dot, entry)| match entry.leaf {
                Leaf::Policy(Policy::Revoke { target, nonce }) => {
                    Some((*dot, &entry.path, target, nonce))
                }
                _ => None,
            })
            .filter(|(revoke, path, target, nonce)| {
                let Some(grant) = authorized.iter().find(|g| g.dot == *target) else {
                    return false;
                };
                // Proof that the revoker has seen the grant.
                if grant.nonce != *nonce || grant.path != **path {
                    return false;
                }
                if revoke.peer == target.peer && revoke.counter <= target.counter {
                    return false;
                }
                let revoker = &revoke.peer;
                let needed = grant.permission.max(Permission::Control);
                Some(*revoker) == root
                    || *revoker == grant.dot.peer
                    || authorized
                        .iter()
                        .any(|held| held.gives(revoker, &grant.path, needed))
            })
            .map(|(_, _, target, _)| target)
            .collect();

        let effective: Vec<GrantRecord> = authorized
            .into_iter()
            .filter(|grant| !revoked.contains(&grant.dot))
            .collect();

        trace!(
            doc = %doc.short(),
            grants = effective.len(),
            revoked = revoked.len(),
            "Evaluated acl"
        );

        Self { root, effective }
    }

    /// The peer that created the document, if its genesis entry is known
    pub fn root(&self) -> Option<PeerId> {
        self.root
    }

    /// Does `peer` hold `permission` at `path`?
    pub fn can(&self, peer: &PeerId, permission: Permission, path: &Path) -> bool {
        if self.root.as_ref() == Some(peer) {
            return true;
        }
        self.effective
            .iter()
            .any(|grant| grant.gives(peer, path, permission))
    }

    /// May `peer` author a grant of `permission` at `path`?
    pub fn may_grant(&self, peer: &PeerId, permission: Permission, path: &Path) -> bool {
        self.can(peer, Permission::Own, path)
            || (permission.controllable() && self.can(peer, Permission::Control, path))
    }

    /// May `peer` revoke `grant`?
    pub fn may_revoke(&self, peer: &PeerId, grant: &GrantRecord) -> bool {
        grant.dot.peer == *peer
            || self.can(peer, grant.permission.max(Permission::Control), &grant.path)
    }

    /// Effective grants stored exactly at `path`
    pub fn grants_at<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a GrantRecord> + 'a {
        self.effective.iter().filter(move |grant| grant.path == *path)
    }

    pub fn grants(&self) -> &[GrantRecord] {
        &self.effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal::Entry;
    use crate::path::Segment;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn dot(p: u8, c: u64) -> Dot {
        Dot::new(peer(p), c)
    }

    fn nonce_of(dot: Dot) -> u64 {
        dot.counter * 100 + u64::from(dot.peer.as_bytes()[0])
    }

    fn notes() -> Path {
        Path::root().join(Segment::Field("notes".into()))
    }

    struct Fixture {
        state: Causal,
        doc: DocId,
        schema: SchemaHash,
    }

    impl Fixture {
        /// Document created by peer 1
        fn new() -> Self {
            let schema = SchemaHash::digest(b"test");
            let doc = DocId::derive(&schema, &peer(1), 1, 9);
            let mut state = Causal::new();
            state.insert(
                dot(1, 1),
                Entry::new(Path::root(), Leaf::Policy(Policy::Genesis { nonce: 9 })),
            );
            Self { state, doc, schema }
        }

        /// Grants get the nonce `counter * 100 + peer byte`
        fn grant(&mut self, by: Dot, path: Path, to: Actor, permission: Permission) {
            let nonce = nonce_of(by);
            self.state.insert(
                by,
                Entry::new(
                    path,
                    Leaf::Policy(Policy::Grant {
                        actor: to,
                        permission,
                        nonce,
                    }),
                ),
            );
        }

        fn revoke(&mut self, by: Dot, path: Path, target: Dot) {
            self.revoke_quoting(by, path, target, nonce_of(target));
        }

        fn revoke_quoting(&mut self, by: Dot, path: Path, target: Dot, nonce: u64) {
            self.state.insert(
                by,
                Entry::new(path, Leaf::Policy(Policy::Revoke { target, nonce })),
            );
        }

        fn acl(&self) -> Acl {
            Acl::evaluate(&self.state, &self.doc, &self.schema)
        }
    }

    #[test]
    fn test_permission_order_and_codes() {
        assert!(Permission::Read < Permission::Write);
        assert!(Permission::Control < Permission::Own);
        assert_eq!(Permission::try_from(2).unwrap(), Permission::Control);
        assert!(Permission::try_from(4).is_err());
        assert_eq!(u8::from(Permission::Own), 3);
        assert_eq!("write".parse::<Permission>().unwrap(), Permission::Write);
    }

    #[test]
    fn test_root_authority_from_genesis() {
        let fx = Fixture::new();
        let acl = fx.acl();
        assert_eq!(acl.root(), Some(peer(1)));
        assert!(acl.can(&peer(1), Permission::Own, &notes()));
        assert!(!acl.can(&peer(2), Permission::Read, &notes()));
    }

    #[test]
    fn test_forged_genesis_is_ignored() {
        let mut fx = Fixture::new();
        fx.state.insert(
            dot(2, 1),
            Entry::new(Path::root(), Leaf::Policy(Policy::Genesis { nonce: 9 })),
        );
        let acl = fx.acl();
        assert_eq!(acl.root(), Some(peer(1)));
        assert!(!acl.can(&peer(2), Permission::Read, &Path::root()));
    }

    #[test]
    fn test_grant_covers_descendants_only() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Write);
        let acl = fx.acl();

        let below = notes().join(Segment::Field("body".into()));
        assert!(acl.can(&peer(2), Permission::Write, &notes()));
        assert!(acl.can(&peer(2), Permission::Read, &below));
        assert!(!acl.can(&peer(2), Permission::Control, &notes()));
        assert!(!acl.can(&peer(2), Permission::Read, &Path::root()));
    }

    #[test]
    fn test_unauthorized_grants_do_not_count() {
        let mut fx = Fixture::new();
        // Peer 2 has no rights and tries to grant itself ownership.
        fx.grant(dot(2, 1), Path::root(), Actor::Peer(peer(2)), Permission::Own);
        assert!(!fx.acl().can(&peer(2), Permission::Read, &notes()));
    }

    #[test]
    fn test_control_delegates_read_write_only() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Control);
        fx.grant(dot(2, 1), notes(), Actor::Peer(peer(3)), Permission::Write);
        fx.grant(dot(2, 2), notes(), Actor::Peer(peer(4)), Permission::Own);
        let acl = fx.acl();

        assert!(acl.can(&peer(3), Permission::Write, &notes()));
        assert!(!acl.can(&peer(4), Permission::Read, &notes()));
    }

    #[test]
    fn test_delegation_chain_through_own() {
        let mut fx = Fixture::new();
        // Grants arrive authored in any order; the fixpoint still resolves them.
        fx.grant(dot(3, 1), notes(), Actor::Peer(peer(4)), Permission::Read);
        fx.grant(dot(2, 1), notes(), Actor::Peer(peer(3)), Permission::Own);
        fx.grant(dot(1, 2), Path::root(), Actor::Peer(peer(2)), Permission::Own);
        assert!(fx.acl().can(&peer(4), Permission::Read, &notes()));
    }

    #[test]
    fn test_revoke_removes_grant() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Write);
        fx.revoke(dot(1, 3), notes(), dot(1, 2));
        assert!(!fx.acl().can(&peer(2), Permission::Write, &notes()));
    }

    #[test]
    fn test_revoke_of_unknown_grant_is_noop() {
        let mut fx = Fixture::new();
        fx.revoke(dot(1, 2), notes(), dot(1, 7));
        fx.grant(dot(1, 3), notes(), Actor::Peer(peer(2)), Permission::Write);
        assert!(fx.acl().can(&peer(2), Permission::Write, &notes()));
    }

    #[test]
    fn test_revoke_cannot_target_a_future_grant() {
        let mut fx = Fixture::new();
        // The revoke guesses the dot the next grant will take.
        fx.revoke(dot(1, 2), notes(), dot(1, 3));
        fx.grant(dot(1, 3), notes(), Actor::Peer(peer(2)), Permission::Write);
        assert!(fx.acl().can(&peer(2), Permission::Write, &notes()));

        // Another peer guessing the dot does not know the nonce either.
        fx.grant(dot(1, 4), notes(), Actor::Peer(peer(5)), Permission::Control);
        fx.revoke_quoting(dot(5, 1), notes(), dot(1, 3), 0);
        assert!(fx.acl().can(&peer(2), Permission::Write, &notes()));
    }

    #[test]
    fn test_revoke_must_sit_at_the_grant_path() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Write);
        fx.revoke(dot(1, 3), Path::root(), dot(1, 2));
        assert!(fx.acl().can(&peer(2), Permission::Write, &notes()));
    }

    #[test]
    fn test_may_grant_and_revoke() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Control);
        fx.grant(dot(1, 3), notes(), Actor::Peer(peer(3)), Permission::Write);
        let acl = fx.acl();

        assert!(acl.may_grant(&peer(2), Permission::Write, &notes()));
        assert!(!acl.may_grant(&peer(2), Permission::Own, &notes()));
        assert!(!acl.may_grant(&peer(3), Permission::Read, &notes()));

        let notes_res = notes();
        let write = acl.grants_at(&notes_res).find(|g| g.dot == dot(1, 3)).unwrap();
        let control = acl.grants_at(&notes_res).find(|g| g.dot == dot(1, 2)).unwrap();
        assert!(acl.may_revoke(&peer(2), write));
        assert!(!acl.may_revoke(&peer(3), control));
        assert!(acl.may_revoke(&peer(1), control));
    }

    #[test]
    fn test_revoke_requires_authority() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Peer(peer(2)), Permission::Write);
        fx.grant(dot(1, 3), notes(), Actor::Peer(peer(3)), Permission::Write);
        // Peer 3 only holds Write and cannot revoke peer 2.
        fx.revoke(dot(3, 1), notes(), dot(1, 2));
        assert!(fx.acl().can(&peer(2), Permission::Write, &notes()));

        // A Control holder can.
        fx.grant(dot(1, 4), notes(), Actor::Peer(peer(5)), Permission::Control);
        fx.revoke(dot(5, 1), notes(), dot(1, 2));
        assert!(!fx.acl().can(&peer(2), Permission::Write, &notes()));
    }

    #[test]
    fn test_anyone_grant() {
        let mut fx = Fixture::new();
        fx.grant(dot(1, 2), notes(), Actor::Anyone, Permission::Read);
        let acl = fx.acl();
        assert!(acl.can(&peer(9), Permission::Read, &notes()));
        assert!(!acl.can(&peer(9), Permission::Write, &notes()));
    }
}
