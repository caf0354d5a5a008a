//! Dots and causal contexts
//!
//! A [`Dot`] names one event: the peer that produced it and that peer's
//! counter at the time. A [`DotSet`] is a causal context: the set of every
//! dot a replica (or a delta) has observed. Counters are stored per peer as
//! sorted, disjoint, non-adjacent inclusive ranges so that long histories stay
//! compact.

use crate::id::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single event: `(peer, counter)`. Counters start at 1.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    pub peer: PeerId,
    pub counter: u64,
}

impl Dot {
    pub const fn new(peer: PeerId, counter: u64) -> Self {
        Self { peer, counter }
    }
}

impl std::fmt::Debug for Dot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.peer.short(), self.counter)
    }
}

impl std::fmt::Display for Dot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.peer.short(), self.counter)
    }
}

/// Inclusive counter ranges for one peer
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Ranges(Vec<(u64, u64)>);

impl Ranges {
    fn contains(&self, counter: u64) -> bool {
        let idx = self.0.partition_point(|&(start, _)| start <= counter);
        idx > 0 && self.0[idx - 1].1 >= counter
    }

    fn insert(&mut self, start: u64, end: u64) {
        self.0.push((start, end));
        self.normalize();
    }

    fn union(&mut self, other: &Ranges) {
        self.0.extend_from_slice(&other.0);
        self.normalize();
    }

    fn intersection(&self, other: &Ranges) -> Ranges {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            let (a_start, a_end) = self.0[i];
            let (b_start, b_end) = other.0[j];
            let start = a_start.max(b_start);
            let end = a_end.min(b_end);
            if start <= end {
                out.push((start, end));
            }
            if a_end < b_end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Ranges(out)
    }

    fn difference(&self, other: &Ranges) -> Ranges {
        let mut out = Vec::new();
        for &(start, end) in &self.0 {
            let mut cursor = Some(start);
            for &(b_start, b_end) in &other.0 {
                let Some(current) = cursor else { break };
                if b_end < current {
                    continue;
                }
                if b_start > end {
                    break;
                }
                if b_start > current {
                    out.push((current, b_start - 1));
                }
                cursor = if b_end >= end { None } else { Some(b_end + 1) };
            }
            if let Some(current) = cursor {
                out.push((current, end));
            }
        }
        Ranges(out)
    }

    fn len(&self) -> u64 {
        self.0
            .iter()
            .fold(0u64, |n, &(start, end)| n.saturating_add((end - start).saturating_add(1)))
    }

    fn max(&self) -> u64 {
        self.0.last().map_or(0, |&(_, end)| end)
    }

    fn normalize(&mut self) {
        self.0.sort_unstable();
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.0.len());
        for &(start, end) in &self.0 {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => {
                    last.1 = last.1.max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        self.0 = merged;
    }
}

/// A causal context: the set of observed dots
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotSet {
    peers: BTreeMap<PeerId, Ranges>,
}

impl DotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of dots in the set
    pub fn len(&self) -> u64 {
        self.peers.values().map(Ranges::len).sum()
    }

    pub fn contains(&self, dot: &Dot) -> bool {
        self.peers
            .get(&dot.peer)
            .map_or(false, |ranges| ranges.contains(dot.counter))
    }

    pub fn insert(&mut self, dot: Dot) {
        self.insert_range(dot.peer, dot.counter, dot.counter);
    }

    /// Insert every counter in `start..=end` for `peer`
    pub fn insert_range(&mut self, peer: PeerId, start: u64, end: u64) {
        if start > end {
            return;
        }
        self.peers.entry(peer).or_default().insert(start, end);
    }

    pub fn union(&mut self, other: &DotSet) {
        for (peer, ranges) in &other.peers {
            self.peers.entry(*peer).or_default().union(ranges);
        }
    }

    pub fn intersection(&self, other: &DotSet) -> DotSet {
        let peers = self
            .peers
            .iter()
            .filter_map(|(peer, ranges)| {
                let theirs = other.peers.get(peer)?;
                let both = ranges.intersection(theirs);
                (!both.0.is_empty()).then_some((*peer, both))
            })
            .collect();
        DotSet { peers }
    }

    pub fn difference(&self, other: &DotSet) -> DotSet {
        let peers = self
            .peers
            .iter()
            .filter_map(|(peer, ranges)| {
                let rest = match other.peers.get(peer) {
                    Some(theirs) => ranges.difference(theirs),
                    None => ranges.clone(),
                };
                (!rest.0.is_empty()).then_some((*peer, rest))
            })
            .collect();
        DotSet { peers }
    }

    /// Highest counter observed for `peer`, or 0
    pub fn max(&self, peer: &PeerId) -> u64 {
        self.peers.get(peer).map_or(0, Ranges::max)
    }

    /// The dot following the highest one observed for `peer`, if the
    /// counter has room left
    pub fn next(&self, peer: &PeerId) -> Option<Dot> {
        self.max(peer).checked_add(1).map(|counter| Dot::new(*peer, counter))
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerId> + '_ {
        self.peers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = Dot> + '_ {
        self.peers.iter().flat_map(|(peer, ranges)| {
            ranges
                .0
                .iter()
                .flat_map(move |&(start, end)| (start..=end).map(move |c| Dot::new(*peer, c)))
        })
    }
}

impl FromIterator<Dot> for DotSet {
    fn from_iter<I: IntoIterator<Item = Dot>>(iter: I) -> Self {
        let mut set = DotSet::new();
        for dot in iter {
            set.insert(dot);
        }
        set
    }
}

impl Extend<Dot> for DotSet {
    fn extend<I: IntoIterator<Item = Dot>>(&mut self, iter: I) {
        for dot in iter {
            self.insert(dot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn peer(n: u8) -> PeerId {
        PeerId::new([n; 32])
    }

    fn dot(n: u8, c: u64) -> Dot {
        Dot::new(peer(n), c)
    }

    #[test]
    fn test_ranges_merge_on_insert() {
        let mut set = DotSet::new();
        set.insert(dot(1, 1));
        set.insert(dot(1, 3));
        set.insert(dot(1, 2));
        set.insert(dot(1, 7));

        assert_eq!(set.peers[&peer(1)].0, vec![(1, 3), (7, 7)]);
        assert_eq!(set.len(), 4);
        assert_eq!(set.max(&peer(1)), 7);
        assert_eq!(set.next(&peer(1)), Some(dot(1, 8)));
        assert_eq!(set.next(&peer(2)), Some(dot(2, 1)));
    }

    #[test]
    fn test_contains() {
        let mut set = DotSet::new();
        set.insert_range(peer(1), 5, 9);
        assert!(!set.contains(&dot(1, 4)));
        assert!(set.contains(&dot(1, 5)));
        assert!(set.contains(&dot(1, 9)));
        assert!(!set.contains(&dot(1, 10)));
        assert!(!set.contains(&dot(2, 5)));
    }

    #[test]
    fn test_difference_splits_ranges() {
        let mut a = DotSet::new();
        a.insert_range(peer(1), 1, 10);
        let b: DotSet = [dot(1, 3), dot(1, 4), dot(1, 10)].into_iter().collect();

        let diff = a.difference(&b);
        assert_eq!(diff.peers[&peer(1)].0, vec![(1, 2), (5, 9)]);
        assert!(a.difference(&a).is_empty());
    }

    #[test]
    fn test_intersection() {
        let mut a = DotSet::new();
        a.insert_range(peer(1), 1, 5);
        a.insert_range(peer(2), 1, 2);
        let mut b = DotSet::new();
        b.insert_range(peer(1), 4, 8);
        b.insert_range(peer(3), 1, 1);

        let both = a.intersection(&b);
        assert_eq!(both.iter().collect::<Vec<_>>(), vec![dot(1, 4), dot(1, 5)]);
    }

    fn arb_set() -> impl Strategy<Value = DotSet> {
        proptest::collection::vec((0u8..3, 1u64..20), 0..20)
            .prop_map(|dots| dots.into_iter().map(|(p, c)| dot(p, c)).collect())
    }

    proptest! {
        #[test]
        fn prop_set_algebra_matches_naive(a in arb_set(), b in arb_set()) {
            let naive_a: std::collections::BTreeSet<Dot> = a.iter().collect();
            let naive_b: std::collections::BTreeSet<Dot> = b.iter().collect();

            let mut union = a.clone();
            union.union(&b);
            let expected: Vec<Dot> = naive_a.union(&naive_b).copied().collect();
            prop_assert_eq!(union.iter().collect::<Vec<_>>(), expected);

            let expected: Vec<Dot> = naive_a.intersection(&naive_b).copied().collect();
            prop_assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), expected);

            let expected: Vec<Dot> = naive_a.difference(&naive_b).copied().collect();
            prop_assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), expected);
        }
    }
}
