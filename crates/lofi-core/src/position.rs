//! Dense position identifiers for array ordering
//!
//! A position is a fraction in `[0, 1)` written as base-256 digits with no
//! trailing zero. Byte-wise lexicographic order equals numeric order, and
//! there is always room for another position between two distinct ones.

use serde::{Deserialize, Serialize};

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position(Vec<u8>);

impl Position {
    /// Wrap raw digits as received, without checking them
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Position(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Non-empty with no trailing zero. Only canonical positions are
    /// accepted from deltas.
    pub fn is_canonical(&self) -> bool {
        self.0.last().map_or(false, |&last| last != 0)
    }

    fn trimmed(bytes: &[u8]) -> &[u8] {
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &bytes[..end]
    }

    /// A position strictly between `lo` and `hi`.
    ///
    /// `None` stands for the start (`lo`) or the end (`hi`) of the array.
    /// Neighbours that compare equal, which concurrent inserts can produce,
    /// yield a position after `lo`.
    pub fn between(lo: Option<&Position>, hi: Option<&Position>) -> Position {
        // Trailing zeros do not change the value but would keep the digit
        // loop below from ever finding a gap.
        let lo = lo.map_or(&[][..], |p| Self::trimmed(p.as_bytes()));
        let hi = match hi.map(|p| Self::trimmed(p.as_bytes())) {
            Some(hi) if lo < hi => Some(hi),
            _ => None,
        };

        let mut digits = Vec::with_capacity(lo.len() + 1);
        // While `tight`, the digits produced so far equal `hi`'s prefix.
        let mut tight = hi.is_some();
        for i in 0.. {
            let l = u16::from(lo.get(i).copied().unwrap_or(0));
            let h = match hi {
                Some(hi) if tight => u16::from(hi.get(i).copied().unwrap_or(0)),
                _ => 256,
            };
            if h - l >= 2 {
                digits.push((l + (h - l) / 2) as u8);
                break;
            }
            digits.push(l as u8);
            if h > l {
                tight = false;
            }
        }
        Position(digits)
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Position({})", hex::encode(&self.0))
    }
}
