//! Fixed-size identifiers: peers, documents and schema hashes

use crate::error::{Error, Result};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Build from a slice, failing unless it is exactly 32 bytes long
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
                    Error::InvalidId(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                Ok(Self(bytes))
            }

            /// First four bytes as hex, for logs
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let bytes = hex::decode(s.trim())
                    .map_err(|e| Error::InvalidId(format!("{}: {}", s, e)))?;
                Self::from_slice(&bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

id_type!(
    /// Identity of a replica. Generated once per workspace.
    PeerId
);

id_type!(
    /// Document identifier, derived from the document's genesis event
    DocId
);

id_type!(
    /// SHA-256 of a schema's canonical encoding
    SchemaHash
);

impl PeerId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

/// Domain separator mixed into every derived document id
const DOC_ID_DOMAIN: &[u8] = b"lofi.doc";

impl DocId {
    /// Derive the id of a document from its schema and genesis event.
    pub fn derive(schema: &SchemaHash, peer: &PeerId, counter: u64, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOC_ID_DOMAIN);
        hasher.update(schema.as_bytes());
        hasher.update(peer.as_bytes());
        hasher.update(counter.to_be_bytes());
        hasher.update(nonce.to_be_bytes());
        Self(hasher.finalize().into())
    }
}

impl SchemaHash {
    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}
