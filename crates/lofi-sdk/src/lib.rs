//! lofi SDK
//!
//! A workspace ([`Sdk`]) holds this replica's peer identity, an address book
//! and a set of documents kept in local storage. Documents are edited by
//! producing deltas from a [`lofi_core::Cursor`] and applying them with
//! [`Doc::apply`]; the same deltas are what replicas exchange to converge.
//!
//! ```no_run
//! use lofi_sdk::Sdk;
//!
//! let package = br#"{"schemas":[{"name":"note","schema":{"struct":{"title":{"reg":"str"}}}}]}"#;
//! let sdk = Sdk::create_memory(package)?;
//! let doc = sdk.create_document("note")?;
//! let delta = doc.cursor().field("title")?.reg_assign_str("hello")?;
//! doc.apply(delta)?;
//! # Ok::<(), lofi_core::Error>(())
//! ```

pub mod doc;
pub mod workspace;

pub use doc::Doc;
pub use workspace::{DocIter, Sdk};

pub use lofi_core::{
    Actor, Causal, Cursor, DocId, DocumentMeta, DotSet, Error, Package, PeerId, Permission,
    Result,
};
pub use lofi_storage::StorageStats;
