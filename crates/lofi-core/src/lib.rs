//! lofi Core - causal CRDT documents
//!
//! This crate provides the replicated document model:
//! - Dots, causal contexts and joinable deltas ([`Causal`])
//! - Schemas and package descriptors
//! - Cursors for navigating documents and authoring deltas
//! - Flags, multi-value registers, maps and ordered arrays
//! - Capability-based access control evaluated from causal state

pub mod acl;
pub mod causal;
pub mod clock;
pub mod cursor;
pub mod document;
pub mod dot;
pub mod error;
pub mod id;
pub mod path;
pub mod position;
pub mod schema;

pub use acl::{Acl, Actor, Permission, Policy};
pub use causal::{Causal, Entry, Leaf};
pub use clock::{Clock, ClockStore};
pub use cursor::{Cursor, RegisterValue, RegisterValues};
pub use document::{Document, DocumentMeta};
pub use dot::{Dot, DotSet};
pub use error::{Error, Result};
pub use id::{DocId, PeerId, SchemaHash};
pub use path::{Path, Primitive, PrimitiveKind, Segment, Selector};
pub use position::Position;
pub use schema::{Package, PackageSchema, Schema};
