//! Document schemas and package descriptors
//!
//! A schema is plain data. Packages are JSON documents naming the schemas an
//! application works with:
//!
//! ```json
//! { "schemas": [ { "name": "todos", "version": 1,
//!     "schema": { "struct": { "title": { "reg": "str" },
//!                             "todos": { "array": { "struct": { "done": "flag" } } } } } } ] }
//! ```

use crate::causal::Leaf;
use crate::error::{Error, Result};
use crate::id::SchemaHash;
use crate::path::{PrimitiveKind, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    Null,
    Flag,
    Reg(PrimitiveKind),
    Map { key: PrimitiveKind, value: Box<Schema> },
    Struct(BTreeMap<String, Schema>),
    Array(Box<Schema>),
}

impl Schema {
    /// Short name of the node kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Null => "null",
            Schema::Flag => "flag",
            Schema::Reg(_) => "register",
            Schema::Map { .. } => "map",
            Schema::Struct(_) => "struct",
            Schema::Array(_) => "array",
        }
    }

    pub fn hash(&self) -> Result<SchemaHash> {
        let bytes = rmp_serde::to_vec(self)?;
        Ok(SchemaHash::digest(&bytes))
    }

    /// The schema node a path leads to, if any
    pub fn resolve(&self, path: &[Segment]) -> Option<&Schema> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        match (self, first) {
            (Schema::Struct(fields), Segment::Field(name)) => fields.get(name)?.resolve(rest),
            (Schema::Map { key, value }, Segment::Key(k)) if k.kind() == *key => value.resolve(rest),
            (Schema::Array(elem), Segment::Elem(_)) => elem.resolve(rest),
            _ => None,
        }
    }

    /// True if an entry with this leaf may live at `path`
    pub fn accepts(&self, path: &[Segment], leaf: &Leaf) -> bool {
        if let Leaf::Policy(_) = leaf {
            return self.resolve(path).is_some();
        }
        match (self, path.split_first()) {
            (Schema::Flag, None) => matches!(leaf, Leaf::Flag),
            (Schema::Reg(kind), None) => {
                matches!(leaf, Leaf::Value(value) if value.kind() == *kind)
            }
            (Schema::Struct(fields), Some((Segment::Field(name), rest))) => fields
                .get(name)
                .map_or(false, |field| field.accepts(rest, leaf)),
            (Schema::Map { key, value }, Some((Segment::Key(k), rest))) if k.kind() == *key => {
                value.accepts(rest, leaf)
            }
            (Schema::Array(elem), Some((Segment::Elem(_), rest))) => {
                if rest.is_empty() && matches!(leaf, Leaf::Anchor | Leaf::Position(_)) {
                    true
                } else {
                    elem.accepts(rest, leaf)
                }
            }
            _ => false,
        }
    }
}

/// A named, versioned schema inside a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSchema {
    pub name: String,
    #[serde(default)]
    pub version: u32,
    pub schema: Schema,
}

/// The set of schemas a workspace knows about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    schemas: Vec<PackageSchema>,
}

impl Package {
    pub fn new(schemas: Vec<PackageSchema>) -> Result<Self> {
        let package = Self { schemas };
        package.check()?;
        Ok(package)
    }

    /// Decode a JSON package descriptor
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let package: Package = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidPackage(e.to_string()))?;
        package.check()?;
        Ok(package)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn get(&self, name: &str) -> Option<&PackageSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageSchema> {
        self.schemas.iter()
    }

    fn check(&self) -> Result<()> {
        for (i, schema) in self.schemas.iter().enumerate() {
            if schema.name.is_empty() {
                return Err(Error::InvalidPackage("schema name cannot be empty".into()));
            }
            if self.schemas[..i].iter().any(|s| s.name == schema.name) {
                return Err(Error::InvalidPackage(format!(
                    "duplicate schema name: {}",
                    schema.name
                )));
            }
        }
        Ok(())
    }
}
