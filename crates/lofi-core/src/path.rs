//! Paths into a document and primitive values

use crate::dot::Dot;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kinds of primitive values a register or map key can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Bool,
    U64,
    I64,
    Str,
}

impl std::fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveKind::Bool => write!(f, "bool"),
            PrimitiveKind::U64 => write!(f, "u64"),
            PrimitiveKind::I64 => write!(f, "i64"),
            PrimitiveKind::Str => write!(f, "str"),
        }
    }
}

/// A primitive value: register content or map key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Bool(bool),
    U64(u64),
    I64(i64),
    Str(String),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Bool(_) => PrimitiveKind::Bool,
            Primitive::U64(_) => PrimitiveKind::U64,
            Primitive::I64(_) => PrimitiveKind::I64,
            Primitive::Str(_) => PrimitiveKind::Str,
        }
    }

    /// Parse user input as a value of the given kind
    pub fn parse(kind: PrimitiveKind, input: &str) -> Result<Self> {
        let invalid = || Error::InvalidPath(format!("{:?} is not a valid {}", input, kind));
        Ok(match kind {
            PrimitiveKind::Bool => Primitive::Bool(input.parse().map_err(|_| invalid())?),
            PrimitiveKind::U64 => Primitive::U64(input.parse().map_err(|_| invalid())?),
            PrimitiveKind::I64 => Primitive::I64(input.parse().map_err(|_| invalid())?),
            PrimitiveKind::Str => Primitive::Str(input.to_string()),
        })
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::Bool(v) => write!(f, "{}", v),
            Primitive::U64(v) => write!(f, "{}", v),
            Primitive::I64(v) => write!(f, "{}", v),
            Primitive::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<u64> for Primitive {
    fn from(v: u64) -> Self {
        Primitive::U64(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::I64(v)
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::Str(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::Str(v.to_string())
    }
}

/// One step of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// Struct field
    Field(String),
    /// Map key
    Key(Primitive),
    /// Array element, named by the dot that inserted it
    Elem(Dot),
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Field(name) => write!(f, ".{}", name),
            Segment::Key(Primitive::Str(key)) => write!(f, "[{:?}]", key),
            Segment::Key(key) => write!(f, "[{}]", key),
            Segment::Elem(dot) => write!(f, "[@{}]", dot),
        }
    }
}

/// Absolute path from the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    /// A new path with `segment` appended
    pub fn join(&self, segment: Segment) -> Path {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);
        Path(segments)
    }

    pub fn parent(&self) -> Option<Path> {
        self.0.split_last().map(|(_, rest)| Path(rest.to_vec()))
    }

    /// True if `self` equals `other` or lies above it
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// The segment directly below `self` on the way to `other`
    pub fn child_towards<'a>(&self, other: &'a Path) -> Option<&'a Segment> {
        if self.is_ancestor_of(other) {
            other.0.get(self.0.len())
        } else {
            None
        }
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Path(segments)
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        write!(f, "$")?;
        for segment in &self.0 {
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// One step of a textual selector such as `todos[3].title`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> Selector<'a> {
    /// Parse a selector string into steps
    /// Examples: "title", "todos[0]", "tags.urgent", "todos[0].done"
    pub fn parse(path: &'a str) -> impl Iterator<Item = Result<Selector<'a>>> {
        SelectorParser { path, pos: 0 }
    }
}

struct SelectorParser<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> Iterator for SelectorParser<'a> {
    type Item = Result<Selector<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = &self.path[self.pos..];

        // Skip leading dot
        let remaining = remaining.strip_prefix('.').unwrap_or(remaining);
        if remaining.is_empty() {
            self.pos = self.path.len();
            return None;
        }
        self.pos = self.path.len() - remaining.len();

        if let Some(rest) = remaining.strip_prefix('[') {
            let Some(end) = rest.find(']') else {
                self.pos = self.path.len();
                return Some(Err(Error::InvalidPath(format!("unclosed '[' in {:?}", self.path))));
            };
            self.pos += end + 2;
            return Some(rest[..end].trim().parse::<usize>().map(Selector::Index).map_err(|_| {
                Error::InvalidPath(format!("{:?} is not an array index", &rest[..end]))
            }));
        }

        let end = remaining
            .find(|c| c == '.' || c == '[')
            .unwrap_or(remaining.len());
        self.pos += end;

        if end == 0 {
            self.next()
        } else {
            Some(Ok(Selector::Name(&remaining[..end])))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::PeerId;

    #[test]
    fn test_selector_parsing() {
        let steps: Vec<_> = Selector::parse("todos[3].title")
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            steps,
            vec![Selector::Name("todos"), Selector::Index(3), Selector::Name("title")]
        );
    }

    #[test]
    fn test_selector_root_and_nested_indices() {
        assert_eq!(Selector::parse("").count(), 0);
        let steps: Vec<_> = Selector::parse("grid[1][2]").collect::<Result<_>>().unwrap();
        assert_eq!(
            steps,
            vec![Selector::Name("grid"), Selector::Index(1), Selector::Index(2)]
        );
    }

    #[test]
    fn test_selector_errors() {
        assert!(Selector::parse("todos[x]").any(|s| s.is_err()));
        assert!(Selector::parse("todos[1").any(|s| s.is_err()));
    }

    #[test]
    fn test_ancestry() {
        let root = Path::root();
        let todos = root.join(Segment::Field("todos".into()));
        let elem = todos.join(Segment::Elem(Dot::new(PeerId::new([1; 32]), 4)));

        assert!(root.is_ancestor_of(&elem));
        assert!(todos.is_ancestor_of(&elem));
        assert!(elem.is_ancestor_of(&elem));
        assert!(!elem.is_ancestor_of(&todos));
        assert_eq!(elem.parent(), Some(todos.clone()));
        assert_eq!(
            root.child_towards(&elem),
            Some(&Segment::Field("todos".into()))
        );
    }

    #[test]
    fn test_primitive_parse() {
        assert_eq!(Primitive::parse(PrimitiveKind::U64, "7").unwrap(), Primitive::U64(7));
        assert_eq!(Primitive::parse(PrimitiveKind::I64, "-7").unwrap(), Primitive::I64(-7));
        assert_eq!(Primitive::parse(PrimitiveKind::Bool, "true").unwrap(), Primitive::Bool(true));
        assert!(Primitive::parse(PrimitiveKind::U64, "-1").is_err());
    }
}
