use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A configuration value tree of unknown shape. The closed set of node
/// kinds is the whole contract: scalars (number or text), index-addressed
/// sequences, and key-addressed mappings with insertion order preserved.
/// A node's kind is fixed for the lifetime of one tree instance; edits
/// replace values, never kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamTree {
    Number(f64),
    Text(String),
    Sequence(Vec<ParamTree>),
    Mapping(IndexMap<String, ParamTree>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Ordered address of a node: keys into mappings, indices into sequences.
/// Displays as `a.b[2].c`; parses the same syntax back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<Segment>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.0.push(Segment::Index(index));
        self
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 && matches!(segment, Segment::Key(_)) {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid path `{path}`: {reason}")]
pub struct PathParseError {
    pub path: String,
    pub reason: String,
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| PathParseError {
            path: s.to_string(),
            reason: reason.to_string(),
        };
        if s.is_empty() {
            return Err(err("empty"));
        }
        let mut segments = Vec::new();
        let mut chars = s.chars().peekable();
        loop {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    let mut digits = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(c);
                    }
                    if !closed {
                        return Err(err("unterminated `[`"));
                    }
                    let index: usize = digits
                        .parse()
                        .map_err(|_| err("expected an index inside `[]`"))?;
                    segments.push(Segment::Index(index));
                }
                Some('.') => {
                    chars.next();
                    if segments.is_empty() {
                        return Err(err("leading `.`"));
                    }
                    match chars.peek() {
                        Some(c) if *c != '.' && *c != '[' => {}
                        _ => return Err(err("expected a key after `.`")),
                    }
                }
                Some(_) => {
                    let mut key = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        key.push(c);
                        chars.next();
                    }
                    segments.push(Segment::Key(key));
                }
                None => break,
            }
        }
        Ok(Path(segments))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("unknown key `{key}` at `{at}`")]
    UnknownKey { key: String, at: String },
    #[error("index {index} out of bounds at `{at}` (len {len})")]
    OutOfBounds { index: usize, len: usize, at: String },
    #[error("segment `{segment}` does not fit a {kind} node at `{at}`")]
    KindMismatch {
        segment: String,
        kind: &'static str,
        at: String,
    },
    #[error("empty path does not address a node")]
    Empty,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported parameter value `{0}` (expected number, text, sequence, or mapping)")]
pub struct UnsupportedValue(pub String);

fn prefix_label(segments: &[Segment]) -> String {
    if segments.is_empty() {
        "(root)".to_string()
    } else {
        Path(segments.to_vec()).to_string()
    }
}

impl ParamTree {
    pub fn kind(&self) -> &'static str {
        match self {
            ParamTree::Number(_) => "number",
            ParamTree::Text(_) => "text",
            ParamTree::Sequence(_) => "sequence",
            ParamTree::Mapping(_) => "mapping",
        }
    }

    /// Resolve `path` to a node reference.
    pub fn get(&self, path: &Path) -> Result<&ParamTree, PathError> {
        let mut node = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            node = match (node, segment) {
                (ParamTree::Mapping(entries), Segment::Key(key)) => {
                    entries.get(key).ok_or_else(|| PathError::UnknownKey {
                        key: key.clone(),
                        at: prefix_label(&path.segments()[..depth]),
                    })?
                }
                (ParamTree::Sequence(items), Segment::Index(index)) => {
                    items.get(*index).ok_or_else(|| PathError::OutOfBounds {
                        index: *index,
                        len: items.len(),
                        at: prefix_label(&path.segments()[..depth]),
                    })?
                }
                (other, segment) => {
                    return Err(PathError::KindMismatch {
                        segment: segment.to_string(),
                        kind: other.kind(),
                        at: prefix_label(&path.segments()[..depth]),
                    })
                }
            };
        }
        Ok(node)
    }

    /// Return a tree identical to `self` except the node at `path` replaced
    /// by `value`. The input is never mutated; nodes along the path are
    /// rebuilt, untouched siblings are copied unchanged. Never creates
    /// nodes that do not already exist, and does not re-validate the new
    /// value's kind against the old one (kind coherence is the committing
    /// caller's concern).
    pub fn set(&self, path: &Path, value: ParamTree) -> Result<ParamTree, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        self.set_at(path.segments(), 0, value)
    }

    fn set_at(&self, segments: &[Segment], depth: usize, value: ParamTree) -> Result<ParamTree, PathError> {
        let segment = &segments[depth];
        match (self, segment) {
            (ParamTree::Mapping(entries), Segment::Key(key)) => {
                let child = entries.get(key).ok_or_else(|| PathError::UnknownKey {
                    key: key.clone(),
                    at: prefix_label(&segments[..depth]),
                })?;
                let replacement = if depth + 1 == segments.len() {
                    value
                } else {
                    child.set_at(segments, depth + 1, value)?
                };
                let mut entries = entries.clone();
                entries.insert(key.clone(), replacement);
                Ok(ParamTree::Mapping(entries))
            }
            (ParamTree::Sequence(items), Segment::Index(index)) => {
                let child = items.get(*index).ok_or_else(|| PathError::OutOfBounds {
                    index: *index,
                    len: items.len(),
                    at: prefix_label(&segments[..depth]),
                })?;
                let replacement = if depth + 1 == segments.len() {
                    value
                } else {
                    child.set_at(segments, depth + 1, value)?
                };
                let mut items = items.clone();
                items[*index] = replacement;
                Ok(ParamTree::Sequence(items))
            }
            (other, segment) => Err(PathError::KindMismatch {
                segment: segment.to_string(),
                kind: other.kind(),
                at: prefix_label(&segments[..depth]),
            }),
        }
    }

    /// Ingest a raw JSON value as a tree. Null and bool have no node kind
    /// here and are rejected, not coerced.
    pub fn from_value(value: &Value) -> Result<ParamTree, UnsupportedValue> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map(ParamTree::Number)
                .ok_or_else(|| UnsupportedValue(value.to_string())),
            Value::String(s) => Ok(ParamTree::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(ParamTree::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(ParamTree::Sequence),
            Value::Object(entries) => {
                let mut out = IndexMap::with_capacity(entries.len());
                for (key, child) in entries {
                    out.insert(key.clone(), ParamTree::from_value(child)?);
                }
                Ok(ParamTree::Mapping(out))
            }
            Value::Null | Value::Bool(_) => Err(UnsupportedValue(value.to_string())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ParamTree::Number(n) => Value::from(*n),
            ParamTree::Text(s) => Value::String(s.clone()),
            ParamTree::Sequence(items) => Value::Array(items.iter().map(ParamTree::to_value).collect()),
            ParamTree::Mapping(entries) => {
                let mut out = serde_json::Map::with_capacity(entries.len());
                for (key, child) in entries {
                    out.insert(key.clone(), child.to_value());
                }
                Value::Object(out)
            }
        }
    }
}
