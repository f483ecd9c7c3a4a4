//! Schema-less view binding over a [`ParamTree`]: one editable field per
//! scalar leaf, discovered by walking the tree at render time. A leaf
//! interaction becomes exactly one `set` call via [`commit`].

use crate::tree::{ParamTree, Path, PathError, Segment};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Text,
}

/// One bound input field. `label` is the dotted/bracketed form of `path`;
/// `value` is the display string of the current leaf value.
#[derive(Debug, Clone)]
pub struct FieldBinding {
    pub path: Path,
    pub label: String,
    pub kind: FieldKind,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("`{raw}` is not a number (field `{path}` is numeric)")]
    InvalidNumber { path: String, raw: String },
    #[error("`{path}` is a {kind} node, not an editable field")]
    NotALeaf { path: String, kind: &'static str },
}

/// Walk the tree depth-first and produce a binding per scalar leaf.
/// Mapping entries come out in insertion order, sequence elements in index
/// order. Empty containers contribute nothing.
pub fn leaf_bindings(tree: &ParamTree) -> Vec<FieldBinding> {
    let mut out = Vec::new();
    let mut prefix = Path::root();
    walk(tree, &mut prefix, &mut out);
    out
}

fn walk(node: &ParamTree, prefix: &mut Path, out: &mut Vec<FieldBinding>) {
    match node {
        ParamTree::Mapping(entries) => {
            for (key, child) in entries {
                prefix.push(Segment::Key(key.clone()));
                walk(child, prefix, out);
                prefix.pop();
            }
        }
        ParamTree::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                prefix.push(Segment::Index(index));
                walk(child, prefix, out);
                prefix.pop();
            }
        }
        ParamTree::Number(n) => out.push(binding(prefix, FieldKind::Number, format_number(*n))),
        ParamTree::Text(t) => out.push(binding(prefix, FieldKind::Text, t.clone())),
    }
}

fn binding(path: &Path, kind: FieldKind, value: String) -> FieldBinding {
    FieldBinding {
        path: path.clone(),
        label: path.to_string(),
        kind,
        value,
    }
}

/// Apply one committed leaf edit: the raw input is parsed as a number when
/// the current value is numeric, taken verbatim when it is text. Returns
/// the replacement tree; the caller swaps it in whole.
pub fn commit(tree: &ParamTree, path: &Path, raw: &str) -> Result<ParamTree, EditError> {
    let value = match tree.get(path)? {
        ParamTree::Number(_) => {
            let parsed: f64 = raw.trim().parse().map_err(|_| EditError::InvalidNumber {
                path: path.to_string(),
                raw: raw.to_string(),
            })?;
            ParamTree::Number(parsed)
        }
        ParamTree::Text(_) => ParamTree::Text(raw.to_string()),
        other => {
            return Err(EditError::NotALeaf {
                path: path.to_string(),
                kind: other.kind(),
            })
        }
    };
    Ok(tree.set(path, value)?)
}

/// Integral values display without a trailing `.0` so numeric fields look
/// the way they were typed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
