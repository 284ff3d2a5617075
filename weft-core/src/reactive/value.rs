//! Value Resolution
//!
//! View descriptions are trees in which any position may hold either a
//! plain value or a live cell producing one. [`Source`] is that tree;
//! [`resolve_value`] reads through a single cell layer (with its tracking
//! side effect), and [`deep_resolve_value`] materializes a whole tree into
//! a plain [`Value`] snapshot with no cell references left.
//!
//! Equality over sources follows the change-detection rule used by the
//! cells: structural for plain data, identity for cells and handlers.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use super::computed::Computed;
use super::state::State;

/// Resolution recurses through nested cells and containers; trees deeper
/// than this are assumed to be self-referential.
const MAX_RESOLVE_DEPTH: usize = 64;

/// An opaque action value, e.g. an event listener in a view description.
///
/// Handlers compare by identity and cannot be materialized into a plain
/// snapshot.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn() + Send + Sync>);

impl Handler {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(action))
    }

    /// Invoke the underlying action.
    pub fn call(&self) {
        (self.0)();
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A dynamic value tree in which any node may be a live cell.
#[derive(Clone, Debug)]
pub enum Source {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Source>),
    Map(IndexMap<String, Source>),
    Handler(Handler),
    State(State<Source>),
    Computed(Computed<Source>),
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Source::Null, Source::Null) => true,
            (Source::Bool(a), Source::Bool(b)) => a == b,
            (Source::Number(a), Source::Number(b)) => a == b,
            (Source::String(a), Source::String(b)) => a == b,
            (Source::List(a), Source::List(b)) => a == b,
            (Source::Map(a), Source::Map(b)) => a == b,
            (Source::Handler(a), Source::Handler(b)) => a == b,
            // Cells compare by identity, matching the cells' own
            // change-detection gate.
            (Source::State(a), Source::State(b)) => a.ptr_eq(b),
            (Source::Computed(a), Source::Computed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Source {
    fn from(value: bool) -> Self {
        Source::Bool(value)
    }
}

impl From<f64> for Source {
    fn from(value: f64) -> Self {
        Source::Number(value)
    }
}

impl From<i32> for Source {
    fn from(value: i32) -> Self {
        Source::Number(value.into())
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Source::String(value.to_owned())
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Source::String(value)
    }
}

impl From<State<Source>> for Source {
    fn from(cell: State<Source>) -> Self {
        Source::State(cell)
    }
}

impl From<Computed<Source>> for Source {
    fn from(cell: Computed<Source>) -> Self {
        Source::Computed(cell)
    }
}

/// A fully materialized value tree: the same shape as [`Source`] minus
/// cells and handlers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Convert into a `serde_json` value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("plain value trees serialize infallibly")
    }
}

/// Errors from deep resolution.
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    /// The tree contains a handler, which has no plain representation.
    #[error("handler values cannot be materialized into a plain snapshot")]
    OpaqueHandler,

    /// The tree nests deeper than the resolution bound, which in practice
    /// means a cell tree that contains itself.
    #[error("value tree exceeded the maximum resolution depth of {0}")]
    DepthExceeded(usize),
}

/// Read through one cell layer, or pass a plain value through unchanged.
///
/// A cell read registers the active tracked scope, so resolving inside a
/// `watch` subscribes the scope to the cell.
pub fn resolve_value(source: &Source) -> Source {
    match source {
        Source::State(cell) => cell.get(),
        Source::Computed(cell) => cell.get(),
        other => other.clone(),
    }
}

/// Materialize a source tree into a plain snapshot, resolving every cell
/// (with tracking side effects) along the way.
pub fn deep_resolve_value(source: &Source) -> Result<Value, ResolveError> {
    resolve_at(source, 0)
}

fn resolve_at(source: &Source, depth: usize) -> Result<Value, ResolveError> {
    if depth > MAX_RESOLVE_DEPTH {
        return Err(ResolveError::DepthExceeded(MAX_RESOLVE_DEPTH));
    }

    match source {
        Source::Null => Ok(Value::Null),
        Source::Bool(value) => Ok(Value::Bool(*value)),
        Source::Number(value) => Ok(Value::Number(*value)),
        Source::String(value) => Ok(Value::String(value.clone())),
        Source::List(items) => items
            .iter()
            .map(|item| resolve_at(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Source::Map(entries) => entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), resolve_at(value, depth + 1)?)))
            .collect::<Result<IndexMap<_, _>, _>>()
            .map(Value::Map),
        Source::Handler(_) => Err(ResolveError::OpaqueHandler),
        Source::State(cell) => resolve_at(&cell.get(), depth + 1),
        Source::Computed(cell) => resolve_at(&cell.get(), depth + 1),
    }
}
