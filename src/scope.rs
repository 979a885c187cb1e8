//! Loop variables visible to expressions inside a loop body.
//!
//! Each loop iteration pushes the current element under its item name
//! (`item` unless the loop declares `as`) and the zero-based position under
//! its index name (`index` unless the loop declares `indexAs`). Inner loops
//! shadow outer ones.

use serde_json::Value;

use crate::eval::Lookup;
use crate::path;
use crate::state::Snapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    frames: Vec<(String, Value)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this scope with `name` bound to `value`.
    pub fn with(&self, name: impl Into<String>, value: Value) -> Scope {
        let mut next = self.clone();
        next.frames.push((name.into(), value));
        next
    }

    /// Innermost binding of `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A snapshot seen through the loop scope of the node being rendered.
#[derive(Debug, Clone, Copy)]
pub struct Env<'a> {
    pub state: &'a Snapshot,
    pub scope: &'a Scope,
}

impl<'a> Env<'a> {
    pub fn new(state: &'a Snapshot, scope: &'a Scope) -> Self {
        Self { state, scope }
    }
}

impl Lookup for Env<'_> {
    fn lookup(&self, path: &str) -> Option<Value> {
        let segs = path::segments(path);
        if let Some((first, rest)) = segs.split_first() {
            if let Some(local) = self.scope.get(first) {
                return path::get_in(local, rest).cloned();
            }
        }
        self.state.get(path).cloned()
    }

    fn lookup_state(&self, path: &str) -> Option<Value> {
        self.state.get(path).cloned()
    }
}
