//! Path-addressed reactive state store.
//!
//! The store owns one `Arc<Map>`. Snapshots share it; the first mutation
//! after a snapshot was taken copies it (`Arc::make_mut`), so a snapshot never
//! observes later writes.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::action::Action;
use crate::document::IrDocument;
use crate::eval::Lookup;
use crate::path;
use crate::value::{values_equal, ValueKind};

/// Reactive handle on one state path. `None` means absent.
pub type StateFlow = watch::Receiver<Option<Value>>;

/// Result of applying one action to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed and subscribers were notified
    Changed,
    /// Accepted but left state as it was (e.g. removing an absent value)
    Unchanged,
    /// Shape mismatch or host-only action; logged and ignored
    Rejected,
}

impl ApplyOutcome {
    fn merge(self, other: ApplyOutcome) -> ApplyOutcome {
        match (self, other) {
            (ApplyOutcome::Changed, _) | (_, ApplyOutcome::Changed) => ApplyOutcome::Changed,
            (ApplyOutcome::Unchanged, _) | (_, ApplyOutcome::Unchanged) => ApplyOutcome::Unchanged,
            _ => ApplyOutcome::Rejected,
        }
    }
}

/// Immutable view of the store for one render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot(Arc<Map<String, Value>>);

impl Snapshot {
    pub fn get(&self, path: &str) -> Option<&Value> {
        path::get(&self.0, path)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object((*self.0).clone())
    }
}

impl From<Map<String, Value>> for Snapshot {
    fn from(map: Map<String, Value>) -> Self {
        Snapshot(Arc::new(map))
    }
}

impl Lookup for Snapshot {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get(path).cloned()
    }
}

/// Returns the keys declared by the document's initial state block, sorted.
pub fn declared_keys(doc: &IrDocument) -> BTreeSet<String> {
    doc.initial_state()
        .map(|state| state.keys().cloned().collect())
        .unwrap_or_default()
}

/// The mutable store behind a session.
#[derive(Debug, Default)]
pub struct StateStore {
    values: Arc<Map<String, Value>>,
    declared: BTreeMap<String, ValueKind>,
    watchers: HashMap<String, watch::Sender<Option<Value>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded from `initial`; every key becomes declared.
    pub fn with_initial(initial: Map<String, Value>) -> Self {
        let declared = initial
            .iter()
            .map(|(k, v)| (k.clone(), ValueKind::of(v)))
            .collect();
        Self {
            values: Arc::new(initial),
            declared,
            watchers: HashMap::new(),
        }
    }

    pub fn from_document(doc: &IrDocument) -> Self {
        Self::with_initial(doc.initial_state().cloned().unwrap_or_default())
    }

    pub fn declared_keys(&self) -> BTreeSet<String> {
        self.declared.keys().cloned().collect()
    }

    pub fn declared_kind(&self, key: &str) -> Option<ValueKind> {
        self.declared.get(key).copied()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(Arc::clone(&self.values))
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        path::get(&self.values, path).cloned()
    }

    /// Applies one action and notifies subscribers once if anything changed.
    pub fn apply(&mut self, action: &Action) -> ApplyOutcome {
        let outcome = self.apply_one(action);
        if outcome == ApplyOutcome::Changed {
            self.notify();
        }
        outcome
    }

    /// Applies `actions` in order as one atomic step for observers.
    pub fn apply_all<'a>(&mut self, actions: impl IntoIterator<Item = &'a Action>) -> ApplyOutcome {
        let outcome = actions
            .into_iter()
            .map(|action| self.apply_one(action))
            .reduce(ApplyOutcome::merge)
            .unwrap_or(ApplyOutcome::Unchanged);
        if outcome == ApplyOutcome::Changed {
            self.notify();
        }
        outcome
    }

    /// Subscribes to the value at `path`.
    ///
    /// The receiver starts at the current value and is updated after every
    /// apply that changes it, including changes made through a parent or
    /// child path.
    pub fn flow(&mut self, path: &str) -> StateFlow {
        let key = path::normalize(path).unwrap_or_else(|| path.to_string());
        if let Some(tx) = self.watchers.get(&key) {
            return tx.subscribe();
        }
        let (tx, rx) = watch::channel(path::get(&self.values, &key).cloned());
        self.watchers.insert(key, tx);
        rx
    }

    fn apply_one(&mut self, action: &Action) -> ApplyOutcome {
        match action {
            Action::Set { path, value } => self.set(&store_path(path), value.clone()),
            Action::Append { path, value } => self.append(&store_path(path), value.clone()),
            Action::Remove { path, value } => self.remove(&store_path(path), value),
            Action::Sequence { actions } => actions
                .iter()
                .map(|a| self.apply_one(a))
                .reduce(ApplyOutcome::merge)
                .unwrap_or(ApplyOutcome::Unchanged),
            other => {
                warn!(action = other.kind(), "host action reached the state store; ignored");
                ApplyOutcome::Rejected
            }
        }
    }

    fn set(&mut self, path: &str, value: Value) -> ApplyOutcome {
        let segs = path::segments(path);
        let Some(first) = segs.first() else {
            return reject("set", path, "empty path");
        };
        if let Some(kind) = self.declared.get(*first) {
            if segs.len() == 1 {
                if !kind.accepts(ValueKind::of(&value)) {
                    return reject(
                        "set",
                        path,
                        &format!("declared as {:?}, got {:?}", kind, ValueKind::of(&value)),
                    );
                }
            } else if let Err(reason) = self.check_nested_root(first, *kind) {
                return reject("set", path, &reason);
            }
        }
        let root = Arc::make_mut(&mut self.values);
        match set_in_map(root, &segs, value) {
            Ok(true) => ApplyOutcome::Changed,
            Ok(false) => ApplyOutcome::Unchanged,
            Err(reason) => reject("set", path, &reason),
        }
    }

    /// A nested write keeps a declared key's kind: only maps and lists hold
    /// nested values, and a nulled list cannot be indexed back into shape.
    fn check_nested_root(&self, key: &str, kind: ValueKind) -> Result<(), String> {
        let current = self.values.get(key).map(ValueKind::of).unwrap_or(ValueKind::Null);
        match (kind, current) {
            (ValueKind::Map, _) | (ValueKind::Null, _) => Ok(()),
            (ValueKind::List, ValueKind::List) => Ok(()),
            (declared, _) => Err(format!(
                "'{}' is declared as {:?} and cannot hold nested values",
                key, declared
            )),
        }
    }

    fn append(&mut self, path: &str, value: Value) -> ApplyOutcome {
        match path::get(&self.values, path) {
            None | Some(Value::Null) => self.set(path, Value::Array(vec![value])),
            Some(Value::Array(_)) => {
                let segs = path::segments(path);
                let root = Arc::make_mut(&mut self.values);
                match get_mut_in_map(root, &segs) {
                    Some(Value::Array(items)) => {
                        items.push(value);
                        ApplyOutcome::Changed
                    }
                    _ => reject("append", path, "list vanished during append"),
                }
            }
            Some(other) => reject(
                "append",
                path,
                &format!("target is {:?}, not a list", ValueKind::of(other)),
            ),
        }
    }

    fn remove(&mut self, path: &str, value: &Value) -> ApplyOutcome {
        let position = match path::get(&self.values, path) {
            None | Some(Value::Null) => {
                debug!(path, "remove from absent list; nothing to do");
                return ApplyOutcome::Unchanged;
            }
            Some(Value::Array(items)) => items.iter().position(|item| values_equal(item, value)),
            Some(other) => {
                return reject(
                    "remove",
                    path,
                    &format!("target is {:?}, not a list", ValueKind::of(other)),
                )
            }
        };
        let Some(index) = position else {
            return ApplyOutcome::Unchanged;
        };
        let segs = path::segments(path);
        let root = Arc::make_mut(&mut self.values);
        match get_mut_in_map(root, &segs) {
            Some(Value::Array(items)) => {
                items.remove(index);
                ApplyOutcome::Changed
            }
            _ => reject("remove", path, "list vanished during remove"),
        }
    }

    fn notify(&mut self) {
        let values = &self.values;
        self.watchers.retain(|path, tx| {
            if tx.receiver_count() == 0 {
                return false;
            }
            let next = path::get(values, path).cloned();
            tx.send_if_modified(|current| {
                if *current != next {
                    *current = next;
                    true
                } else {
                    false
                }
            });
            true
        });
    }
}

/// Action paths may carry the `state.` prefix or `[n]` indexes
fn store_path(path: &str) -> String {
    path::normalize(path).unwrap_or_else(|| path.to_string())
}

fn reject(action: &str, path: &str, reason: &str) -> ApplyOutcome {
    warn!(action, path, reason, "state action rejected");
    ApplyOutcome::Rejected
}

fn set_in_map(map: &mut Map<String, Value>, segs: &[&str], value: Value) -> Result<bool, String> {
    let Some((first, rest)) = segs.split_first() else {
        return Err("empty path".to_string());
    };
    if rest.is_empty() {
        if map.get(*first) == Some(&value) {
            return Ok(false);
        }
        map.insert((*first).to_string(), value);
        return Ok(true);
    }
    let child = map
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    set_in_value(child, first, rest, value)
}

fn set_in_value(target: &mut Value, name: &str, segs: &[&str], value: Value) -> Result<bool, String> {
    if target.is_null() {
        *target = Value::Object(Map::new());
    }
    match target {
        Value::Object(map) => set_in_map(map, segs, value),
        Value::Array(items) => {
            let Some((first, rest)) = segs.split_first() else {
                return Err("empty path".to_string());
            };
            let len = items.len();
            let index = first
                .parse::<usize>()
                .ok()
                .filter(|i| *i < len)
                .ok_or_else(|| format!("'{}' is not a valid index into '{}' (len {})", first, name, len))?;
            if rest.is_empty() {
                if items[index] == value {
                    return Ok(false);
                }
                items[index] = value;
                return Ok(true);
            }
            set_in_value(&mut items[index], first, rest, value)
        }
        other => Err(format!(
            "'{}' is {:?} and cannot hold nested values",
            name,
            ValueKind::of(other)
        )),
    }
}

fn get_mut_in_map<'a>(map: &'a mut Map<String, Value>, segs: &[&str]) -> Option<&'a mut Value> {
    let (first, rest) = segs.split_first()?;
    rest.iter()
        .try_fold(map.get_mut(*first)?, |current, seg| match current {
            Value::Object(m) => m.get_mut(*seg),
            Value::Array(items) => seg.parse::<usize>().ok().and_then(move |i| items.get_mut(i)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{append, remove, sequence, set};
    use serde_json::json;

    fn store(initial: Value) -> StateStore {
        StateStore::with_initial(initial.as_object().cloned().unwrap())
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut s = store(json!({}));
        assert_eq!(s.apply(&set("user.address.city", "Paris")), ApplyOutcome::Changed);
        assert_eq!(s.get("user.address.city"), Some(json!("Paris")));
        assert_eq!(s.get("user"), Some(json!({"address": {"city": "Paris"}})));
    }

    #[test]
    fn test_set_same_value_is_unchanged() {
        let mut s = store(json!({"n": 1}));
        assert_eq!(s.apply(&set("n", 1)), ApplyOutcome::Unchanged);
    }

    #[test]
    fn test_set_through_scalar_is_rejected() {
        let mut s = store(json!({"name": "Ada"}));
        assert_eq!(s.apply(&set("name.first", "A")), ApplyOutcome::Rejected);
        assert_eq!(s.get("name"), Some(json!("Ada")));
    }

    #[test]
    fn test_declared_type_is_fixed() {
        let mut s = store(json!({"count": 0, "tags": []}));
        assert_eq!(s.apply(&set("count", "three")), ApplyOutcome::Rejected);
        assert_eq!(s.apply(&set("tags", 5)), ApplyOutcome::Rejected);
        assert_eq!(s.apply(&set("count", 3)), ApplyOutcome::Changed);
        assert_eq!(s.apply(&set("count", Value::Null)), ApplyOutcome::Changed);
        assert_eq!(s.get("count"), Some(Value::Null));
    }

    #[test]
    fn test_nested_set_keeps_declared_kind() {
        let mut s = store(json!({"count": 0, "tags": ["a"], "user": {}}));
        assert_eq!(s.apply(&set("count", Value::Null)), ApplyOutcome::Changed);
        assert_eq!(s.apply(&set("count.x", 1)), ApplyOutcome::Rejected);
        assert_eq!(s.get("count"), Some(Value::Null));

        assert_eq!(s.apply(&set("tags", Value::Null)), ApplyOutcome::Changed);
        assert_eq!(s.apply(&set("tags.0", "b")), ApplyOutcome::Rejected);
        assert_eq!(s.get("tags"), Some(Value::Null));

        assert_eq!(s.apply(&set("user", Value::Null)), ApplyOutcome::Changed);
        assert_eq!(s.apply(&set("user.name", "Ada")), ApplyOutcome::Changed);
        assert_eq!(s.get("user"), Some(json!({"name": "Ada"})));
    }

    #[test]
    fn test_set_into_list_index() {
        let mut s = store(json!({"todos": [{"done": false}]}));
        assert_eq!(s.apply(&set("todos.0.done", true)), ApplyOutcome::Changed);
        assert_eq!(s.get("todos"), Some(json!([{"done": true}])));
        assert_eq!(s.apply(&set("todos.4.done", true)), ApplyOutcome::Rejected);
    }

    #[test]
    fn test_prefixed_action_paths() {
        let mut s = store(json!({"todos": [{"done": false}], "tags": []}));
        assert_eq!(s.apply(&set("state.todos[0].done", true)), ApplyOutcome::Changed);
        assert_eq!(s.apply(&append("{state.tags}", "x")), ApplyOutcome::Changed);
        assert_eq!(s.get("todos.0.done"), Some(json!(true)));
        assert_eq!(s.get("tags"), Some(json!(["x"])));
    }

    #[test]
    fn test_append_and_remove() {
        let mut s = store(json!({"colors": ["red"]}));
        assert_eq!(s.apply(&append("colors", "blue")), ApplyOutcome::Changed);
        assert_eq!(s.get("colors"), Some(json!(["red", "blue"])));
        assert_eq!(s.apply(&remove("colors", "red")), ApplyOutcome::Changed);
        assert_eq!(s.get("colors"), Some(json!(["blue"])));
        assert_eq!(s.apply(&remove("colors", "green")), ApplyOutcome::Unchanged);
    }

    #[test]
    fn test_append_to_absent_creates_list() {
        let mut s = store(json!({}));
        assert_eq!(s.apply(&append("log.entries", 1)), ApplyOutcome::Changed);
        assert_eq!(s.get("log.entries"), Some(json!([1])));
    }

    #[test]
    fn test_append_to_non_list_is_rejected() {
        let mut s = store(json!({"title": "x"}));
        assert_eq!(s.apply(&append("title", "y")), ApplyOutcome::Rejected);
        assert_eq!(s.apply(&remove("title", "x")), ApplyOutcome::Rejected);
        assert_eq!(s.get("title"), Some(json!("x")));
    }

    #[test]
    fn test_remove_only_first_duplicate() {
        let mut s = store(json!({"n": [1, 2, 1]}));
        s.apply(&remove("n", 1));
        assert_eq!(s.get("n"), Some(json!([2, 1])));
    }

    #[test]
    fn test_remove_from_absent_is_noop() {
        let mut s = store(json!({}));
        assert_eq!(s.apply(&remove("nothing", 1)), ApplyOutcome::Unchanged);
    }

    #[test]
    fn test_snapshot_is_frozen() {
        let mut s = store(json!({"count": 1}));
        let snap = s.snapshot();
        s.apply(&set("count", 2));
        assert_eq!(snap.get("count"), Some(&json!(1)));
        assert_eq!(s.snapshot().get("count"), Some(&json!(2)));
    }

    #[test]
    fn test_flow_receives_changes_through_parent() {
        let mut s = store(json!({"user": {"name": "Ada"}}));
        let mut name = s.flow("state.user.name");
        assert_eq!(*name.borrow(), Some(json!("Ada")));

        s.apply(&set("user", json!({"name": "Grace"})));
        assert!(name.has_changed().unwrap());
        assert_eq!(*name.borrow_and_update(), Some(json!("Grace")));

        s.apply(&set("other", 1));
        assert!(!name.has_changed().unwrap());
    }

    #[test]
    fn test_sequence_notifies_once_with_final_value() {
        let mut s = store(json!({"count": 0}));
        let mut count = s.flow("count");
        s.apply(&sequence([set("count", 1), set("count", 2), set("count", 3)]));
        assert!(count.has_changed().unwrap());
        assert_eq!(*count.borrow_and_update(), Some(json!(3)));
        assert!(!count.has_changed().unwrap());
    }

    #[test]
    fn test_dropped_flows_are_pruned() {
        let mut s = store(json!({"a": 1}));
        drop(s.flow("a"));
        s.apply(&set("a", 2));
        assert!(s.watchers.is_empty());
    }

    #[test]
    fn test_declared_keys() {
        let doc: IrDocument = serde_json::from_value(json!({
            "state": {"todos": [], "draft": "", "filter": "all"},
            "root": {"type": "Column"}
        }))
        .unwrap();
        let keys: Vec<_> = declared_keys(&doc).into_iter().collect();
        assert_eq!(keys, vec!["draft", "filter", "todos"]);
        assert_eq!(StateStore::from_document(&doc).declared_keys().len(), 3);
    }
}
