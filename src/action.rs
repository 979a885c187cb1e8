use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::eval::{self, Lookup};
use crate::path;

/// A data value describing a state mutation or an external effect.
///
/// `Set`, `Append`, `Remove` and `Sequence` are executed by the state store.
/// The remaining variants are opaque to the runtime and forwarded to the host
/// with their fields untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Set { path: String, value: Value },
    Append { path: String, value: Value },
    Remove { path: String, value: Value },
    Sequence { actions: Vec<Action> },
    Navigate(Map<String, Value>),
    ShowToast(Map<String, Value>),
    Fetch(Map<String, Value>),
}

pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Action {
    Action::Set {
        path: path.into(),
        value: value.into(),
    }
}

pub fn append(path: impl Into<String>, value: impl Into<Value>) -> Action {
    Action::Append {
        path: path.into(),
        value: value.into(),
    }
}

pub fn remove(path: impl Into<String>, value: impl Into<Value>) -> Action {
    Action::Remove {
        path: path.into(),
        value: value.into(),
    }
}

pub fn sequence(actions: impl IntoIterator<Item = Action>) -> Action {
    Action::Sequence {
        actions: actions.into_iter().collect(),
    }
}

/// True when the state store can execute `action` itself.
///
/// A sequence qualifies only if every action inside it does.
pub fn is_action_supported(action: &Action) -> bool {
    match action {
        Action::Set { .. } | Action::Append { .. } | Action::Remove { .. } => true,
        Action::Sequence { actions } => actions.iter().all(is_action_supported),
        Action::Navigate(_) | Action::ShowToast(_) | Action::Fetch(_) => false,
    }
}

impl Action {
    /// Wire name of the variant, as it appears in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Set { .. } => "set",
            Action::Append { .. } => "append",
            Action::Remove { .. } => "remove",
            Action::Sequence { .. } => "sequence",
            Action::Navigate(_) => "navigate",
            Action::ShowToast(_) => "showToast",
            Action::Fetch(_) => "fetch",
        }
    }

    /// Splits into the actions the store executes and those for the host,
    /// flattening nested sequences. Both halves keep declaration order.
    pub fn partition(self) -> (Vec<Action>, Vec<Action>) {
        let mut local = Vec::new();
        let mut host = Vec::new();
        self.partition_into(&mut local, &mut host);
        (local, host)
    }

    fn partition_into(self, local: &mut Vec<Action>, host: &mut Vec<Action>) {
        match self {
            Action::Sequence { actions } => {
                for action in actions {
                    action.partition_into(local, host);
                }
            }
            action if is_action_supported(&action) => local.push(action),
            action => host.push(action),
        }
    }

    /// Resolves `{expr}` templates inside the action's paths and values.
    ///
    /// A value string that is exactly one placeholder takes the typed value
    /// of the expression; any other string is interpolated as text. Host
    /// action fields are resolved the same way. Paths only interpolate
    /// embedded placeholders.
    pub fn resolve_templates(&self, scope: &impl Lookup) -> Action {
        match self {
            Action::Set { path, value } => Action::Set {
                path: resolve_path(path, scope),
                value: eval::resolve_template(value, scope),
            },
            Action::Append { path, value } => Action::Append {
                path: resolve_path(path, scope),
                value: eval::resolve_template(value, scope),
            },
            Action::Remove { path, value } => Action::Remove {
                path: resolve_path(path, scope),
                value: eval::resolve_template(value, scope),
            },
            Action::Sequence { actions } => Action::Sequence {
                actions: actions.iter().map(|a| a.resolve_templates(scope)).collect(),
            },
            Action::Navigate(fields) => Action::Navigate(resolve_fields(fields, scope)),
            Action::ShowToast(fields) => Action::ShowToast(resolve_fields(fields, scope)),
            Action::Fetch(fields) => Action::Fetch(resolve_fields(fields, scope)),
        }
    }
}

/// A path that is one braced store path (`{state.tags}`) names that path
/// and is kept as written. Embedded placeholders (`todos.{index}.done`) are
/// interpolated.
fn resolve_path(path: &str, scope: &impl Lookup) -> String {
    if eval::single_placeholder(path).is_some() && path::normalize(path).is_some() {
        return path.to_string();
    }
    eval::interpolate_text(path, scope)
}

fn resolve_fields(fields: &Map<String, Value>, scope: &impl Lookup) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), eval::resolve_template(v, scope)))
        .collect()
}
