use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::action::Action;

/// One node of the IR tree.
///
/// The tree is immutable once loaded; renderers only ever borrow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<IrNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<BTreeMap<String, Binding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<BTreeMap<String, Action>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_spec: Option<LoopSpec>,
}

/// A declared link between a component property and an expression.
///
/// Accepts both `{"expression": "state.name"}` and the bare string shorthand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BindingRepr")]
pub struct Binding {
    pub expression: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BindingRepr {
    Full { expression: String },
    Short(String),
}

impl From<BindingRepr> for Binding {
    fn from(repr: BindingRepr) -> Self {
        match repr {
            BindingRepr::Full { expression } | BindingRepr::Short(expression) => {
                Binding { expression }
            }
        }
    }
}

impl Binding {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// Loop metadata: children render once per element of `iterable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    pub iterable: String,
    /// Name the current element is bound to (default `item`)
    #[serde(rename = "as", skip_serializing_if = "Option::is_none")]
    pub item_name: Option<String>,
    /// Name the zero-based position is bound to (default `index`)
    #[serde(rename = "indexAs", skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
}

impl LoopSpec {
    pub fn new(iterable: impl Into<String>) -> Self {
        Self {
            iterable: iterable.into(),
            item_name: None,
            index_name: None,
        }
    }
}

impl IrNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            props: Map::new(),
            children: None,
            bindings: None,
            actions: None,
            condition: None,
            loop_spec: None,
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: IrNode) -> Self {
        self.children.get_or_insert_with(Vec::new).push(child);
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.bindings
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), Binding::new(expression));
        self
    }

    pub fn with_action(mut self, event: impl Into<String>, action: Action) -> Self {
        self.actions
            .get_or_insert_with(BTreeMap::new)
            .insert(event.into(), action);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_loop(mut self, spec: LoopSpec) -> Self {
        self.loop_spec = Some(spec);
        self
    }

    /// Children in render order (empty for leaves)
    pub fn children(&self) -> &[IrNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.as_ref().and_then(|b| b.get(name))
    }

    pub fn action(&self, event: &str) -> Option<&Action> {
        self.actions.as_ref().and_then(|a| a.get(event))
    }
}
