//! Recursive tree walk that hands every node to its registered renderer.
//!
//! One snapshot is taken per render pass and shared by every node visited in
//! that pass, so two reads of the same path within a pass always agree.

use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use crate::action::Action;
use crate::binding::{self, Membership};
use crate::error::{RenderError, RenderResult};
use crate::eval;
use crate::ir::IrNode;
use crate::options::RenderOptions;
use crate::registry::NodeRegistry;
use crate::scope::{Env, Scope};
use crate::session::{ActionSink, Session};
use crate::state::Snapshot;

pub struct Dispatcher<P, O> {
    registry: Arc<NodeRegistry<P, O>>,
    options: RenderOptions,
}

impl<P, O> Clone for Dispatcher<P, O> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            options: self.options.clone(),
        }
    }
}

impl<P: 'static, O: 'static> Dispatcher<P, O> {
    pub fn new(registry: NodeRegistry<P, O>) -> Self {
        Self::with_options(registry, RenderOptions::default())
    }

    pub fn with_options(registry: NodeRegistry<P, O>, options: RenderOptions) -> Self {
        Self {
            registry: Arc::new(registry),
            options,
        }
    }

    pub fn registry(&self) -> &NodeRegistry<P, O> {
        &self.registry
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Renders `root` against one snapshot of `session`.
    ///
    /// Returns `None` when the root's condition is false. Renderer errors
    /// abort the pass and propagate unchanged.
    pub fn render(&self, session: &Session, root: &IrNode, payload: &P) -> RenderResult<Option<O>> {
        let snapshot = session.snapshot();
        self.render_snapshot(&snapshot, session.action_sink(), root, payload)
    }

    /// Renders against an explicit snapshot and action sink, for hosts that
    /// manage their own store.
    pub fn render_snapshot(
        &self,
        snapshot: &Snapshot,
        on_action: ActionSink,
        root: &IrNode,
        payload: &P,
    ) -> RenderResult<Option<O>> {
        let pass = Pass {
            dispatcher: self,
            snapshot,
            on_action: &on_action,
        };
        pass.render_node(root, &Scope::new(), payload, 0)
    }
}

/// Shared, per-pass state threaded through every context.
struct Pass<'a, P, O> {
    dispatcher: &'a Dispatcher<P, O>,
    snapshot: &'a Snapshot,
    on_action: &'a ActionSink,
}

impl<P, O> Clone for Pass<'_, P, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P, O> Copy for Pass<'_, P, O> {}

impl<'a, P: 'static, O: 'static> Pass<'a, P, O> {
    fn render_node(&self, node: &IrNode, scope: &Scope, payload: &P, depth: usize) -> RenderResult<Option<O>> {
        let max_depth = self.dispatcher.options.max_depth;
        if depth > max_depth {
            return Err(RenderError::MaxDepthExceeded {
                max_depth,
                node_type: node.node_type.clone(),
            });
        }

        if let Some(condition) = &node.condition {
            if !eval::evaluate_condition(condition, &Env::new(self.snapshot, scope)) {
                trace!(node_type = %node.node_type, condition, "condition false; node skipped");
                return Ok(None);
            }
        }

        trace!(node_type = %node.node_type, depth, "rendering node");
        let ctx = RenderContext {
            node,
            state: self.snapshot,
            payload,
            scope,
            pass: *self,
            depth,
        };
        let renderer = self.dispatcher.registry.get_renderer(&node.node_type);
        renderer(&ctx).map(Some)
    }
}

/// Everything a renderer sees for one node. Created per dispatch, never stored.
pub struct RenderContext<'a, P, O> {
    pub node: &'a IrNode,
    /// The snapshot shared by the whole render pass
    pub state: &'a Snapshot,
    pub payload: &'a P,
    scope: &'a Scope,
    pass: Pass<'a, P, O>,
    depth: usize,
}

impl<'a, P: 'static, O: 'static> RenderContext<'a, P, O> {
    /// Snapshot plus the loop variables visible at this node
    pub fn env(&self) -> Env<'_> {
        Env::new(self.state, self.scope)
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Sends `action` to the session.
    pub fn on_action(&self, action: Action) {
        (self.pass.on_action)(action)
    }

    /// A clonable handle for outputs that fire actions later (click handlers).
    pub fn action_sink(&self) -> ActionSink {
        Arc::clone(self.pass.on_action)
    }

    /// Fires the action this node declares for `event`, with `{expr}`
    /// templates resolved in the current scope. Returns false when the node
    /// declares nothing for the event.
    pub fn emit(&self, event: &str) -> bool {
        match self.bound_action(event) {
            Some(action) => {
                self.on_action(action);
                true
            }
            None => false,
        }
    }

    /// The node's action for `event`, resolved but not yet sent.
    pub fn bound_action(&self, event: &str) -> Option<Action> {
        self.node
            .action(event)
            .map(|action| action.resolve_templates(&self.env()))
    }

    /// Renders `child` with the same snapshot and the current loop scope.
    pub fn render_child(&self, child: &IrNode, payload: &P) -> RenderResult<Option<O>> {
        self.pass
            .render_node(child, self.scope, payload, self.depth + 1)
    }

    /// Renders this node's children with this node's payload.
    pub fn render_children(&self) -> RenderResult<Vec<O>> {
        self.render_children_with(self.payload)
    }

    /// Renders this node's children in order, skipping false conditions.
    ///
    /// When the node carries a loop, the children render once per element of
    /// the iterable with the element and its index bound in scope; a
    /// non-list iterable renders nothing.
    pub fn render_children_with(&self, payload: &P) -> RenderResult<Vec<O>> {
        let children = self.node.children();
        let mut out = Vec::new();

        let Some(spec) = &self.node.loop_spec else {
            for child in children {
                out.extend(self.render_child(child, payload)?);
            }
            return Ok(out);
        };

        let items = match eval::resolve_any(&spec.iterable, &self.env()) {
            Value::Array(items) => items,
            other => {
                trace!(iterable = %spec.iterable, ?other, "loop iterable is not a list");
                return Ok(out);
            }
        };
        let options = &self.pass.dispatcher.options;
        let item_name = spec.item_name.as_deref().unwrap_or(&options.item_name);
        let index_name = spec.index_name.as_deref().unwrap_or(&options.index_name);

        for (index, item) in items.into_iter().enumerate() {
            let scope = self
                .scope
                .with(item_name, item)
                .with(index_name, Value::from(index));
            for child in children {
                out.extend(self.pass.render_node(child, &scope, payload, self.depth + 1)?);
            }
        }
        Ok(out)
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.node.prop(name)
    }

    /// Prop as display text, with `{expr}` placeholders interpolated.
    pub fn prop_text(&self, name: &str) -> Option<String> {
        let value = self.node.prop(name)?;
        Some(match value {
            Value::String(s) => eval::interpolate_text(s, &self.env()),
            other => crate::value::to_display_string(other),
        })
    }

    /// Prop with templates resolved to typed values (chart data, options).
    pub fn prop_value(&self, name: &str) -> Option<Value> {
        self.node
            .prop(name)
            .map(|value| eval::resolve_template(value, &self.env()))
    }

    pub fn resolve(&self, expr: &str) -> Value {
        eval::resolve_any(expr, &self.env())
    }

    pub fn condition(&self, expr: &str) -> bool {
        eval::evaluate_condition(expr, &self.env())
    }

    pub fn interpolate(&self, template: &str) -> String {
        eval::interpolate_text(template, &self.env())
    }

    /// Value of the first bound alias, evaluated in the current scope
    pub fn bound_value(&self, aliases: &[&str]) -> Option<Value> {
        binding::resolve_binding_value(self.node, aliases, &self.env())
    }

    /// Store path the first bound alias writes to. Paths reached through a
    /// loop variable are read-only here.
    pub fn state_path(&self, aliases: &[&str]) -> Option<String> {
        binding::resolve_state_path_in(self.node, aliases, self.scope)
    }

    pub fn membership(&self, aliases: &[&str]) -> Option<Membership> {
        binding::resolve_membership_in(self.node, aliases, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{append, set};
    use crate::ir::LoopSpec;
    use crate::state::StateStore;
    use serde_json::json;
    use std::sync::Mutex;

    fn session(initial: Value) -> Session {
        Session::new(StateStore::with_initial(initial.as_object().cloned().unwrap()))
    }

    fn text_registry() -> NodeRegistry<(), String> {
        let mut registry: NodeRegistry<(), String> = NodeRegistry::new();
        registry
            .register("Text", |ctx| Ok(ctx.prop_text("text").unwrap_or_default()))
            .register("Column", |ctx| Ok(ctx.render_children()?.join("|")));
        registry
    }

    #[test]
    fn test_condition_skips_subtree() {
        let root = IrNode::new("Column")
            .with_child(IrNode::new("Text").with_prop("text", "a"))
            .with_child(
                IrNode::new("Text")
                    .with_prop("text", "b")
                    .with_condition("state.showB"),
            );
        let dispatcher = Dispatcher::new(text_registry());

        let hidden = session(json!({"showB": false}));
        assert_eq!(dispatcher.render(&hidden, &root, &()).unwrap().as_deref(), Some("a"));

        let shown = session(json!({"showB": true}));
        assert_eq!(dispatcher.render(&shown, &root, &()).unwrap().as_deref(), Some("a|b"));
    }

    #[test]
    fn test_false_root_condition_renders_nothing() {
        let root = IrNode::new("Text").with_prop("text", "x").with_condition("state.missing");
        let dispatcher = Dispatcher::new(text_registry());
        assert_eq!(dispatcher.render(&session(json!({})), &root, &()).unwrap(), None);
    }

    #[test]
    fn test_loop_binds_item_and_index() {
        let root = IrNode::new("Column")
            .with_loop(LoopSpec::new("state.todos"))
            .with_child(IrNode::new("Text").with_prop("text", "{index}:{item.title}"));
        let dispatcher = Dispatcher::new(text_registry());
        let s = session(json!({"todos": [{"title": "milk"}, {"title": "eggs"}]}));
        assert_eq!(
            dispatcher.render(&s, &root, &()).unwrap().as_deref(),
            Some("0:milk|1:eggs")
        );
    }

    #[test]
    fn test_named_nested_loops() {
        let mut inner = LoopSpec::new("row.cells");
        inner.item_name = Some("cell".to_string());
        let mut outer = LoopSpec::new("state.rows");
        outer.item_name = Some("row".to_string());
        outer.index_name = Some("r".to_string());

        let root = IrNode::new("Column").with_loop(outer).with_child(
            IrNode::new("Column")
                .with_loop(inner)
                .with_child(IrNode::new("Text").with_prop("text", "{r}{cell}")),
        );
        let dispatcher = Dispatcher::new(text_registry());
        let s = session(json!({"rows": [{"cells": ["a", "b"]}, {"cells": ["c"]}]}));
        assert_eq!(
            dispatcher.render(&s, &root, &()).unwrap().as_deref(),
            Some("0a|0b|1c")
        );
    }

    #[test]
    fn test_non_list_iterable_renders_nothing() {
        let root = IrNode::new("Column")
            .with_loop(LoopSpec::new("state.count"))
            .with_child(IrNode::new("Text").with_prop("text", "x"));
        let dispatcher = Dispatcher::new(text_registry());
        assert_eq!(
            dispatcher.render(&session(json!({"count": 3})), &root, &()).unwrap().as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_snapshot_stable_while_actions_fire_mid_render() {
        let mut registry = text_registry();
        registry.register("Counter", |ctx| {
            let before = ctx.resolve("state.count");
            ctx.on_action(set("count", 99));
            let after = ctx.resolve("state.count");
            assert_eq!(before, after);
            Ok(crate::value::to_display_string(&after))
        });
        let s = session(json!({"count": 1}));
        let root = IrNode::new("Column")
            .with_child(IrNode::new("Counter"))
            .with_child(IrNode::new("Text").with_prop("text", "{count}"));
        let out = Dispatcher::new(registry).render(&s, &root, &()).unwrap();
        assert_eq!(out.as_deref(), Some("1|1"));
        assert_eq!(s.get("count"), Some(json!(99)));
    }

    #[test]
    fn test_emit_resolves_loop_item() {
        let mut registry = text_registry();
        registry.register("Button", |ctx| {
            ctx.emit("click");
            Ok(String::new())
        });
        let root = IrNode::new("Column")
            .with_loop(LoopSpec::new("state.todos"))
            .with_child(IrNode::new("Button").with_action("click", append("done", "{item}")));
        let s = session(json!({"todos": ["a", "b"], "done": []}));
        Dispatcher::new(registry).render(&s, &root, &()).unwrap();
        assert_eq!(s.get("done"), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_emit_braced_path_targets_store_path() {
        let mut registry = text_registry();
        registry.register("Button", |ctx| {
            ctx.emit("click");
            Ok(String::new())
        });
        let root = IrNode::new("Button").with_action("click", append("{state.tags}", "x"));
        let s = session(json!({"tags": ["a"]}));
        Dispatcher::new(registry).render(&s, &root, &()).unwrap();
        assert_eq!(s.get("tags"), Some(json!(["a", "x"])));
        assert_eq!(s.snapshot().as_map().len(), 1);
    }

    #[test]
    fn test_loop_variable_binding_is_read_only() {
        let mut registry = text_registry();
        registry.register("Checkbox", |ctx| {
            let checked = ctx.bound_value(binding::CHECKED_ALIASES);
            let member = ctx
                .membership(binding::CHECKED_ALIASES)
                .map(|m| m.is_member(&ctx.env()));
            let path = ctx.state_path(binding::CHECKED_ALIASES);
            Ok(format!("{checked:?} {member:?} {path:?}"))
        });
        let mut rows = LoopSpec::new("state.rows");
        rows.item_name = Some("row".to_string());
        let root = IrNode::new("Column")
            .with_loop(rows)
            .with_child(IrNode::new("Checkbox").with_binding("checked", "'x' in row.tags"))
            .with_child(IrNode::new("Checkbox").with_binding("checked", "'x' in state.tags"));
        let s = session(json!({"rows": [{"tags": ["x"]}], "tags": ["y"]}));
        assert_eq!(
            Dispatcher::new(registry).render(&s, &root, &()).unwrap().as_deref(),
            Some("Some(Bool(true)) None None|Some(Bool(false)) Some(false) Some(\"tags\")")
        );
    }

    #[test]
    fn test_payload_threads_to_children() {
        let mut registry: NodeRegistry<usize, String> = NodeRegistry::new();
        registry.register("Box", |ctx| {
            let inner: Vec<String> = ctx
                .node
                .children()
                .iter()
                .map(|child| ctx.render_child(child, &(ctx.payload + 1)))
                .collect::<RenderResult<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect();
            Ok(format!("{}[{}]", ctx.payload, inner.join(",")))
        });
        let root = IrNode::new("Box").with_child(IrNode::new("Box").with_child(IrNode::new("Box")));
        let out = Dispatcher::new(registry).render(&session(json!({})), &root, &0).unwrap();
        assert_eq!(out.as_deref(), Some("0[1[2[]]]"));
    }

    #[test]
    fn test_renderer_error_propagates() {
        let mut registry = text_registry();
        registry.register("Broken", |ctx| Err(RenderError::renderer(&ctx.node.node_type, "boom")));
        let root = IrNode::new("Column").with_child(IrNode::new("Broken"));
        let err = Dispatcher::new(registry)
            .render(&session(json!({})), &root, &())
            .unwrap_err();
        assert!(matches!(err, RenderError::Renderer { ref node_type, .. } if node_type == "Broken"));
    }

    #[test]
    fn test_max_depth() {
        let mut node = IrNode::new("Text");
        for _ in 0..5 {
            node = IrNode::new("Column").with_child(node);
        }
        let options = RenderOptions {
            max_depth: 3,
            ..RenderOptions::default()
        };
        let err = Dispatcher::with_options(text_registry(), options)
            .render(&session(json!({})), &node, &())
            .unwrap_err();
        assert!(matches!(err, RenderError::MaxDepthExceeded { max_depth: 3, .. }));
    }

    #[test]
    fn test_action_sink_outlives_context() {
        let captured: Arc<Mutex<Option<ActionSink>>> = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        let mut registry = text_registry();
        registry.register("Button", move |ctx| {
            *slot.lock().unwrap() = Some(ctx.action_sink());
            Ok("button".to_string())
        });
        let s = session(json!({"clicks": 0}));
        Dispatcher::new(registry)
            .render(&s, &IrNode::new("Button"), &())
            .unwrap();

        let sink = captured.lock().unwrap().take().unwrap();
        sink(set("clicks", 1));
        assert_eq!(s.get("clicks"), Some(json!(1)));
    }
}
