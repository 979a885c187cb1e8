//! Plain-text renderer used by `genui-check` and the tests.
//!
//! Each node becomes one indented line: its type, its props with
//! placeholders interpolated and its bound values resolved. Children follow
//! one level deeper, expanded once per element for loop nodes. The payload
//! is the indentation level.

use crate::dispatch::{Dispatcher, RenderContext};
use crate::error::RenderResult;
use crate::ir::IrNode;
use crate::options::RenderOptions;
use crate::registry::NodeRegistry;
use crate::session::Session;
use crate::value::to_display_string;

/// Node types the outline knows by name. Anything else is rendered with an
/// `[unknown: Type]` marker.
pub const OUTLINE_TYPES: &[&str] = &[
    "Box",
    "Button",
    "Card",
    "Checkbox",
    "Column",
    "Divider",
    "Image",
    "List",
    "Row",
    "Slider",
    "Spacer",
    "Switch",
    "Text",
    "TextField",
];

pub fn outline_registry() -> NodeRegistry<usize, String> {
    let mut registry: NodeRegistry<usize, String> =
        NodeRegistry::with_fallback(|ctx| outline_node(ctx, true));
    for node_type in OUTLINE_TYPES {
        registry.register(*node_type, |ctx| outline_node(ctx, false));
    }
    registry
}

/// Renders `root` against the current state of `session`.
pub fn render_outline(session: &Session, root: &IrNode, options: &RenderOptions) -> RenderResult<String> {
    let dispatcher = Dispatcher::with_options(outline_registry(), options.clone());
    Ok(dispatcher.render(session, root, &0)?.unwrap_or_default())
}

fn outline_node(ctx: &RenderContext<'_, usize, String>, unknown: bool) -> RenderResult<String> {
    let node = ctx.node;
    let mut line = "  ".repeat(*ctx.payload);
    if unknown {
        line.push_str(&format!("[unknown: {}]", node.node_type));
    } else {
        line.push_str(&node.node_type);
    }

    for name in node.props.keys() {
        if let Some(text) = ctx.prop_text(name) {
            line.push_str(&format!(" {}={:?}", name, text));
        }
    }
    if let Some(bindings) = &node.bindings {
        for (name, binding) in bindings {
            let value = ctx.resolve(&binding.expression);
            line.push_str(&format!(" @{}={}", name, to_display_string(&value)));
        }
    }
    if let Some(spec) = &node.loop_spec {
        line.push_str(&format!(" *{}", spec.iterable));
    }

    let children = ctx.render_children_with(&(ctx.payload + 1))?;
    Ok(std::iter::once(line).chain(children).collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::LoopSpec;
    use crate::state::StateStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_outline() {
        let store = StateStore::with_initial(
            json!({"name": "Ada", "tags": ["x", "y"]}).as_object().cloned().unwrap(),
        );
        let session = Session::new(store);
        let root = IrNode::new("Column")
            .with_child(IrNode::new("Text").with_prop("text", "Hello {name}"))
            .with_child(IrNode::new("TextField").with_binding("value", "state.name"))
            .with_child(
                IrNode::new("List")
                    .with_loop(LoopSpec::new("state.tags"))
                    .with_child(IrNode::new("Text").with_prop("text", "{index}. {item}")),
            )
            .with_child(IrNode::new("Frobnicator").with_child(IrNode::new("Divider")));

        let outline = render_outline(&session, &root, &RenderOptions::default()).unwrap();
        assert_eq!(
            outline,
            [
                "Column",
                "  Text text=\"Hello Ada\"",
                "  TextField @value=Ada",
                "  List *state.tags",
                "    Text text=\"0. x\"",
                "    Text text=\"1. y\"",
                "  [unknown: Frobnicator]",
                "    Divider",
            ]
            .join("\n")
        );
    }
}
