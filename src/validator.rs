use crate::action::Action;
use crate::document::IrDocument;
use crate::error::{IrError, IrResult};
use crate::ir::IrNode;
use crate::options::RenderOptions;

/// Validate a loaded document with default options
pub fn validate_document(doc: &IrDocument) -> IrResult<()> {
    validate_document_with_options(doc, &RenderOptions::default())
}

/// Validate a loaded document: state block first, then the node tree
pub fn validate_document_with_options(doc: &IrDocument, options: &RenderOptions) -> IrResult<()> {
    if let Some(state) = doc.initial_state() {
        for key in state.keys() {
            validate_state_key(key)?;
        }
    }
    validate_node(doc.root_node(), options)
}

/// Validate a node tree on its own
pub fn validate_node(node: &IrNode, options: &RenderOptions) -> IrResult<()> {
    validate_node_recursive(node, "root", 0, options.max_depth)
}

/// Top-level state keys are single path segments
fn validate_state_key(key: &str) -> IrResult<()> {
    let reason = if key.trim().is_empty() {
        "key must not be empty"
    } else if key.contains('.') {
        "key must not contain '.'"
    } else if key == crate::path::STATE_PREFIX {
        "'state' is reserved as the path prefix"
    } else {
        return Ok(());
    };
    Err(IrError::InvalidStateKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

fn validate_node_recursive(node: &IrNode, location: &str, depth: usize, max_depth: usize) -> IrResult<()> {
    if depth > max_depth {
        return Err(IrError::MaxNestingDepthExceeded {
            max_depth,
            location: location.to_string(),
        });
    }

    if node.node_type.trim().is_empty() {
        return Err(IrError::InvalidNode {
            location: location.to_string(),
            reason: "node type must not be empty".to_string(),
        });
    }

    if let Some(bindings) = &node.bindings {
        for (name, binding) in bindings {
            if binding.expression.trim().is_empty() {
                return Err(IrError::EmptyBinding {
                    location: location.to_string(),
                    binding: name.clone(),
                });
            }
        }
    }

    if let Some(condition) = &node.condition {
        if condition.trim().is_empty() {
            return Err(IrError::InvalidNode {
                location: location.to_string(),
                reason: "condition must not be empty".to_string(),
            });
        }
    }

    if let Some(spec) = &node.loop_spec {
        if spec.iterable.trim().is_empty() {
            return Err(IrError::EmptyLoopIterable {
                location: location.to_string(),
            });
        }
        let blank = |name: &Option<String>| name.as_deref().is_some_and(|n| n.trim().is_empty());
        if blank(&spec.item_name) || blank(&spec.index_name) {
            return Err(IrError::InvalidNode {
                location: location.to_string(),
                reason: "loop variable names must not be empty".to_string(),
            });
        }
    }

    if let Some(actions) = &node.actions {
        for (event, action) in actions {
            validate_action(action, &format!("{}/actions.{}", location, event))?;
        }
    }

    for (i, child) in node.children().iter().enumerate() {
        let child_location = format!("{}/children[{}]", location, i);
        validate_node_recursive(child, &child_location, depth + 1, max_depth)?;
    }

    Ok(())
}

/// Store actions need a target path; host actions are opaque
fn validate_action(action: &Action, location: &str) -> IrResult<()> {
    match action {
        Action::Set { path, .. } | Action::Append { path, .. } | Action::Remove { path, .. } => {
            if path.trim().is_empty() {
                return Err(IrError::InvalidNode {
                    location: location.to_string(),
                    reason: format!("{} action path must not be empty", action.kind()),
                });
            }
            Ok(())
        }
        Action::Sequence { actions } => actions
            .iter()
            .enumerate()
            .try_for_each(|(i, inner)| validate_action(inner, &format!("{}[{}]", location, i))),
        Action::Navigate(_) | Action::ShowToast(_) | Action::Fetch(_) => Ok(()),
    }
}
