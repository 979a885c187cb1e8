//! Resolves which state path a bound control reads and writes.
//!
//! Component authors name the bound property inconsistently (`value`, `bind`,
//! `checked`, ...), so every lookup takes an ordered alias list and the first
//! alias present on the node wins.

use serde_json::Value;

use crate::action::{self, Action};
use crate::eval::{self, CompareOp, Expr, Lookup};
use crate::ir::{Binding, IrNode};
use crate::path;
use crate::scope::Scope;

/// Alias order used by text-like controls
pub const VALUE_ALIASES: &[&str] = &["value", "bind"];

/// Alias order used by toggles and checkboxes
pub const CHECKED_ALIASES: &[&str] = &["checked", "value", "bind"];

/// A `member in state.list` binding, as used by list-backed checkboxes.
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    member: Expr,
    list: Expr,
    /// Store path of the list the member is added to or removed from
    pub list_path: String,
}

impl Membership {
    /// Evaluates the member expression in the current scope
    pub fn member(&self, scope: &impl Lookup) -> Value {
        self.member.eval(scope)
    }

    /// Same answer as evaluating the whole binding expression.
    pub fn is_member(&self, scope: &impl Lookup) -> bool {
        crate::value::contains(&self.list.eval(scope), &self.member(scope))
    }
}

/// Returns the first binding present under `aliases`, in alias order.
pub fn find_binding<'a>(node: &'a IrNode, aliases: &[&str]) -> Option<(&'a str, &'a Binding)> {
    let bindings = node.bindings.as_ref()?;
    aliases
        .iter()
        .find_map(|alias| bindings.get_key_value(*alias))
        .map(|(name, binding)| (name.as_str(), binding))
}

/// Canonical store path for the first alias bound on `node`.
///
/// Plain paths resolve to themselves (without the `state.` prefix); a
/// membership binding resolves to its list path. `None` means the control is
/// uncontrolled.
pub fn resolve_state_path(node: &IrNode, aliases: &[&str]) -> Option<String> {
    resolve_state_path_in(node, aliases, &Scope::new())
}

/// [`resolve_state_path`] inside a loop body. A path that starts with a loop
/// variable reads through the scope but has no store path, so the control is
/// uncontrolled; `state.` paths are always writable.
pub fn resolve_state_path_in(node: &IrNode, aliases: &[&str], scope: &Scope) -> Option<String> {
    let (_, binding) = find_binding(node, aliases)?;
    let expression = strip_braces(&binding.expression);
    match path::normalize(expression) {
        Some(_) if scope_owns(expression, scope) => None,
        Some(path) => Some(path),
        None => resolve_membership_in(node, aliases, scope).map(|m| m.list_path),
    }
}

/// The membership binding under the first alias bound on `node`, if it is one.
pub fn resolve_membership(node: &IrNode, aliases: &[&str]) -> Option<Membership> {
    resolve_membership_in(node, aliases, &Scope::new())
}

/// [`resolve_membership`] inside a loop body; `None` when the list is reached
/// through a loop variable.
pub fn resolve_membership_in(node: &IrNode, aliases: &[&str], scope: &Scope) -> Option<Membership> {
    let (_, binding) = find_binding(node, aliases)?;
    match eval::parse(strip_braces(&binding.expression))? {
        Expr::Compare(CompareOp::In, member, list) => Some(Membership {
            list_path: store_path(&list, scope)?,
            member: *member,
            list: *list,
        }),
        _ => None,
    }
}

/// Evaluates the expression bound under the first matching alias.
pub fn resolve_binding_value(node: &IrNode, aliases: &[&str], scope: &impl Lookup) -> Option<Value> {
    let (_, binding) = find_binding(node, aliases)?;
    Some(eval::resolve_any(strip_braces(&binding.expression), scope))
}

/// Action a list-backed checkbox emits when toggled to `checked`.
pub fn toggle_membership(membership: &Membership, checked: bool, scope: &impl Lookup) -> Action {
    let member = membership.member(scope);
    if checked {
        action::append(membership.list_path.clone(), member)
    } else {
        action::remove(membership.list_path.clone(), member)
    }
}

fn store_path(expr: &Expr, scope: &Scope) -> Option<String> {
    match expr {
        Expr::Path { state_only, path } if !path.is_empty() => {
            let head = path::segments(path).first().copied()?;
            (*state_only || scope.get(head).is_none()).then(|| path.clone())
        }
        _ => None,
    }
}

/// True when the expression's first segment names a loop variable.
fn scope_owns(expression: &str, scope: &Scope) -> bool {
    let head = expression
        .trim()
        .split(['.', '['])
        .next()
        .unwrap_or_default();
    head != path::STATE_PREFIX && scope.get(head).is_some()
}

fn strip_braces(expression: &str) -> &str {
    eval::single_placeholder(expression).unwrap_or(expression)
}
