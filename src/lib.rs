//! # genui runtime
//!
//! Renders a declarative UI description (the IR) against mutable application
//! state through pluggable, per-platform node renderers.
//!
//! ## Features
//! - IR node model loadable from JSON or YAML, with structural validation
//! - Path-addressed state store with copy-on-write snapshots and watch-channel subscriptions
//! - Action model (set / append / remove / sequence) plus host-forwarded actions
//! - Expression evaluator for conditions, `{...}` interpolation and `in` membership tests
//! - Open node registry with an always-present fallback, and a recursive dispatcher
//!
//! ## Example
//! ```ignore
//! use genui_runtime::{parse_document, Dispatcher, NodeRegistry, Session};
//!
//! let doc = parse_document(r#"{
//!   "state": { "name": "Ada" },
//!   "root": { "type": "Text", "props": { "text": "Hello {name}" } }
//! }"#)?;
//!
//! let mut registry: NodeRegistry<(), String> = NodeRegistry::new();
//! registry.register("Text", |ctx| Ok(ctx.prop_text("text").unwrap_or_default()));
//!
//! let session = Session::from_document(&doc);
//! let out = Dispatcher::new(registry).render(&session, doc.root_node(), &())?;
//! assert_eq!(out.as_deref(), Some("Hello Ada"));
//! ```

pub mod action;
pub mod binding;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod eval;
pub mod ir;
pub mod loader;
pub mod options;
pub mod outline;
pub mod path;
pub mod registry;
pub mod scope;
pub mod session;
pub mod state;
pub mod validator;
pub mod value;

// --- Core types ---
pub use action::{append, is_action_supported, remove, sequence, set, Action};
pub use binding::{Membership, CHECKED_ALIASES, VALUE_ALIASES};
pub use dispatch::{Dispatcher, RenderContext};
pub use document::IrDocument;
pub use error::{IrError, IrResult, RenderError, RenderResult};
pub use eval::{evaluate_condition, interpolate_text, resolve_any, Lookup};
pub use ir::{Binding, IrNode, LoopSpec};
pub use options::RenderOptions;
pub use registry::{NodeRegistry, Renderer};
pub use scope::{Env, Scope};
pub use session::{ActionHandler, ActionSink, Session, SessionTable};
pub use state::{ApplyOutcome, Snapshot, StateFlow, StateStore};
pub use value::is_truthy;

/// Parse and validate an IR document in either JSON or YAML form
pub fn parse_document(text: &str) -> IrResult<IrDocument> {
    loader::parse_document(text)
}

/// Parse and validate an IR document with custom options
pub fn parse_document_with_options(text: &str, options: &RenderOptions) -> IrResult<IrDocument> {
    loader::parse_document_with_options(text, options)
}

/// Parse, validate and open a session on an IR document
pub fn load_session(text: &str) -> IrResult<(IrDocument, Session)> {
    let doc = parse_document(text)?;
    let session = Session::from_document(&doc);
    Ok((doc, session))
}
