//! Node type → renderer lookup.
//!
//! Node types are an open set of strings, so the registry is a map of small
//! renderer closures plus a fallback that covers every unregistered type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::dispatch::RenderContext;
use crate::error::{IrError, IrResult, RenderResult};

/// Renders one node. Leaf renderers are plain closures of this shape.
pub type Renderer<P, O> = Arc<dyn Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync>;

pub struct NodeRegistry<P, O> {
    renderers: HashMap<String, Renderer<P, O>>,
    fallback: Renderer<P, O>,
}

impl<P, O> Clone for NodeRegistry<P, O> {
    fn clone(&self) -> Self {
        Self {
            renderers: self.renderers.clone(),
            fallback: Arc::clone(&self.fallback),
        }
    }
}

impl<P, O> fmt::Debug for NodeRegistry<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.registered_types())
            .finish_non_exhaustive()
    }
}

impl<P: 'static, O: From<String> + 'static> NodeRegistry<P, O> {
    /// An empty registry whose fallback renders a visible
    /// `Unknown component: <type>` label.
    pub fn new() -> Self {
        Self::with_fallback(unknown_node_fallback::<P, O>)
    }
}

impl<P: 'static, O: From<String> + 'static> Default for NodeRegistry<P, O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Default fallback: logs the miss and emits a labelled placeholder.
pub fn unknown_node_fallback<P, O: From<String>>(ctx: &RenderContext<'_, P, O>) -> RenderResult<O> {
    warn!(node_type = %ctx.node.node_type, "no renderer registered; using fallback");
    Ok(O::from(format!("Unknown component: {}", ctx.node.node_type)))
}

impl<P: 'static, O: 'static> NodeRegistry<P, O> {
    pub fn with_fallback(
        fallback: impl Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            renderers: HashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Declares a whole registry in one call.
    ///
    /// ```ignore
    /// let registry = NodeRegistry::build(|r| {
    ///     r.register("Text", |ctx| Ok(ctx.prop_text("text").unwrap_or_default()));
    ///     r.fallback(|ctx| Ok(format!("?{}", ctx.node.node_type)));
    /// })?;
    /// ```
    pub fn build(declare: impl FnOnce(&mut RegistryBuilder<P, O>)) -> IrResult<Self> {
        let mut builder = RegistryBuilder {
            renderers: HashMap::new(),
            fallback: None,
        };
        declare(&mut builder);
        let fallback = builder.fallback.ok_or(IrError::MissingFallback)?;
        Ok(Self {
            renderers: builder.renderers,
            fallback,
        })
    }

    /// Associates `node_type` with `renderer`. A second registration for the
    /// same type replaces the first.
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        renderer: impl Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync + 'static,
    ) -> &mut Self {
        self.renderers.insert(node_type.into(), Arc::new(renderer));
        self
    }

    /// Replaces the renderer used for unregistered types.
    pub fn fallback(
        &mut self,
        renderer: impl Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync + 'static,
    ) -> &mut Self {
        self.fallback = Arc::new(renderer);
        self
    }

    /// Registered renderer for `node_type`, or the fallback.
    pub fn get_renderer(&self, node_type: &str) -> &Renderer<P, O> {
        self.renderers.get(node_type).unwrap_or(&self.fallback)
    }
}

impl<P, O> NodeRegistry<P, O> {
    pub fn is_registered(&self, node_type: &str) -> bool {
        self.renderers.contains_key(node_type)
    }

    /// Registered type names, sorted
    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.renderers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Collects registrations for [`NodeRegistry::build`].
pub struct RegistryBuilder<P, O> {
    renderers: HashMap<String, Renderer<P, O>>,
    fallback: Option<Renderer<P, O>>,
}

impl<P: 'static, O: 'static> RegistryBuilder<P, O> {
    pub fn register(
        &mut self,
        node_type: impl Into<String>,
        renderer: impl Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync + 'static,
    ) -> &mut Self {
        self.renderers.insert(node_type.into(), Arc::new(renderer));
        self
    }

    pub fn fallback(
        &mut self,
        renderer: impl Fn(&RenderContext<'_, P, O>) -> RenderResult<O> + Send + Sync + 'static,
    ) -> &mut Self {
        self.fallback = Some(Arc::new(renderer));
        self
    }
}
