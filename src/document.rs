use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ir::IrNode;

/// A loaded IR document.
///
/// Supports two shapes:
/// - `Full`: `{ "state": {...}, "root": {...} }` with an initial state block
/// - `Bare`: a single root node with no state declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IrDocument {
    Full {
        #[serde(default)]
        state: Map<String, Value>,
        root: IrNode,
    },
    Bare(IrNode),
}

impl IrDocument {
    /// Returns the root node regardless of shape
    pub fn root_node(&self) -> &IrNode {
        match self {
            IrDocument::Full { root, .. } => root,
            IrDocument::Bare(root) => root,
        }
    }

    /// Returns the initial state block if the document declares one
    pub fn initial_state(&self) -> Option<&Map<String, Value>> {
        match self {
            IrDocument::Full { state, .. } => Some(state),
            IrDocument::Bare(_) => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, IrDocument::Full { .. })
    }
}

impl From<IrNode> for IrDocument {
    fn from(root: IrNode) -> Self {
        IrDocument::Bare(root)
    }
}
