use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_ITEM_NAME: &str = "item";
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Tunables shared by the validator and the dispatcher.
///
/// ```yaml
/// maxDepth: 32
/// itemName: row
/// indexName: i
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Deepest node nesting accepted when validating or rendering
    pub max_depth: usize,
    /// Loop element name used when a loop does not declare `as`
    pub item_name: String,
    /// Loop position name used when a loop does not declare `indexAs`
    pub index_name: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            item_name: DEFAULT_ITEM_NAME.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
        }
    }
}

impl RenderOptions {
    pub fn from_yaml(text: &str) -> IrResult<Self> {
        let options: RenderOptions = serde_yaml::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> IrResult<()> {
        if self.max_depth == 0 {
            return Err(IrError::InvalidOptions("maxDepth must be at least 1".to_string()));
        }
        if self.item_name.trim().is_empty() || self.index_name.trim().is_empty() {
            return Err(IrError::InvalidOptions(
                "itemName and indexName must not be empty".to_string(),
            ));
        }
        if self.item_name == self.index_name {
            return Err(IrError::InvalidOptions(
                "itemName and indexName must differ".to_string(),
            ));
        }
        Ok(())
    }
}
