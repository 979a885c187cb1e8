use thiserror::Error;

pub type IrResult<T> = Result<T, IrError>;

/// Errors raised while loading or validating an IR document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IrError {
    #[error("Failed to read '{path}': {message}")]
    ReadError { path: String, message: String },

    #[error("JSON parse error: {0}")]
    JsonError(String),

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error("Empty document: no root node found")]
    EmptyDocument,

    #[error("Invalid node at '{location}': {reason}")]
    InvalidNode { location: String, reason: String },

    #[error("Invalid binding '{binding}' at '{location}': expression must not be empty")]
    EmptyBinding { location: String, binding: String },

    #[error("Invalid loop at '{location}': iterable must not be empty")]
    EmptyLoopIterable { location: String },

    #[error("Invalid state key '{key}': {reason}")]
    InvalidStateKey { key: String, reason: String },

    #[error("Maximum nesting depth ({max_depth}) exceeded at '{location}'")]
    MaxNestingDepthExceeded { max_depth: usize, location: String },

    #[error("Registry has no fallback renderer")]
    MissingFallback,

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl From<serde_json::Error> for IrError {
    fn from(err: serde_json::Error) -> Self {
        IrError::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for IrError {
    fn from(err: serde_yaml::Error) -> Self {
        IrError::YamlError(err.to_string())
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Failures that abort a render pass. Renderers produce these; the dispatcher
/// only adds depth overflow.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Renderer for '{node_type}' failed: {message}")]
    Renderer { node_type: String, message: String },

    #[error("Maximum render depth ({max_depth}) exceeded at node '{node_type}'")]
    MaxDepthExceeded { max_depth: usize, node_type: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RenderError {
    pub fn renderer(node_type: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Renderer {
            node_type: node_type.into(),
            message: message.into(),
        }
    }
}
