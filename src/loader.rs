//! Turns JSON or YAML text into a validated [`IrDocument`].

use std::fs;
use std::path::Path;
use tracing::debug;

use crate::document::IrDocument;
use crate::error::{IrError, IrResult};
use crate::options::RenderOptions;
use crate::validator;

/// Parse and validate a JSON IR document
pub fn parse_document_json(text: &str) -> IrResult<IrDocument> {
    parse_document_json_with_options(text, &RenderOptions::default())
}

pub fn parse_document_json_with_options(text: &str, options: &RenderOptions) -> IrResult<IrDocument> {
    if text.trim().is_empty() {
        return Err(IrError::EmptyDocument);
    }
    let doc: IrDocument = serde_json::from_str(text)?;
    validator::validate_document_with_options(&doc, options)?;
    Ok(doc)
}

/// Parse and validate a YAML IR document
pub fn parse_document_yaml(text: &str) -> IrResult<IrDocument> {
    parse_document_yaml_with_options(text, &RenderOptions::default())
}

pub fn parse_document_yaml_with_options(text: &str, options: &RenderOptions) -> IrResult<IrDocument> {
    if is_blank_yaml(text) {
        return Err(IrError::EmptyDocument);
    }
    let doc: IrDocument = serde_yaml::from_str(text)?;
    validator::validate_document_with_options(&doc, options)?;
    Ok(doc)
}

/// Parse either format. Text starting with `{` is JSON, anything else YAML.
pub fn parse_document(text: &str) -> IrResult<IrDocument> {
    parse_document_with_options(text, &RenderOptions::default())
}

pub fn parse_document_with_options(text: &str, options: &RenderOptions) -> IrResult<IrDocument> {
    if text.trim_start().starts_with('{') {
        debug!("loading IR as JSON");
        parse_document_json_with_options(text, options)
    } else {
        debug!("loading IR as YAML");
        parse_document_yaml_with_options(text, options)
    }
}

/// Reads `path` and parses it as either format.
pub fn load_document_file(path: impl AsRef<Path>, options: &RenderOptions) -> IrResult<IrDocument> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| IrError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_document_with_options(&text, options)
}

/// Only whitespace, comments or a bare document marker
fn is_blank_yaml(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "---")
}
