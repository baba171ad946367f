//! JSON output handling for model responses.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Remove an optional Markdown code fence (```` ```json ```` or ```` ``` ````)
/// wrapping the whole response.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Parse a model response as JSON after stripping fences.
///
/// Failure is reported as [`Error::MalformedOutput`] carrying the raw text.
pub fn parse_json_output(text: &str) -> Result<Value> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| Error::MalformedOutput {
        message: e.to_string(),
        raw: text.to_string(),
    })
}

/// Like [`parse_json_output`] but into a typed payload.
pub fn parse_json_output_as<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| Error::MalformedOutput {
        message: e.to_string(),
        raw: text.to_string(),
    })
}
