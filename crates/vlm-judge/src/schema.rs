//! Wire contract between the verifier and a semantic judge.
//!
//! Judges are asked (via a JSON-schema format hint) to answer with exactly
//! `{"identical": bool, "description": string}`. Models do not always obey
//! the hint, so answers are decoded strictly and the two failure modes stay
//! distinguishable: text that is not JSON at all, and JSON of the wrong shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::VlmError;
use crate::Result;

/// Decoded judge answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlmVerdict {
    /// Whether the candidate is visually equivalent to the baseline
    pub identical: bool,
    /// Free-text explanation of what differs
    pub description: String,
}

/// JSON schema sent to providers as the response format hint.
pub fn verdict_json_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "identical": { "type": "boolean" },
            "description": { "type": "string" }
        },
        "required": ["identical", "description"]
    })
}

/// Decode a judge answer into a [`VlmVerdict`].
///
/// Returns [`VlmError::InvalidJson`] when `text` does not parse and
/// [`VlmError::SchemaMismatch`] when it parses to anything other than an
/// object with a boolean `identical` and a string `description`. Extra
/// fields are tolerated.
pub fn decode_verdict(text: &str) -> Result<VlmVerdict> {
    let value: Value = serde_json::from_str(text.trim()).map_err(VlmError::InvalidJson)?;

    let Value::Object(fields) = value else {
        return Err(VlmError::SchemaMismatch("expected a JSON object".to_string()));
    };

    let identical = match fields.get("identical") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(VlmError::SchemaMismatch(format!(
                "`identical` must be a boolean, got {other}"
            )))
        }
        None => {
            return Err(VlmError::SchemaMismatch(
                "missing required field `identical`".to_string(),
            ))
        }
    };

    let description = match fields.get("description") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(VlmError::SchemaMismatch(format!(
                "`description` must be a string, got {other}"
            )))
        }
        None => {
            return Err(VlmError::SchemaMismatch(
                "missing required field `description`".to_string(),
            ))
        }
    };

    Ok(VlmVerdict {
        identical,
        description,
    })
}
