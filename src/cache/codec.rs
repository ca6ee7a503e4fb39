//! Shared tier payload encoding.
//!
//! Strings are stored as raw text, every other JSON value as JSON text.
//! Decoding parses JSON and falls back to a plain string, so a string that
//! happens to be valid JSON (`"42"`, `"true"`) reads back as the parsed value.

use serde_json::Value;

pub fn encode(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

pub fn decode(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()))
}
