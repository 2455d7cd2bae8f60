//! Structured context attached to log records
//!
//! Context is an ordered JSON object. It is persisted inside a small
//! versioned envelope, `{"v":1,"fields":{...}}`, so the stored form stays
//! readable by any implementation and can evolve without guessing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Key/value metadata carried by a log record
pub type Context = Map<String, Value>;

/// Current version of the stored context envelope
pub const CONTEXT_ENCODING_VERSION: u8 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    v: u8,
    fields: &'a Context,
}

#[derive(Deserialize)]
struct Envelope {
    v: u8,
    #[serde(default)]
    fields: Context,
}

/// Errors decoding a stored context envelope
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("malformed context envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported context encoding version {0}")]
    UnsupportedVersion(u8),
}

/// Encode context into its stored envelope
pub fn encode_context(context: &Context) -> serde_json::Result<String> {
    serde_json::to_string(&EnvelopeRef {
        v: CONTEXT_ENCODING_VERSION,
        fields: context,
    })
}

/// Decode a stored context envelope
pub fn decode_context(raw: &str) -> Result<Context, ContextError> {
    let envelope: Envelope = serde_json::from_str(raw)?;
    if envelope.v != CONTEXT_ENCODING_VERSION {
        return Err(ContextError::UnsupportedVersion(envelope.v));
    }
    Ok(envelope.fields)
}

/// Text form of a context value when substituted into a message
///
/// Strings are used verbatim, scalars use their JSON spelling, null renders
/// empty, and arrays/objects render as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Loose truthiness of a context value
///
/// `null`, `false`, `0`, `0.0`, `""`, `"0"`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
