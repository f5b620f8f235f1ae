//! JSON-RPC message codec.
//!
//! Turns typed requests into frame bodies and frame bodies into responses.
//! Bodies are compact JSON text with no terminator; the delimiter belongs to
//! [`Framing`](super::Framing).

use serde_json::Value;
use thiserror::Error;

use crate::models::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Codec error types.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes are not valid JSON.
    #[error("malformed-json: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// Outbound payloads must be JSON objects.
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// Valid JSON that is not a JSON-RPC response.
    #[error("frame is not a JSON-RPC response: {0}")]
    NotAResponse(String),
}

impl CodecError {
    /// Short machine-readable reason, stable across releases.
    pub fn reason(&self) -> &'static str {
        match self {
            CodecError::Encode(_) => "encode-failed",
            CodecError::MalformedJson(_) => "malformed-json",
            CodecError::NotAnObject(_) => "not-an-object",
            CodecError::NotAResponse(_) => "not-a-response",
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

/// Serialize a request to a frame body.
pub fn encode(request: &JsonRpcRequest) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(request).map_err(CodecError::Encode)
}

/// Validate hand-typed JSON-RPC text and re-serialize it compactly.
///
/// The text is forwarded as-is semantically; re-serializing only guarantees
/// it fits on a single line.
pub fn encode_raw(text: &str) -> Result<Vec<u8>, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::MalformedJson)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject(json_kind(&value)));
    }
    serde_json::to_vec(&value).map_err(CodecError::Encode)
}

/// Decode a frame body into a response.
pub fn decode(frame: &[u8]) -> Result<JsonRpcResponse, CodecError> {
    match decode_incoming(frame)? {
        Incoming::Response(response) => Ok(response),
        Incoming::Notification(notification) => Err(CodecError::NotAResponse(format!(
            "notification '{}'",
            notification.method
        ))),
    }
}

/// Decode a frame body into either a response or a server notification.
pub fn decode_incoming(frame: &[u8]) -> Result<Incoming, CodecError> {
    let value: Value = serde_json::from_slice(frame).map_err(CodecError::MalformedJson)?;

    let Some(object) = value.as_object() else {
        return Err(CodecError::NotAResponse(format!(
            "expected an object, got {}",
            json_kind(&value)
        )));
    };

    if object.contains_key("method") && !object.contains_key("id") {
        let notification: JsonRpcNotification = serde_json::from_value(value)
            .map_err(|e| CodecError::NotAResponse(e.to_string()))?;
        return Ok(Incoming::Notification(notification));
    }

    let has_result = object.contains_key("result");
    // `"error": null` counts as absent
    let has_error = object.get("error").is_some_and(|e| !e.is_null());
    match (has_result, has_error) {
        (false, false) => {
            return Err(CodecError::NotAResponse(
                "response missing both result and error".to_string(),
            ))
        }
        (true, true) => {
            return Err(CodecError::NotAResponse(
                "response has both result and error".to_string(),
            ))
        }
        _ => {}
    }

    let response: JsonRpcResponse =
        serde_json::from_value(value).map_err(|e| CodecError::NotAResponse(e.to_string()))?;
    Ok(Incoming::Response(response))
}

/// Human-readable name of a JSON value's kind.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
