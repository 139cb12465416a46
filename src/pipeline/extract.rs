//! Pull structured payloads out of chat-completion envelopes.
//!
//! Every hop of `choices[0].message.tool_calls[0].function.arguments` has its
//! own error so a log line says exactly where a response went wrong.
//! Extraction is a pure function of the response.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::inference::types::{ChatResponse, ResponseMessage};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Response has no choices")]
    MissingChoices,

    #[error("First choice has no message")]
    MissingMessage,

    #[error("Message has no tool calls")]
    MissingToolCalls,

    #[error("Tool call has no function arguments")]
    MissingArguments,

    #[error("Function arguments are not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Function arguments have no '{0}' key")]
    MissingKey(String),

    #[error("Message has no text content")]
    MissingContent,

    #[error("Payload has unexpected shape: {0}")]
    PayloadShape(String),
}

fn first_message(response: &ChatResponse) -> Result<&ResponseMessage, ExtractionError> {
    let choice = response
        .choices
        .as_deref()
        .and_then(|choices| choices.first())
        .ok_or(ExtractionError::MissingChoices)?;
    choice.message.as_ref().ok_or(ExtractionError::MissingMessage)
}

/// Value under `expected_key` in the first tool call's arguments.
/// A key present with a `null` value counts as missing.
pub fn extract_tool_payload(
    response: &ChatResponse,
    expected_key: &str,
) -> Result<Value, ExtractionError> {
    let message = first_message(response)?;
    let call = message
        .tool_calls
        .as_deref()
        .and_then(|calls| calls.first())
        .ok_or(ExtractionError::MissingToolCalls)?;
    let arguments = call
        .function
        .as_ref()
        .and_then(|f| f.arguments.as_deref())
        .ok_or(ExtractionError::MissingArguments)?;

    let parsed: Value = serde_json::from_str(arguments)
        .map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;

    match parsed.get(expected_key) {
        Some(Value::Null) | None => Err(ExtractionError::MissingKey(expected_key.to_string())),
        Some(value) => Ok(value.clone()),
    }
}

/// Tool payload deserialized into `T`.
pub fn extract_typed<T: DeserializeOwned>(
    response: &ChatResponse,
    expected_key: &str,
) -> Result<T, ExtractionError> {
    let payload = extract_tool_payload(response, expected_key)?;
    serde_json::from_value(payload).map_err(|e| ExtractionError::PayloadShape(e.to_string()))
}

/// Tool payload as a list of items. A single object is accepted as a
/// one-element list.
pub fn extract_items(
    response: &ChatResponse,
    expected_key: &str,
) -> Result<Vec<Value>, ExtractionError> {
    match extract_tool_payload(response, expected_key)? {
        Value::Array(items) => Ok(items),
        object @ Value::Object(_) => Ok(vec![object]),
        other => Err(ExtractionError::PayloadShape(format!(
            "expected an object or array under '{expected_key}', got {}",
            json_kind(&other)
        ))),
    }
}

/// Free-text answer of the first choice. Blank text counts as missing.
pub fn extract_content(response: &ChatResponse) -> Result<String, ExtractionError> {
    let message = first_message(response)?;
    match message.content.as_deref() {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ExtractionError::MissingContent),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
