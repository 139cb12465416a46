//! Wire types for the OpenAI-compatible chat-completion API.
//!
//! Response fields are all optional: providers omit or null them freely,
//! and the extractor turns each missing hop into a typed error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::InferenceError;

/// Sampling parameters sent with every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

/// The only generation configuration the service uses.
pub const GENERATION: GenerationConfig = GenerationConfig {
    temperature: 0.3,
    max_tokens: 16_000,
    top_p: 1.0,
    frequency_penalty: 0.0,
    presence_penalty: 0.0,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying text followed by an image data URL.
    pub fn user_with_image(text: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url.into(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Raw response envelope of one stage call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
    /// Set by gateways that report upstream failures with HTTP 200.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unspecified error");
        match &self.code {
            Some(Value::String(code)) => format!("{message} (code {code})"),
            Some(Value::Null) | None => message.to_string(),
            Some(code) => format!("{message} (code {code})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl ChatResponse {
    /// Turn an in-body error object into an `InferenceError::Api`.
    pub fn into_result(self) -> Result<Self, InferenceError> {
        match &self.error {
            Some(error) => Err(InferenceError::Api(error.describe())),
            None => Ok(self),
        }
    }

    /// Response whose first choice carries free text.
    pub fn with_content(text: impl Into<String>) -> Self {
        Self {
            choices: Some(vec![Choice {
                message: Some(ResponseMessage {
                    content: Some(text.into()),
                    tool_calls: None,
                }),
            }]),
            error: None,
        }
    }

    /// Response whose first choice calls `name` with raw `arguments`.
    pub fn with_tool_call(name: &str, arguments: impl Into<String>) -> Self {
        Self {
            choices: Some(vec![Choice {
                message: Some(ResponseMessage {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        function: Some(FunctionCall {
                            name: Some(name.to_string()),
                            arguments: Some(arguments.into()),
                        }),
                    }]),
                }),
            }]),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_flattens_generation_config() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            tools: None,
            tool_choice: None,
            generation: GENERATION,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["temperature"], 0.3);
        assert_eq!(value["max_tokens"], 16000);
        assert_eq!(value["top_p"], 1.0);
        assert_eq!(value["presence_penalty"], 0.0);
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "s"}));
    }

    #[test]
    fn image_message_uses_content_parts() {
        let message = ChatMessage::user_with_image("look", "data:image/png;base64,AAAA");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["content"][0], json!({"type": "text", "text": "look"}));
        assert_eq!(
            value["content"][1],
            json!({"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}})
        );
    }

    #[test]
    fn response_tolerates_missing_and_null_fields() {
        let parsed: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_none());

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"id": "x", "choices": [{"message": {"content": null}}]}"#)
                .unwrap();
        let message = parsed.choices.unwrap()[0].message.clone().unwrap();
        assert!(message.content.is_none());
        assert!(message.tool_calls.is_none());
    }

    #[test]
    fn response_reads_tool_call_arguments() {
        let raw = r#"{
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "output_risks_json", "arguments": "{\"data\": []}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, ChatResponse::with_tool_call("output_risks_json", "{\"data\": []}"));
    }

    #[test]
    fn in_body_error_becomes_inference_error() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"error": {"message": "Rate limit exceeded", "code": 429}}"#)
                .unwrap();
        match parsed.into_result() {
            Err(InferenceError::Api(message)) => {
                assert_eq!(message, "Rate limit exceeded (code 429)")
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn response_without_error_passes_through() {
        let response = ChatResponse::with_content("ok");
        assert_eq!(response.clone().into_result().unwrap(), response);
    }
}
