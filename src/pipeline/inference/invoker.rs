use std::sync::Arc;

use super::openai::InferenceClient;
use super::types::{ChatMessage, ChatRequest, ChatResponse, GENERATION};
use super::InferenceError;
use crate::models::enums::Stage;
use crate::pipeline::prompt::{PromptContext, PromptRegistry};

/// Runs one stage call: registered prompts and tool, fixed sampling
/// parameters, optional image.
pub struct ModelInvoker {
    client: Box<dyn InferenceClient + Send + Sync>,
    registry: Arc<PromptRegistry>,
    model: String,
}

impl ModelInvoker {
    pub fn new(
        client: Box<dyn InferenceClient + Send + Sync>,
        registry: Arc<PromptRegistry>,
        model: &str,
    ) -> Self {
        Self {
            client,
            registry,
            model: model.to_string(),
        }
    }

    pub fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    pub fn build_request(
        &self,
        stage: Stage,
        media: Option<&str>,
        context: &PromptContext<'_>,
    ) -> ChatRequest {
        let prompt = self.registry.get(stage);
        let user_prompt = prompt.render_user_prompt(context);

        let user_message = match media {
            Some(data_url) => ChatMessage::user_with_image(user_prompt, data_url),
            None => ChatMessage::user(user_prompt),
        };

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(prompt.system_prompt.clone()), user_message],
            tools: prompt.tool.as_ref().map(|t| vec![t.definition.clone()]),
            tool_choice: prompt.tool.as_ref().map(|t| t.choice()),
            generation: GENERATION,
        }
    }

    /// `media` is a `data:<mime>;base64,...` URL.
    pub fn invoke(
        &self,
        stage: Stage,
        media: Option<&str>,
        context: &PromptContext<'_>,
    ) -> Result<ChatResponse, InferenceError> {
        let request = self.build_request(stage, media, context);
        let started = std::time::Instant::now();
        let result = self.client.complete(&request);
        match &result {
            Ok(_) => tracing::debug!(
                stage = %stage,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage call completed"
            ),
            Err(e) => tracing::warn!(stage = %stage, error = %e, "Stage call failed"),
        }
        result
    }
}
