use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::types::{ChatRequest, ChatResponse};
use super::InferenceError;

/// Chat-completion transport. Blocking: callers run it off the async runtime.
pub trait InferenceClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError>;
}

/// Allow a shared client (e.g. a mock the test still inspects) behind the invoker.
impl<T: InferenceClient + ?Sized> InferenceClient for Arc<T> {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        (**self).complete(request)
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI itself, OpenRouter, a local gateway).
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OpenAiClient {
    /// Build the client. Must not be called from inside an async context:
    /// the blocking client spins up its own runtime.
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, InferenceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| InferenceError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timeout_secs,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl InferenceClient for OpenAiClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        let url = self.completions_url();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    InferenceError::Connection {
                        url: self.base_url.clone(),
                        message: e.to_string(),
                    }
                } else {
                    InferenceError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ChatResponse>()
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.timeout_secs)
                } else {
                    InferenceError::Decode(e.to_string())
                }
            })?
            .into_result()
    }
}

type Responder = Box<dyn Fn(&ChatRequest) -> Result<ChatResponse, InferenceError> + Send + Sync>;

/// Mock client for testing. Either replays a fixed script of replies in
/// order or answers through a closure; every request is recorded.
pub struct MockInferenceClient {
    script: Mutex<VecDeque<Result<ChatResponse, InferenceError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockInferenceClient {
    pub fn scripted(replies: Vec<Result<ChatResponse, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<ChatResponse, InferenceError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl InferenceClient for MockInferenceClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(responder) = &self.responder {
            return responder(request);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Err(InferenceError::Http("mock script exhausted".into())))
    }
}
