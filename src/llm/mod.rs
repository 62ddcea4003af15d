//! # LLM adapter (`spec.md` §6)
//!
//! Outbound boundary to the language model used for transcript
//! classification and in-dialog utterance classification. Grounded on the
//! optional weather HTTP client in `smartyhall-meshbbs::meshtastic`, which
//! is the only place the teacher reaches out to a JSON HTTP API — promoted
//! here from an optional feature to the crate's standing LLM adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PostopError;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_s: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: String,
}

/// `spec.md` §6: `chat_completion({model, messages[], max_tokens,
/// temperature, timeout_s}) -> {content, finish_reason}`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(&self, req: ChatRequest) -> Result<ChatResponse, PostopError>;
}

/// Test double returning a fixed response regardless of the request,
/// matching the teacher's `Mock*` adapter convention used throughout its
/// integration tests.
pub struct MockLlmClient {
    pub response: String,
}

impl MockLlmClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }

    pub fn unavailable() -> UnavailableLlmClient {
        UnavailableLlmClient
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat_completion(&self, _req: ChatRequest) -> Result<ChatResponse, PostopError> {
        Ok(ChatResponse {
            content: self.response.clone(),
            finish_reason: "stop".into(),
        })
    }
}

/// Always fails with `LlmUnavailable`, for exercising the analyzer's
/// fallback path in tests.
pub struct UnavailableLlmClient;

#[async_trait]
impl LlmClient for UnavailableLlmClient {
    async fn chat_completion(&self, _req: ChatRequest) -> Result<ChatResponse, PostopError> {
        Err(PostopError::LlmUnavailable("mock unavailable".into()))
    }
}

#[derive(Deserialize)]
struct HttpChatChoice {
    message: HttpChatMessage,
    finish_reason: String,
}

#[derive(Deserialize)]
struct HttpChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct HttpChatCompletion {
    choices: Vec<HttpChatChoice>,
}

/// Production adapter backed by an OpenAI-compatible chat completions
/// endpoint over `reqwest`.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat_completion(&self, req: ChatRequest) -> Result<ChatResponse, PostopError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": req.model,
            "messages": req.messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(req.timeout_s))
            .json(&body)
            .send()
            .await
            .map_err(|e| PostopError::LlmUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PostopError::LlmUnavailable(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }

        let parsed: HttpChatCompletion = response
            .json()
            .await
            .map_err(|e| PostopError::LlmMalformed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PostopError::LlmMalformed("empty choices array".into()))?;

        Ok(ChatResponse {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
        })
    }
}
