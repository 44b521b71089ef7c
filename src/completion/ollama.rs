//! Ollama chat backend
//!
//! Uses the non-streaming `/api/chat` endpoint. Ollama has no `n` parameter,
//! so a request for several completions is served by that many sequential
//! calls; the call ordinal becomes the choice index.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;

use super::backend::{CompletionBackend, CompletionChoice, CompletionRequest, UpstreamError};

/// Default local Ollama server
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Client for Ollama's /api/chat endpoint
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    /// * `request_timeout` - Per-request deadline (`None` waits forever)
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    async fn chat_once(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens
            }
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&body)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(UpstreamError::from_reqwest)?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        tracing::trace!(eval_count = chat_response.eval_count, "Ollama chat completed");
        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl CompletionBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionChoice>, UpstreamError> {
        stream::iter(0..request.n.max(1))
            .then(|index| async move {
                let content = self.chat_once(request).await?;
                Ok::<_, UpstreamError>(CompletionChoice { index, content })
            })
            .try_collect()
            .await
    }
}
