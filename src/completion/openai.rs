//! OpenAI-compatible chat completions backend
//!
//! Talks to `POST {base_url}/chat/completions` with bearer authentication.
//! Anything that speaks the same wire format (OpenAI, Azure-style proxies,
//! vLLM, LM Studio, ...) works.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::backend::{CompletionBackend, CompletionChoice, CompletionRequest, UpstreamError};
use crate::agent::context::Message;

/// Default API root
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    n: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    index: u32,
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiBackend {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create a new backend
    ///
    /// # Arguments
    /// * `base_url` - API root without trailing slash (e.g., "https://api.openai.com/v1")
    /// * `api_key` - Bearer credential; `None` makes initialization fail
    /// * `request_timeout` - Per-request deadline (`None` waits forever)
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, UpstreamError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: builder.build()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn requires_credential(&self) -> bool {
        true
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionChoice>, UpstreamError> {
        let body = ChatCompletionBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            n: request.n,
        };

        let mut http = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(UpstreamError::from_reqwest)?;
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

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)?;
        let mut choices: Vec<CompletionChoice> = parsed
            .choices
            .into_iter()
            .map(|c| CompletionChoice {
                index: c.index,
                content: c.message.content.unwrap_or_default(),
            })
            .collect();
        choices.sort_by_key(|c| c.index);
        Ok(choices)
    }
}
