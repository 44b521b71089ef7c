//! The completion backend capability
//!
//! The core depends only on this shape: submit a prompt, get back up to `n`
//! completions in the backend's ranking order. Concrete transports live in
//! sibling modules.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::agent::context::Message;
use crate::metrics::{COMPLETION_CALLS, COMPLETION_CALL_TIME};

/// A request for one or more completions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g., "gpt-3.5-turbo", "llama3.2")
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Role-tagged prompt, oldest first
    pub messages: Vec<Message>,
    /// Number of completions wanted
    pub n: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: 150,
            messages,
            n: 1,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }
}

/// One candidate completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Position in the backend's ranking, 0 = best
    pub index: u32,
    pub content: String,
}

/// Error type for completion backends
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("empty response from backend")]
    EmptyResponse,
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Classify a transport error, separating timeouts from other failures
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Request(e)
        }
    }
}

/// Something that turns prompts into completions
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short label used in logs and metrics ("openai", "ollama", ...)
    fn name(&self) -> &str;

    /// Whether the backend needs an API credential to be usable
    fn requires_credential(&self) -> bool {
        false
    }

    /// Whether a credential is actually configured
    fn has_credential(&self) -> bool {
        false
    }

    /// Submit a request, returning choices in ranking order
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionChoice>, UpstreamError>;
}

/// Call a backend inside a tracing span, recording latency and outcome
pub async fn submit(
    backend: &dyn CompletionBackend,
    request: &CompletionRequest,
) -> Result<Vec<CompletionChoice>, UpstreamError> {
    let span = info_span!(
        "completion",
        backend = backend.name(),
        model = %request.model,
        n = request.n,
        otel.name = "completion"
    );

    async {
        let start = Instant::now();
        let result = backend.complete(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        COMPLETION_CALL_TIME
            .with_label_values(&[backend.name()])
            .observe(elapsed);

        match &result {
            Ok(choices) => {
                COMPLETION_CALLS
                    .with_label_values(&[backend.name(), "success"])
                    .inc();
                debug!(choices = choices.len(), duration_ms = elapsed * 1000.0, "Completion received");
            }
            Err(e) => {
                COMPLETION_CALLS
                    .with_label_values(&[backend.name(), "error"])
                    .inc();
                warn!(error = %e, "Completion failed");
            }
        }
        result
    }
    .instrument(span)
    .await
}
