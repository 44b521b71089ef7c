//! Offline backend that answers from keyword rules
//!
//! Useful for demos and for running the agent without a credential or a
//! network connection. Replies depend only on the latest user message.

use std::time::Duration;

use async_trait::async_trait;

use super::backend::{CompletionBackend, CompletionChoice, CompletionRequest, UpstreamError};
use crate::agent::context::Role;

/// Deterministic keyword-driven responder
#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    latency: Option<Duration>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering, to mimic a network round-trip
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
        }
    }
}

/// Build the canned reply for a query
pub fn simulated_reply(query: &str) -> String {
    let mut response = format!("I understand you're asking about: \"{}\"\n\n", query);

    if query.contains("help") || query.contains("what can you do") {
        response.push_str("I can help you with:\n");
        response.push_str("- Executing terminal commands\n");
        response.push_str("- Suggesting commands based on your intent\n");
        response.push_str("- Explaining command usage\n");
        response.push_str("- Providing information about your system\n");
    } else if query.contains("command") || query.contains("how to") {
        response.push_str("Here are some commands you might find useful:\n");
        response.push_str("- `ls -la`: List all files including hidden ones\n");
        response.push_str("- `find . -name \"*.js\"`: Find all JavaScript files\n");
        response.push_str("- `grep -r \"pattern\" .`: Search for a pattern in files\n");
    } else {
        response.push_str("I can help you with terminal operations. What would you like to do?");
    }

    response
}

#[async_trait]
impl CompletionBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionChoice>, UpstreamError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let query = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .ok_or(UpstreamError::EmptyResponse)?;

        let reply = simulated_reply(query);
        Ok((0..request.n.max(1))
            .map(|index| CompletionChoice {
                index,
                content: reply.clone(),
            })
            .collect())
    }
}
