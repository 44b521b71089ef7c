//! Conversation Manager - the façade over the agent core
//!
//! Owns the in-memory conversation, sends it to the completion backend,
//! persists the result through the [`ContextStore`], and exposes command
//! execution and command-suggestion helpers.
//!
//! Turns on one manager are serialized: `process_query` holds the state
//! lock from the moment the user message is appended until the context has
//! been persisted, so overlapping calls queue up instead of racing on the
//! shared history.

use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::context::{merge_metadata, ConversationContext, Message, Metadata};
use super::store::ContextStore;
use super::suggest;
use crate::completion::{submit, CompletionBackend, CompletionRequest, UpstreamError};
use crate::exec::{CommandExecutor, CommandResult, ExecutionError};
use crate::metrics::{AGENT_QUERIES, PERSISTENCE_FAILURES};

/// Default system prompt for the terminal assistant
pub const DEFAULT_AGENT_SYSTEM_PROMPT: &str = r#"You are NextShell, an assistant embedded in a web terminal.

You help the user with terminal operations:
- Suggest shell commands that accomplish what they describe
- Explain what a command does and how to use it
- Interpret command output they paste back to you

Keep answers short. Put commands in backticks."#;

/// What happens to the user message when the backend call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Keep the unanswered user message in history
    #[default]
    Retain,
    /// Remove the user message again before returning the error
    Rollback,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(OrphanPolicy::Retain),
            "rollback" => Ok(OrphanPolicy::Rollback),
            other => Err(format!("unknown orphan policy: {other} (expected retain|rollback)")),
        }
    }
}

/// Configuration for the conversation manager
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationConfig {
    /// Model to request completions from (e.g., "gpt-3.5-turbo")
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
    /// Context used until a persisted one is loaded
    pub default_context: Metadata,
    pub orphan_policy: OrphanPolicy,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 150,
            system_prompt: None,
            default_context: Metadata::new(),
            orphan_policy: OrphanPolicy::Retain,
        }
    }
}

/// Error type for agent operations
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Required configuration (usually the API credential) is missing
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A command could not be run
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
    /// The completion backend failed
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

struct ConversationState {
    initialized: bool,
    context: ConversationContext,
}

/// Conversation Manager orchestrating completions, history and persistence
pub struct ConversationManager {
    backend: Arc<dyn CompletionBackend>,
    store: ContextStore,
    executor: CommandExecutor,
    config: ConversationConfig,
    state: Mutex<ConversationState>,
}

impl ConversationManager {
    /// Create a new conversation manager
    ///
    /// # Arguments
    /// * `backend` - Completion backend for assistant replies
    /// * `store` - Where the conversation is persisted
    /// * `executor` - Runs commands for [`execute_command`](Self::execute_command)
    /// * `config` - Model parameters and policies
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: ContextStore,
        executor: CommandExecutor,
        config: ConversationConfig,
    ) -> Self {
        let context = ConversationContext::new(Vec::new(), config.default_context.clone());
        Self {
            backend,
            store,
            executor,
            config,
            state: Mutex::new(ConversationState {
                initialized: false,
                context,
            }),
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Check the credential and load the persisted context
    ///
    /// Idempotent: once it has succeeded, further calls return `Ok(())`
    /// without touching the store.
    pub async fn initialize(&self) -> Result<(), AgentError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.initialized
    }

    async fn ensure_initialized(&self, state: &mut ConversationState) -> Result<(), AgentError> {
        if state.initialized {
            return Ok(());
        }

        if self.backend.requires_credential() && !self.backend.has_credential() {
            return Err(AgentError::Configuration(format!(
                "the {} backend requires an API key. Set OPENAI_API_KEY or pass one in the configuration.",
                self.backend.name()
            )));
        }

        match self.store.try_load().await {
            Ok(Some(loaded)) => {
                info!(
                    path = %self.store.path().display(),
                    messages = loaded.history.len(),
                    "Restored conversation context"
                );
                state.context = loaded;
            }
            Ok(None) => {}
            Err(e) => {
                PERSISTENCE_FAILURES.with_label_values(&["load"]).inc();
                warn!(error = %e, "Error loading context, keeping defaults");
            }
        }

        state.initialized = true;
        Ok(())
    }

    /// Answer a user query within the ongoing conversation
    ///
    /// # Arguments
    /// * `query` - The user's message
    /// * `overrides` - Per-call context merged over the stored context
    ///   (override wins key-for-key); it is not persisted
    ///
    /// # Returns
    /// The assistant's reply, which has also been appended to the history
    /// and persisted
    pub async fn process_query(
        &self,
        query: &str,
        overrides: &Metadata,
    ) -> Result<String, AgentError> {
        let trace_id = Uuid::now_v7().to_string();
        let span = info_span!(
            "agent_query",
            trace_id = %trace_id,
            backend = self.backend.name(),
            model = %self.config.model,
            otel.name = "agent_query"
        );

        async {
            let mut state = self.state.lock().await;
            self.ensure_initialized(&mut state).await?;

            let merged = merge_metadata(&state.context.metadata, overrides);
            state.context.history.push(Message::user(query));
            info!(trace_id = %trace_id, history = state.context.history.len(), "Processing query");

            let request = self.build_request(&state.context, &merged);
            let reply = submit(self.backend.as_ref(), &request)
                .await
                .and_then(|choices| {
                    choices
                        .into_iter()
                        .min_by_key(|c| c.index)
                        .map(|c| c.content)
                        .ok_or(UpstreamError::EmptyResponse)
                });

            let response = match reply {
                Ok(response) => response,
                Err(e) => {
                    AGENT_QUERIES.with_label_values(&["error"]).inc();
                    warn!(trace_id = %trace_id, error = %e, policy = ?self.config.orphan_policy, "Query failed");
                    if self.config.orphan_policy == OrphanPolicy::Rollback {
                        state.context.history.pop();
                    }
                    return Err(AgentError::from(e));
                }
            };

            state.context.history.push(Message::assistant(response.clone()));
            self.persist(&state.context).await;

            AGENT_QUERIES.with_label_values(&["success"]).inc();
            info!(trace_id = %trace_id, response_len = response.len(), "Query answered");
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Forget the whole history and persist the empty conversation
    ///
    /// Initializes first, so stored metadata survives the clear.
    pub async fn clear_history(&self) -> Result<(), AgentError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await?;
        state.context.history.clear();
        self.persist(&state.context).await;
        info!("Conversation history cleared");
        Ok(())
    }

    /// Append a command result to the history as a system message
    ///
    /// Results are never recorded automatically; this is the explicit way
    /// to let the assistant see them. Initializes first, so the result is
    /// appended to the persisted conversation rather than replacing it.
    pub async fn record_command_result(&self, result: &CommandResult) -> Result<(), AgentError> {
        let mut state = self.state.lock().await;
        self.ensure_initialized(&mut state).await?;
        state
            .context
            .history
            .push(Message::system(format_command_result(result)));
        self.persist(&state.context).await;
        Ok(())
    }

    /// Run a literal command line, outside the conversational flow
    pub async fn execute_command(&self, command_line: &str) -> Result<CommandResult, AgentError> {
        Ok(self.executor.execute(command_line).await?)
    }

    /// Keyword-based command suggestions (no backend call)
    pub fn suggest_commands(&self, intent: &str) -> Vec<String> {
        suggest::suggest_commands(intent)
    }

    /// Snapshot of the in-memory history
    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.context.history.clone()
    }

    /// Snapshot of the stored context metadata
    pub async fn metadata(&self) -> Metadata {
        self.state.lock().await.context.metadata.clone()
    }

    fn build_request(&self, context: &ConversationContext, merged: &Metadata) -> CompletionRequest {
        let mut system = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENT_SYSTEM_PROMPT.to_string());
        if !merged.is_empty() {
            let rendered = serde_json::to_string_pretty(merged).unwrap_or_default();
            system.push_str("\n\nContext:\n");
            system.push_str(&rendered);
        }

        let mut messages = Vec::with_capacity(context.window().len() + 1);
        messages.push(Message::system(system));
        messages.extend_from_slice(context.window());

        CompletionRequest::new(&self.config.model, messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
    }

    async fn persist(&self, context: &ConversationContext) {
        if let Err(e) = self.store.try_save(context).await {
            PERSISTENCE_FAILURES.with_label_values(&["save"]).inc();
            warn!(error = %e, "Error saving context");
        }
    }
}

/// Render a command result the way it is fed back into the conversation
pub fn format_command_result(result: &CommandResult) -> String {
    let exit = match result.exit_code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    };
    format!(
        "Command: {}\nExit code: {}\nStdout:\n{}\nStderr:\n{}",
        result.command, exit, result.stdout, result.stderr
    )
}
