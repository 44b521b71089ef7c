//! Agent module: conversation state, persistence and orchestration
//!
//! # Architecture
//!
//! ```text
//! Query → ConversationManager ─ append user message
//!              ↓
//!         CompletionBackend (OpenAI / Ollama / simulated)
//!              ↓
//!         append assistant message
//!              ↓
//!         ContextStore.save (last 10 messages) → context.json
//!
//! Command line → CommandExecutor → CommandResult (not recorded)
//! ```

pub mod context;
pub mod manager;
pub mod store;
pub mod suggest;

pub use context::{ConversationContext, Message, Metadata, Role, HISTORY_WINDOW};
pub use manager::{
    format_command_result, AgentError, ConversationConfig, ConversationManager, OrphanPolicy,
    DEFAULT_AGENT_SYSTEM_PROMPT,
};
pub use store::{ContextStore, PersistenceError};
pub use suggest::suggest_commands;
