//! NextShell - agent orchestration core for a web terminal
//!
//! Keeps a conversation with a language model, persists it between runs,
//! executes shell commands, and produces code suggestions for the editor.
//!
//! # Modules
//!
//! - `agent` - Conversation state, context persistence and the manager façade
//! - `completion` - Completion backends (OpenAI, Ollama, simulated) and code prompts
//! - `exec` - Shell command execution with captured output
//! - `config` - Environment-driven configuration and wiring
//! - `logging` - tracing subscriber setup
//! - `metrics` - Prometheus metrics for observability
//!
//! # Quick Start
//!
//! ```ignore
//! use nextshell::{AgentConfig, Metadata};
//!
//! let config = AgentConfig::from_env()?;
//! let backend = config.build_backend()?;
//! let manager = config.build_manager(backend);
//!
//! manager.initialize().await?;
//! let reply = manager.process_query("how do I list files?", &Metadata::new()).await?;
//! ```

pub mod agent;
pub mod completion;
pub mod config;
pub mod exec;
pub mod logging;
pub mod metrics;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentError, ContextStore, ConversationManager, Message, Metadata, Role};
pub use completion::{CodeContext, CompletionBackend, CompletionClient, SuggestionResult};
pub use config::{AgentConfig, BackendKind, ConfigError};
pub use exec::{CommandExecutor, CommandResult, ExecutionError};
