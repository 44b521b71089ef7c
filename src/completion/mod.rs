//! Language-model completion
//!
//! [`CompletionBackend`] is the single seam to the outside world; the
//! OpenAI, Ollama and simulated backends are interchangeable behind it.
//! [`CompletionClient`] layers the code suggestion/completion/explanation
//! prompts on top.

pub mod backend;
pub mod code;
pub mod ollama;
pub mod openai;
pub mod simulated;

pub use backend::{submit, CompletionBackend, CompletionChoice, CompletionRequest, UpstreamError};
pub use code::{
    rank_score, CodeConfig, CodeContext, CompletionClient, SuggestionMetadata, SuggestionResult,
};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use simulated::SimulatedBackend;
