//! Runtime configuration
//!
//! Built-in defaults overlaid with environment variables. A `.env` file is
//! loaded by the binary before [`AgentConfig::from_env`] runs.
//!
//! | Variable                          | Default                  |
//! |-----------------------------------|--------------------------|
//! | `NEXTSHELL_BACKEND`               | `openai`                 |
//! | `OPENAI_API_KEY` / `NEXTSHELL_API_KEY` | unset               |
//! | `NEXTSHELL_BASE_URL`              | backend specific         |
//! | `NEXTSHELL_MODEL`                 | `gpt-3.5-turbo`          |
//! | `NEXTSHELL_TEMPERATURE`           | `0.7`                    |
//! | `NEXTSHELL_MAX_TOKENS`            | `150`                    |
//! | `NEXTSHELL_CODE_TEMPERATURE`      | `0.3`                    |
//! | `NEXTSHELL_CODE_MAX_TOKENS`       | `200`                    |
//! | `NEXTSHELL_LANGUAGE`              | `javascript`             |
//! | `NEXTSHELL_CONTEXT_PATH`          | `~/.nextshell/context.json` |
//! | `NEXTSHELL_EXEC_TIMEOUT_SECS`     | unset (no timeout)       |
//! | `NEXTSHELL_MAX_OUTPUT_BYTES`      | unset (unbounded)        |
//! | `NEXTSHELL_REQUEST_TIMEOUT_SECS`  | unset (no timeout)       |
//! | `NEXTSHELL_ORPHAN_POLICY`         | `retain`                 |
//! | `LOG_LEVEL`                       | `info,nextshell=debug`   |
//! | `LOG_FORMAT`                      | `simple`                 |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{ContextStore, ConversationConfig, ConversationManager, OrphanPolicy};
use crate::completion::openai::DEFAULT_OPENAI_BASE_URL;
use crate::completion::ollama::DEFAULT_OLLAMA_BASE_URL;
use crate::completion::{
    CodeConfig, CompletionBackend, CompletionClient, OllamaBackend, OpenAiBackend,
    SimulatedBackend, UpstreamError,
};
use crate::exec::{CommandExecutor, ExecutorConfig};
use crate::logging::{LogFormat, LoggingConfig};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to build completion backend: {0}")]
    Backend(#[from] UpstreamError),
}

/// Which completion backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    OpenAi,
    Ollama,
    Simulated,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "ollama" => Ok(BackendKind::Ollama),
            "simulated" | "sim" => Ok(BackendKind::Simulated),
            other => Err(format!("unknown backend: {other} (expected openai|ollama|simulated)")),
        }
    }
}

/// Everything needed to assemble the agent core
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub backend: BackendKind,
    /// Opaque API credential
    pub api_key: Option<String>,
    /// Backend API root (defaults per backend when unset)
    pub base_url: Option<String>,
    /// Per-request deadline for backend calls
    pub request_timeout: Option<Duration>,
    /// Persisted conversation document
    pub context_path: PathBuf,
    pub conversation: ConversationConfig,
    pub code: CodeConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            api_key: None,
            base_url: None,
            request_timeout: None,
            context_path: ContextStore::default_store().path().to_path_buf(),
            conversation: ConversationConfig::default(),
            code: CodeConfig::default(),
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("NEXTSHELL_BACKEND") {
            config.backend = parse_with("NEXTSHELL_BACKEND", &v)?;
        }
        config.api_key = get("OPENAI_API_KEY").or_else(|| get("NEXTSHELL_API_KEY"));
        config.base_url = get("NEXTSHELL_BASE_URL");
        config.request_timeout = get("NEXTSHELL_REQUEST_TIMEOUT_SECS")
            .map(|v| parse_secs("NEXTSHELL_REQUEST_TIMEOUT_SECS", &v))
            .transpose()?;
        if let Some(v) = get("NEXTSHELL_CONTEXT_PATH") {
            config.context_path = PathBuf::from(v);
        }

        if let Some(v) = get("NEXTSHELL_MODEL") {
            config.conversation.model = v.clone();
            config.code.model = v;
        }
        if let Some(v) = get("NEXTSHELL_TEMPERATURE") {
            config.conversation.temperature = parse_with("NEXTSHELL_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("NEXTSHELL_MAX_TOKENS") {
            config.conversation.max_tokens = parse_with("NEXTSHELL_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("NEXTSHELL_SYSTEM_PROMPT") {
            config.conversation.system_prompt = Some(v);
        }
        if let Some(v) = get("NEXTSHELL_ORPHAN_POLICY") {
            config.conversation.orphan_policy =
                parse_with::<OrphanPolicy>("NEXTSHELL_ORPHAN_POLICY", &v)?;
        }

        if let Some(v) = get("NEXTSHELL_CODE_TEMPERATURE") {
            config.code.temperature = parse_with("NEXTSHELL_CODE_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("NEXTSHELL_CODE_MAX_TOKENS") {
            config.code.max_tokens = parse_with("NEXTSHELL_CODE_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("NEXTSHELL_LANGUAGE") {
            config.code.language = v;
        }

        config.executor.timeout = get("NEXTSHELL_EXEC_TIMEOUT_SECS")
            .map(|v| parse_secs("NEXTSHELL_EXEC_TIMEOUT_SECS", &v))
            .transpose()?;
        config.executor.max_output_bytes = get("NEXTSHELL_MAX_OUTPUT_BYTES")
            .map(|v| parse_with("NEXTSHELL_MAX_OUTPUT_BYTES", &v))
            .transpose()?;

        if let Some(v) = get("LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            config.logging.format = parse_with::<LogFormat>("LOG_FORMAT", &v)?;
        }

        Ok(config)
    }

    /// Instantiate the configured completion backend
    pub fn build_backend(&self) -> Result<Arc<dyn CompletionBackend>, ConfigError> {
        let backend: Arc<dyn CompletionBackend> = match self.backend {
            BackendKind::OpenAi => Arc::new(OpenAiBackend::new(
                self.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_BASE_URL),
                self.api_key.clone(),
                self.request_timeout,
            )?),
            BackendKind::Ollama => Arc::new(OllamaBackend::new(
                self.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_BASE_URL),
                self.request_timeout,
            )?),
            BackendKind::Simulated => Arc::new(SimulatedBackend::new()),
        };
        Ok(backend)
    }

    /// Assemble a conversation manager sharing `backend`
    pub fn build_manager(&self, backend: Arc<dyn CompletionBackend>) -> ConversationManager {
        ConversationManager::new(
            backend,
            ContextStore::new(&self.context_path),
            CommandExecutor::new(self.executor.clone()),
            self.conversation.clone(),
        )
    }

    /// Assemble a code completion client sharing `backend`
    pub fn build_code_client(&self, backend: Arc<dyn CompletionBackend>) -> CompletionClient {
        CompletionClient::new(backend, self.code.clone())
    }
}

fn parse_with<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_with(key, value)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be a positive number of seconds".to_string(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}
