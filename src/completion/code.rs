//! Code suggestions, completion and explanation
//!
//! Builds role-tagged prompts for code-centric requests and normalizes the
//! backend's ranked choices into [`SuggestionResult`]s.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::backend::{submit, CompletionBackend, CompletionChoice, CompletionRequest, UpstreamError};
use crate::agent::context::Message;

/// Number of alternatives requested by [`CompletionClient::get_suggestions`]
pub const SUGGESTION_COUNT: u32 = 3;

/// Temperature used for explanations, independent of configuration
pub const EXPLAIN_TEMPERATURE: f32 = 0.5;

/// Score drop between consecutive suggestions
const SCORE_STEP: f64 = 0.2;

/// Editor context that can accompany a code request
///
/// Every field is optional; present fields are appended to the prompt in
/// declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeContext {
    /// Content of the file being edited
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    /// Cursor location, in whatever form the editor reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_position: Option<Value>,
    /// Import statements available in scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<Vec<String>>,
}

impl CodeContext {
    /// Shallow merge: fields set on `overrides` win
    pub fn merged_with(&self, overrides: &CodeContext) -> CodeContext {
        CodeContext {
            file_content: overrides
                .file_content
                .clone()
                .or_else(|| self.file_content.clone()),
            cursor_position: overrides
                .cursor_position
                .clone()
                .or_else(|| self.cursor_position.clone()),
            imports: overrides.imports.clone().or_else(|| self.imports.clone()),
        }
    }

    fn file_content(&self) -> Option<&str> {
        self.file_content.as_deref().filter(|s| !s.is_empty())
    }

    /// Rendered cursor, treating null, "", 0 and false as no cursor
    fn cursor_position(&self) -> Option<String> {
        match self.cursor_position.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Provenance attached to a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionMetadata {
    pub model_id: String,
    pub confidence: f64,
}

/// One ranked code suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub text: String,
    /// `1 - 0.2 * rank`, so 1.0, 0.8, 0.6 for the three requested choices
    pub score: f64,
    pub metadata: SuggestionMetadata,
}

/// Score for the choice at `index` in the backend's ranking
pub fn rank_score(index: u32) -> f64 {
    1.0 - f64::from(index) * SCORE_STEP
}

/// Configuration for code requests
#[derive(Debug, Clone, PartialEq)]
pub struct CodeConfig {
    pub model: String,
    /// Sampling temperature for suggestion and completion requests
    pub temperature: f32,
    pub max_tokens: u32,
    /// Target language label used in prompts (e.g., "rust", "javascript")
    pub language: String,
    pub default_context: CodeContext,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            max_tokens: 200,
            language: "javascript".to_string(),
            default_context: CodeContext::default(),
        }
    }
}

/// Client for code-specific completion requests
#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
    config: CodeConfig,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: CodeConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CodeConfig {
        &self.config
    }

    /// Generate up to three ranked suggestions for `input`
    pub async fn get_suggestions(
        &self,
        input: &str,
        context: &CodeContext,
    ) -> Result<Vec<SuggestionResult>, UpstreamError> {
        let context = self.config.default_context.merged_with(context);
        let request = self
            .request(vec![
                Message::system(self.suggestion_system_prompt()),
                Message::user(self.suggestion_prompt(input, &context)),
            ])
            .n(SUGGESTION_COUNT);

        let choices = submit(self.backend.as_ref(), &request).await?;
        info!(count = choices.len(), "Generated code suggestions");

        Ok(choices
            .into_iter()
            .map(|CompletionChoice { index, content }| {
                let score = rank_score(index);
                SuggestionResult {
                    text: content,
                    score,
                    metadata: SuggestionMetadata {
                        model_id: self.config.model.clone(),
                        confidence: score,
                    },
                }
            })
            .collect())
    }

    /// Complete a partial snippet, returning only code
    pub async fn complete_code(
        &self,
        partial_code: &str,
        context: &CodeContext,
    ) -> Result<String, UpstreamError> {
        let context = self.config.default_context.merged_with(context);
        let request = self.request(vec![
            Message::system(format!(
                "Complete the following {} code snippet. Provide only the completed code without explanations.",
                self.config.language
            )),
            Message::user(completion_prompt(partial_code, &context)),
        ]);

        first_choice(submit(self.backend.as_ref(), &request).await?)
    }

    /// Explain a snippet in plain language
    ///
    /// Editor context plays no part in the prompt.
    pub async fn explain_code(&self, code: &str) -> Result<String, UpstreamError> {
        let request = self
            .request(vec![
                Message::system("Explain the following code snippet concisely and clearly."),
                Message::user(code),
            ])
            .temperature(EXPLAIN_TEMPERATURE);

        first_choice(submit(self.backend.as_ref(), &request).await?)
    }

    fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new(&self.config.model, messages)
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens)
    }

    fn suggestion_system_prompt(&self) -> String {
        format!(
            "You are an expert {} developer. Provide concise, idiomatic code suggestions.",
            self.config.language
        )
    }

    fn suggestion_prompt(&self, input: &str, context: &CodeContext) -> String {
        let mut prompt = format!(
            "Generate {} code suggestions for: {}\n\n",
            self.config.language, input
        );

        if let Some(file) = context.file_content() {
            prompt.push_str(&format!("Current file content:\n{}\n\n", file));
        }
        if let Some(cursor) = context.cursor_position() {
            prompt.push_str(&format!("Cursor position: {}\n", cursor));
        }
        if let Some(imports) = &context.imports {
            prompt.push_str(&format!("Available imports:\n{}\n", imports.join("\n")));
        }

        prompt
    }
}

fn completion_prompt(partial_code: &str, context: &CodeContext) -> String {
    let mut prompt = format!("Complete this code:\n{}\n\n", partial_code);

    if let Some(file) = context.file_content() {
        prompt.push_str(&format!("File context:\n{}\n\n", file));
    }
    if let Some(imports) = &context.imports {
        prompt.push_str(&format!("Available imports:\n{}\n", imports.join("\n")));
    }

    prompt
}

fn first_choice(choices: Vec<CompletionChoice>) -> Result<String, UpstreamError> {
    choices
        .into_iter()
        .min_by_key(|c| c.index)
        .map(|c| c.content)
        .ok_or(UpstreamError::EmptyResponse)
}
