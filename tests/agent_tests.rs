//! Integration tests for the conversation manager
//!
//! These tests drive the manager end to end against scripted backends and a
//! temporary context file. Nothing here talks to the network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use nextshell::agent::{
    ContextStore, ConversationConfig, ConversationManager, Message, Metadata, Role,
    HISTORY_WINDOW,
};
use nextshell::completion::{
    CompletionBackend, CompletionChoice, CompletionRequest, SimulatedBackend, UpstreamError,
};
use nextshell::exec::CommandExecutor;

/// Answers "reply N" and records every request it receives
#[derive(Default)]
struct ScriptedBackend {
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Vec<CompletionChoice>, UpstreamError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(vec![CompletionChoice {
            index: 0,
            content: format!("reply {n}"),
        }])
    }
}

fn manager(backend: Arc<dyn CompletionBackend>, path: &std::path::Path) -> ConversationManager {
    ConversationManager::new(
        backend,
        ContextStore::new(path),
        CommandExecutor::default(),
        ConversationConfig::default(),
    )
}

fn read_document(path: &std::path::Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_query_appends_user_then_assistant() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    let manager = manager(Arc::new(SimulatedBackend::new()), &path);

    manager.initialize().await.unwrap();
    let reply = manager.process_query("hi", &Metadata::new()).await.unwrap();
    assert!(reply.starts_with("I understand you're asking about: \"hi\""));

    let history = manager.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], Message::user("hi"));
    assert_eq!(history[1], Message::assistant(reply.clone()));

    let document = read_document(&path);
    let stored = document["history"].as_array().unwrap();
    assert_eq!(stored[stored.len() - 2], json!({"role": "user", "content": "hi"}));
    assert_eq!(stored[stored.len() - 1]["role"], "assistant");
    assert_eq!(stored[stored.len() - 1]["content"], reply);
}

#[tokio::test]
async fn test_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");

    let first = manager(Arc::new(ScriptedBackend::default()), &path);
    first.process_query("one", &Metadata::new()).await.unwrap();
    first.process_query("two", &Metadata::new()).await.unwrap();
    drop(first);

    let backend = Arc::new(ScriptedBackend::default());
    let second = manager(backend.clone(), &path);
    second.initialize().await.unwrap();
    assert_eq!(
        second.history().await,
        vec![
            Message::user("one"),
            Message::assistant("reply 1"),
            Message::user("two"),
            Message::assistant("reply 2"),
        ]
    );

    // Restored history is part of the next prompt.
    second.process_query("three", &Metadata::new()).await.unwrap();
    let requests = backend.requests();
    let sent = &requests[0].messages;
    assert_eq!(sent[0].role, Role::System);
    assert_eq!(sent[1], Message::user("one"));
    assert_eq!(sent.last().unwrap(), &Message::user("three"));
}

#[tokio::test]
async fn test_persisted_history_is_capped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    let manager = manager(Arc::new(ScriptedBackend::default()), &path);

    for i in 0..8 {
        manager
            .process_query(&format!("q{i}"), &Metadata::new())
            .await
            .unwrap();
    }

    // In memory nothing is dropped.
    assert_eq!(manager.history().await.len(), 16);

    let document = read_document(&path);
    let stored = document["history"].as_array().unwrap();
    assert_eq!(stored.len(), HISTORY_WINDOW);
    assert_eq!(stored[0], json!({"role": "user", "content": "q3"}));
    assert_eq!(stored[9], json!({"role": "assistant", "content": "reply 8"}));
}

#[tokio::test]
async fn test_prompt_window_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let manager = manager(backend.clone(), &dir.path().join("context.json"));

    for i in 0..7 {
        manager
            .process_query(&format!("q{i}"), &Metadata::new())
            .await
            .unwrap();
    }

    let last = backend.requests().pop().unwrap();
    // system prompt + the ten most recent messages
    assert_eq!(last.messages.len(), HISTORY_WINDOW + 1);
    assert_eq!(last.messages.last().unwrap(), &Message::user("q6"));
}

#[tokio::test]
async fn test_concurrent_queries_do_not_lose_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    let backend = Arc::new(ScriptedBackend::with_delay(Duration::from_millis(20)));
    let manager = Arc::new(manager(backend.clone(), &path));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .process_query(&format!("q{i}"), &Metadata::new())
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let history = manager.history().await;
    assert_eq!(history.len(), 8);
    // Turns never interleave: every user message is followed by its reply.
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
    }
    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);

    let document = read_document(&path);
    assert_eq!(document["history"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_overrides_win_and_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("context.json");
    std::fs::write(
        &path,
        r#"{"context": {"cwd": "/home/dev", "shell": "bash"}, "history": []}"#,
    )
    .unwrap();

    let backend = Arc::new(ScriptedBackend::default());
    let manager = manager(backend.clone(), &path);
    let overrides = json!({"cwd": "/tmp"}).as_object().cloned().unwrap();
    manager.process_query("where am I?", &overrides).await.unwrap();

    let requests = backend.requests();
    let system = &requests[0].messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("\"cwd\": \"/tmp\""));
    assert!(system.content.contains("\"shell\": \"bash\""));
    assert!(!system.content.contains("/home/dev"));

    let document = read_document(&path);
    assert_eq!(document["context"], json!({"cwd": "/home/dev", "shell": "bash"}));
    assert_eq!(manager.metadata().await["cwd"], "/home/dev");
}

#[tokio::test]
async fn test_execute_does_not_touch_history() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(
        Arc::new(SimulatedBackend::new()),
        &dir.path().join("context.json"),
    );

    let result = manager.execute_command("echo hello").await.unwrap();
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.exit_code, Some(0));
    assert!(manager.history().await.is_empty());
}

#[tokio::test]
async fn test_suggestions_from_manager() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(
        Arc::new(SimulatedBackend::new()),
        &dir.path().join("context.json"),
    );

    assert_eq!(
        manager.suggest_commands("please list and search files"),
        vec![
            "ls -la".to_string(),
            r#"find . -name "*" -type f"#.to_string(),
            r#"grep -r "pattern" ."#.to_string(),
        ]
    );
    assert!(manager.suggest_commands("LIST FILES").is_empty());
}
