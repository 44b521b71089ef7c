//! HTTP backend tests against a local mock server
//!
//! Covers the wire format of the OpenAI-compatible and Ollama backends and
//! the code completion client layered on top of them.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nextshell::agent::{ContextStore, ConversationConfig, ConversationManager, Message, Metadata};
use nextshell::completion::{
    CodeConfig, CodeContext, CompletionBackend, CompletionClient, CompletionRequest,
    OllamaBackend, OpenAiBackend, UpstreamError,
};
use nextshell::exec::CommandExecutor;
use nextshell::AgentError;

fn openai_choices(contents: &[&str]) -> Value {
    let choices: Vec<Value> = contents
        .iter()
        .enumerate()
        .map(|(i, c)| {
            json!({
                "index": i,
                "message": {"role": "assistant", "content": c},
                "finish_reason": "stop"
            })
        })
        .collect();
    json!({"id": "chatcmpl-1", "object": "chat.completion", "choices": choices})
}

fn openai(server: &MockServer) -> Arc<dyn CompletionBackend> {
    Arc::new(
        OpenAiBackend::new(format!("{}/v1", server.uri()), Some("sk-test".into()), None).unwrap(),
    )
}

#[tokio::test]
async fn test_openai_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo",
            "max_tokens": 150,
            "n": 1,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_choices(&["hi there"])))
        .expect(1)
        .mount(&server)
        .await;

    let request = CompletionRequest::new("gpt-3.5-turbo", vec![Message::user("hello")]);
    let choices = openai(&server).complete(&request).await.unwrap();
    assert_eq!(choices.len(), 1);
    assert_eq!(choices[0].content, "hi there");
}

#[tokio::test]
async fn test_openai_choices_sorted_by_index() {
    let server = MockServer::start().await;
    let body = json!({"choices": [
        {"index": 2, "message": {"content": "third"}},
        {"index": 0, "message": {"content": "first"}},
        {"index": 1, "message": {"content": null}}
    ]});
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let request = CompletionRequest::new("m", vec![Message::user("x")]).n(3);
    let choices = openai(&server).complete(&request).await.unwrap();
    let contents: Vec<_> = choices.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "", "third"]);
}

#[tokio::test]
async fn test_openai_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let request = CompletionRequest::new("m", vec![Message::user("x")]);
    let err = openai(&server).complete(&request).await.unwrap_err();
    match err {
        UpstreamError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let request = CompletionRequest::new("m", vec![Message::user("x")]);
    let err = openai(&server).complete(&request).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Parse(_)));
}

#[tokio::test]
async fn test_manager_over_openai() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_choices(&["use `ls`"])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let manager = ConversationManager::new(
        openai(&server),
        ContextStore::new(dir.path().join("context.json")),
        CommandExecutor::default(),
        ConversationConfig::default(),
    );
    let reply = manager
        .process_query("how do I list files?", &Metadata::new())
        .await
        .unwrap();
    assert_eq!(reply, "use `ls`");

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(
        body["messages"][1],
        json!({"role": "user", "content": "how do I list files?"})
    );
}

#[tokio::test]
async fn test_manager_without_key_is_a_configuration_error() {
    let server = MockServer::start().await;
    let backend = OpenAiBackend::new(server.uri(), None, None).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let manager = ConversationManager::new(
        Arc::new(backend),
        ContextStore::new(dir.path().join("context.json")),
        CommandExecutor::default(),
        ConversationConfig::default(),
    );

    let err = manager.initialize().await.unwrap_err();
    assert!(matches!(err, AgentError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_code_suggestions_request_three_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"n": 3, "max_tokens": 200})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_choices(&["a()", "b()", "c()"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CompletionClient::new(openai(&server), CodeConfig::default());
    let context = CodeContext {
        file_content: Some("const x = 1;".into()),
        cursor_position: Some(json!({"line": 1, "column": 4})),
        imports: Some(vec!["react".into()]),
    };
    let suggestions = client.get_suggestions("call a", &context).await.unwrap();

    let texts: Vec<_> = suggestions.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["a()", "b()", "c()"]);
    let scores: Vec<_> = suggestions.iter().map(|s| s.score).collect();
    assert!((scores[0] - 1.0).abs() < 1e-9);
    assert!((scores[1] - 0.8).abs() < 1e-9);
    assert!((scores[2] - 0.6).abs() < 1e-9);
    assert_eq!(suggestions[0].metadata.model_id, "gpt-3.5-turbo");

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    let prompt = body["messages"][1]["content"].as_str().unwrap();
    assert!(prompt.starts_with("Generate javascript code suggestions for: call a"));
    assert!(prompt.contains("Current file content:\nconst x = 1;"));
    assert!(prompt.contains("Available imports:\nreact"));
}

#[tokio::test]
async fn test_explain_uses_fixed_temperature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"temperature": 0.5})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(openai_choices(&["It adds two numbers."])),
        )
        .mount(&server)
        .await;

    let client = CompletionClient::new(openai(&server), CodeConfig::default());
    let explanation = client.explain_code("(a, b) => a + b").await.unwrap();
    assert_eq!(explanation, "It adds two numbers.");
}

#[tokio::test]
async fn test_ollama_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "stream": false,
            "options": {"num_predict": 150}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": "hello from ollama"},
            "done": true,
            "eval_count": 12
        })))
        .expect(2)
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(server.uri(), None).unwrap();
    let request = CompletionRequest::new("llama3.2", vec![Message::user("hi")]).n(2);
    let choices = backend.complete(&request).await.unwrap();

    assert_eq!(choices.len(), 2);
    assert_eq!(choices[0].index, 0);
    assert_eq!(choices[1].index, 1);
    assert_eq!(choices[1].content, "hello from ollama");
}

#[tokio::test]
async fn test_ollama_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .mount(&server)
        .await;

    let backend = OllamaBackend::new(server.uri(), None).unwrap();
    let request = CompletionRequest::new("missing", vec![Message::user("hi")]);
    let err = backend.complete(&request).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Status { status: 404, .. }));
}
