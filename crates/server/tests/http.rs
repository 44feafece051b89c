//! HTTP endpoint tests driven through the router with `tower::ServiceExt::oneshot`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use netops_agent::dispatch::process_capabilities;
use netops_agent::{ChatMessage, ConversationManager, ExecutionDispatcher, LlmClient};
use netops_core::config::AppConfig;
use netops_core::{CapabilityDefinition, CapabilityRegistry, ParameterSpec};
use netops_server::{router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct ScriptedLlm(Mutex<VecDeque<String>>);

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        self.0
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| anyhow!("http 503 Service Unavailable"))
    }
}

fn show_commands_via_shell() -> CapabilityDefinition {
    CapabilityDefinition {
        id: "runShowCommands-main".to_string(),
        display_name: "Run Show Commands".to_string(),
        description: "Execute any show command on network devices.".to_string(),
        folder: "runShowCommands-main".to_string(),
        entrypoint: "sh".to_string(),
        entrypoint_args: vec![
            "-c".to_string(),
            "printf '%s#%s\\n' \"$2\" \"$8\"".to_string(),
            "sh".to_string(),
        ],
        cli_params: ["devices", "username", "password", "command"]
            .into_iter()
            .map(|name| ParameterSpec { name: name.to_string(), flag: format!("--{name}"), required: true })
            .collect(),
        parameters: Vec::new(),
    }
}

fn test_router(dir: &TempDir, replies: &[&str]) -> Router {
    let registry =
        Arc::new(CapabilityRegistry::new(vec![show_commands_via_shell()]).expect("registry"));
    let mut config = AppConfig::default();
    config.capabilities.base_dir = dir.path().to_path_buf();

    let llm = Arc::new(ScriptedLlm(Mutex::new(replies.iter().map(|reply| (*reply).to_string()).collect())));
    let dispatcher =
        ExecutionDispatcher::new(Arc::clone(&registry), process_capabilities(&registry, dir.path()));
    let conversation =
        ConversationManager::new(llm, dispatcher, &config.conversation).expect("conversation");

    router(AppState { conversation: Arc::new(conversation), registry, config: Arc::new(config) })
}

fn post_chat(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn confirmed_turn_runs_the_capability_and_reports_its_result() {
    let dir = TempDir::new().expect("tempdir");
    let app = test_router(
        &dir,
        &[r#"{"answer": "Running it.", "capabilityId": "runShowCommands-main",
              "parameters": {"devices": "10.1.1.1", "username": "netadmin", "password": "s3cret",
                             "command": "show version"},
              "confirmed": true}"#],
    );

    let response = app
        .oneshot(post_chat(json!({"message": "yes, run it", "sessionId": "desk-9"})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["sessionId"], "desk-9");
    assert_eq!(body["scriptExecuted"], "runShowCommands-main");
    assert_eq!(
        body["scriptResult"],
        json!({"exitCode": 0, "stdout": "10.1.1.1#show version\n", "stderr": ""})
    );
    assert!(body["assistantMessage"]
        .as_str()
        .is_some_and(|message| message.contains("Execution finished with return code 0.")));
    assert!(dir.path().join("runShowCommands-main").is_dir());
}

#[tokio::test]
async fn unconfirmed_turn_returns_null_result_and_a_fresh_session() {
    let dir = TempDir::new().expect("tempdir");
    let app = test_router(
        &dir,
        &[r#"{"answer": "Which devices?", "capabilityId": "runShowCommands-main", "parameters": {}, "confirmed": false}"#],
    );

    let response = app.oneshot(post_chat(json!({"message": "run a show command"}))).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["assistantMessage"], "Which devices?");
    assert_eq!(body["scriptExecuted"], Value::Null);
    assert_eq!(body["scriptResult"], Value::Null);
    assert!(body["sessionId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(!dir.path().join("runShowCommands-main").exists());
}

#[tokio::test]
async fn blank_message_is_a_bad_request() {
    let dir = TempDir::new().expect("tempdir");
    let app = test_router(&dir, &[]);

    let response = app.oneshot(post_chat(json!({"message": "   "}))).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "The request could not be processed. Check the message and try again.");
    assert!(body["correlationId"].is_string());
}

#[tokio::test]
async fn capabilities_endpoint_hides_executable_details() {
    let dir = TempDir::new().expect("tempdir");
    let app = test_router(&dir, &[]);

    let response = app
        .oneshot(Request::builder().uri("/capabilities").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body[0]["id"], "runShowCommands-main");
    assert_eq!(body[0]["requiredParameters"], json!(["devices", "username", "password", "command"]));
    assert!(body[0].get("entrypoint").is_none());
}

#[tokio::test]
async fn health_is_degraded_without_collaborator_credentials() {
    let dir = TempDir::new().expect("tempdir");
    let app = test_router(&dir, &[]);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = json_body(response).await;
    assert_eq!(body["registry"]["status"], "ready");
    assert_eq!(body["collaborator"]["status"], "degraded");
}
