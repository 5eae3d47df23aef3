//! Backend RPC client tests against the mock backend

use pretty_assertions::assert_eq;
use rpcbridge_gateway::backend::{BackendClient, BackendError, BackendSettings, ContentItem, ResourceBody};
use std::time::Duration;
use tests::fixtures::{alice, bob};
use tests::mock_backend::logo_bytes;
use tests::MockBackend;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(uri: &str) -> BackendSettings {
    BackendSettings::new(
        url::Url::parse(&format!("{}/", uri)).unwrap(),
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn test_health_accepts_known_pair_only() {
    let backend = MockBackend::start().await;

    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();
    assert!(client.health().await);

    let wrong = rpcbridge_core::CredentialPair::new("alice", "not-the-secret");
    let client = BackendClient::new(&settings(&backend.uri()), wrong).unwrap();
    assert!(matches!(client.check_health().await, Err(BackendError::Unhealthy)));
}

#[tokio::test]
async fn test_health_down_is_unhealthy() {
    let backend = MockBackend::start().await;
    backend.set_health_down(true);

    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();
    assert!(!client.health().await);
}

#[tokio::test]
async fn test_unreachable_backend_is_unhealthy() {
    // Nothing listens on the discard port
    let client = BackendClient::new(&settings("http://127.0.0.1:9"), alice()).unwrap();
    assert!(matches!(client.check_health().await, Err(BackendError::Unhealthy)));
}

#[tokio::test]
async fn test_calls_carry_the_bound_pair() {
    let backend = MockBackend::start().await;

    let as_alice = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();
    let as_bob = BackendClient::new(&settings(&backend.uri()), bob()).unwrap();

    let outcome = as_alice.call_tool("whoami", None).await.unwrap();
    assert_eq!(outcome.content, vec![ContentItem::Text { text: "alice".into() }]);
    let outcome = as_bob.call_tool("whoami", None).await.unwrap();
    assert_eq!(outcome.content, vec![ContentItem::Text { text: "bob".into() }]);

    assert_eq!(backend.calls_by("alice"), vec!["tools/call"]);
    assert_eq!(backend.calls_by("bob"), vec!["tools/call"]);
}

#[tokio::test]
async fn test_list_tools_defaults_input_schema() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let tools = client.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
    assert_eq!(names, vec!["whoami", "echo"]);

    // whoami declares no schema; an empty object schema is filled in
    assert_eq!(
        tools[0].input_schema.get("type"),
        Some(&serde_json::json!("object"))
    );
    assert!(tools[1].input_schema.get("properties").is_some());
}

#[tokio::test]
async fn test_tool_rpc_error_becomes_failed_outcome() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let outcome = client.call_tool("explode", None).await.unwrap();
    assert!(outcome.is_error);
    assert_eq!(
        outcome.content,
        vec![ContentItem::Text {
            text: "tool exploded".into()
        }]
    );

    let outcome = client.call_tool("flaky", None).await.unwrap();
    assert!(outcome.is_error);
}

#[tokio::test]
async fn test_call_tool_forwards_arguments() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let args = serde_json::json!({ "message": "ping" });
    let outcome = client
        .call_tool("echo", args.as_object().cloned())
        .await
        .unwrap();
    assert!(!outcome.is_error);
    assert_eq!(outcome.content, vec![ContentItem::Text { text: "ping".into() }]);
}

#[tokio::test]
async fn test_read_resource_decodes_blob() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let payloads = client.read_resource("file:///logo.png").await.unwrap();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].mime_type.as_deref(), Some("image/png"));
    assert_eq!(payloads[0].body, ResourceBody::Blob(logo_bytes()));

    let payloads = client.read_resource("mem://notes").await.unwrap();
    assert_eq!(payloads[0].body, ResourceBody::Text("remember the milk".into()));
}

#[tokio::test]
async fn test_read_unknown_resource_is_rpc_error() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let err = client.read_resource("mem://missing").await.unwrap_err();
    match err {
        BackendError::Rpc(rpc) => assert_eq!(rpc.code, -32002),
        other => panic!("expected rpc error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_prompts() {
    let backend = MockBackend::start().await;
    let client = BackendClient::new(&settings(&backend.uri()), alice()).unwrap();

    let prompts = client.list_prompts().await.unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].name, "greet");

    let args = serde_json::json!({ "who": "world" });
    let prompt = client
        .get_prompt("greet", args.as_object().cloned())
        .await
        .unwrap();
    assert_eq!(prompt.messages.len(), 1);
    let wire = serde_json::to_value(&prompt.messages[0]).unwrap();
    assert_eq!(wire["content"]["text"], "Hello, world");
}

#[tokio::test]
async fn test_http_status_error_is_retryable_for_5xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = BackendClient::new(&settings(&server.uri()), alice()).unwrap();
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(err, BackendError::Status(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_garbage_reply_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = BackendClient::new(&settings(&server.uri()), alice()).unwrap();
    let err = client.list_resources().await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidResponse(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_catalog_without_list_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": 42 })),
        )
        .mount(&server)
        .await;

    let client = BackendClient::new(&settings(&server.uri()), alice()).unwrap();
    let err = client.list_tools().await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidResponse(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_backend_under_path_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let settings = BackendSettings::new(
        url::Url::parse(&format!("{}/api/v1/", server.uri())).unwrap(),
        Duration::from_secs(5),
    );
    let client = BackendClient::new(&settings, alice()).unwrap();
    assert!(client.health().await);
}
