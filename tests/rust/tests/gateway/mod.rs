//! Protocol gateway tests over in-memory pipes
//!
//! Each session is a `serve_pipe` task on one half of a duplex stream with an
//! rmcp client on the other half.

use base64::{engine::general_purpose::STANDARD, Engine};
use pretty_assertions::assert_eq;
use rmcp::{
    model::*,
    service::RunningService,
    RoleClient, ServiceExt,
};
use rpcbridge_core::CredentialPair;
use rpcbridge_gateway::{serve_pipe, BackendSettings, BridgeGateway};
use std::time::Duration;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{alice, bob};
use tests::mock_backend::logo_bytes;
use tests::MockBackend;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn gateway_for(backend: &MockBackend) -> BridgeGateway {
    let settings = BackendSettings::new(
        url::Url::parse(&format!("{}/", backend.uri())).unwrap(),
        Duration::from_secs(5),
    );
    BridgeGateway::new(settings, None)
}

struct PipeSession {
    client: RunningService<RoleClient, ()>,
    server: JoinHandle<anyhow::Result<()>>,
    shutdown: CancellationToken,
}

async fn open_session(gateway: &BridgeGateway, credentials: CredentialPair) -> PipeSession {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (client_read, client_write) = tokio::io::split(client_io);
    let shutdown = CancellationToken::new();

    let server = {
        let gateway = gateway.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            serve_pipe(&gateway, credentials, server_read, server_write, shutdown).await
        })
    };

    let client = with_timeout(DEFAULT_TIMEOUT, ().serve((client_read, client_write)))
        .await
        .expect("client should connect");

    PipeSession {
        client,
        server,
        shutdown,
    }
}

fn call(name: &str, arguments: Option<serde_json::Value>) -> CallToolRequestParams {
    CallToolRequestParams {
        name: name.to_string().into(),
        arguments: arguments.and_then(|a| a.as_object().cloned()),
        task: None,
        meta: None,
    }
}

async fn whoami(
    session: &PipeSession,
    expected: &'static str,
) -> (&'static str, Result<CallToolResult, rmcp::ServiceError>) {
    (expected, session.client.call_tool(call("whoami", None)).await)
}

fn first_text(result: &CallToolResult) -> String {
    let wire = serde_json::to_value(&result.content[0]).unwrap();
    wire["text"].as_str().unwrap_or_default().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initialize_advertises_all_capabilities() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    let info = session.client.peer_info().expect("server info after handshake");
    assert_eq!(info.server_info.name, "rpcbridge-gateway");
    assert!(info.capabilities.tools.is_some());
    assert!(info.capabilities.resources.is_some());
    assert!(info.capabilities.prompts.is_some());

    // The health check ran before the handshake
    assert_eq!(backend.calls_by("alice").first().map(String::as_str), Some("health"));

    session.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_pair_never_serves() {
    let backend = MockBackend::start().await;
    let gateway = gateway_for(&backend);

    let (_client_io, server_io) = tokio::io::duplex(1024);
    let (read, write) = tokio::io::split(server_io);
    let result = serve_pipe(
        &gateway,
        CredentialPair::new("mallory", "guess"),
        read,
        write,
        CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert!(backend.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_six_operations() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;
    let client = &session.client;

    let tools = client.list_tools(Default::default()).await.unwrap();
    assert_eq!(tools.tools.len(), 2);

    let result = client
        .call_tool(call("echo", Some(serde_json::json!({ "message": "hi" }))))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(false));
    assert_eq!(first_text(&result), "hi");

    let resources = client.list_resources(Default::default()).await.unwrap();
    let uris: Vec<&str> = resources.resources.iter().map(|r| r.uri.as_str()).collect();
    assert_eq!(uris, vec!["mem://notes", "file:///logo.png"]);

    let notes = client
        .read_resource(ReadResourceRequestParams {
            uri: "mem://notes".into(),
            meta: None,
        })
        .await
        .unwrap();
    let wire = serde_json::to_value(&notes.contents[0]).unwrap();
    assert_eq!(wire["text"], "remember the milk");

    let prompts = client.list_prompts(Default::default()).await.unwrap();
    assert_eq!(prompts.prompts[0].name, "greet");

    let mut args = serde_json::Map::new();
    args.insert("who".into(), serde_json::json!("there"));
    let prompt = client
        .get_prompt(GetPromptRequestParams {
            name: "greet".into(),
            arguments: Some(args),
            meta: None,
        })
        .await
        .unwrap();
    let wire = serde_json::to_value(&prompt.messages[0]).unwrap();
    assert_eq!(wire["content"]["text"], "Hello, there");

    session.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blob_survives_the_round_trip() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    let logo = session
        .client
        .read_resource(ReadResourceRequestParams {
            uri: "file:///logo.png".into(),
            meta: None,
        })
        .await
        .unwrap();

    let wire = serde_json::to_value(&logo.contents[0]).unwrap();
    assert_eq!(wire["mimeType"], "image/png");
    let blob = wire["blob"].as_str().expect("blob content");
    assert_eq!(STANDARD.decode(blob).unwrap(), logo_bytes());

    session.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tool_failure_is_in_band() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    let result = session.client.call_tool(call("explode", None)).await.unwrap();
    assert_eq!(result.is_error, Some(true));
    assert_eq!(first_text(&result), "tool exploded");

    // The session is still usable
    let result = session.client.call_tool(call("whoami", None)).await.unwrap();
    assert_eq!(first_text(&result), "alice");

    session.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_resource_is_protocol_error() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    let err = session
        .client
        .read_resource(ReadResourceRequestParams {
            uri: "mem://missing".into(),
            meta: None,
        })
        .await
        .unwrap_err();
    match err {
        rmcp::ServiceError::McpError(error) => {
            assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
            assert!(!error.message.contains("127.0.0.1"));
        }
        other => panic!("expected protocol error, got {:?}", other),
    }

    session.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sessions_never_cross_credentials() {
    let backend = MockBackend::start_with_delay(Duration::from_millis(30)).await;
    let gateway = gateway_for(&backend);

    let as_alice = open_session(&gateway, alice()).await;
    let as_bob = open_session(&gateway, bob()).await;

    let mut calls = Vec::new();
    for _ in 0..5 {
        calls.push(whoami(&as_alice, "alice"));
        calls.push(whoami(&as_bob, "bob"));
    }
    let results = with_timeout(DEFAULT_TIMEOUT, futures::future::join_all(calls)).await;

    for (expected, result) in results {
        assert_eq!(first_text(&result.unwrap()), expected);
    }

    let alice_calls = backend.calls_by("alice");
    let bob_calls = backend.calls_by("bob");
    assert_eq!(alice_calls.iter().filter(|m| *m == "tools/call").count(), 5);
    assert_eq!(bob_calls.iter().filter(|m| *m == "tools/call").count(), 5);

    as_alice.client.cancel().await.ok();
    as_bob.client.cancel().await.ok();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_ends_the_session() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    session.shutdown.cancel();
    let served = with_timeout(DEFAULT_TIMEOUT, session.server).await.unwrap();
    assert!(served.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_disconnect_ends_the_session() {
    let backend = MockBackend::start().await;
    let session = open_session(&gateway_for(&backend), alice()).await;

    session.client.cancel().await.ok();
    let served = with_timeout(DEFAULT_TIMEOUT, session.server).await.unwrap();
    assert!(served.is_ok());
}
