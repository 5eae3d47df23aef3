//! Mock JSON-RPC backend
//!
//! A wiremock server speaking the backend dialect: `GET /health` and
//! `POST /rpc`, both guarded by HTTP Basic auth against a fixed account list.
//! Every authenticated call is recorded as `(login, method)`.

use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Fixture accounts known to the backend
pub const ACCOUNTS: &[(&str, &str)] = &[("alice", "wonderland"), ("bob", "builder")];

/// Bytes returned by the `file:///logo.png` resource
pub fn logo_bytes() -> Vec<u8> {
    (0u8..=255).chain(0u8..=255).collect()
}

#[derive(Clone)]
struct BackendState {
    accounts: Arc<HashMap<String, String>>,
    health_down: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    /// Delay of `tools/call whoami`, to interleave concurrent sessions
    whoami_delay: Duration,
}

impl BackendState {
    fn authenticate(&self, request: &Request) -> Option<String> {
        let header = request.headers.get("authorization")?.to_str().ok()?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
        let (login, secret) = decoded.split_once(':')?;
        (self.accounts.get(login)? == secret).then(|| login.to_string())
    }

    fn record(&self, login: &str, method: &str) {
        self.calls.lock().push((login.to_string(), method.to_string()));
    }
}

struct HealthResponder(BackendState);

impl Respond for HealthResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if self.0.health_down.load(Ordering::SeqCst) {
            return ResponseTemplate::new(503);
        }
        match self.0.authenticate(request) {
            Some(login) => {
                self.0.record(&login, "health");
                ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" }))
            }
            None => ResponseTemplate::new(401),
        }
    }
}

struct RpcResponder(BackendState);

impl RpcResponder {
    fn result(id: &Value, result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result,
        }))
    }

    fn error(id: &Value, code: i64, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        }))
    }

    fn call_tool(&self, id: &Value, login: &str, params: &Value) -> ResponseTemplate {
        let name = params["name"].as_str().unwrap_or_default();
        match name {
            "whoami" => Self::result(
                id,
                json!({ "content": [{ "type": "text", "text": login }] }),
            )
            .set_delay(self.0.whoami_delay),
            "echo" => {
                let message = params["arguments"]["message"].as_str().unwrap_or_default();
                Self::result(id, json!({ "content": [{ "type": "text", "text": message }] }))
            }
            "flaky" => Self::result(
                id,
                json!({
                    "content": [{ "type": "text", "text": "partial failure" }],
                    "isError": true,
                }),
            ),
            "explode" => Self::error(id, -32000, "tool exploded"),
            other => Self::error(id, -32602, &format!("unknown tool {}", other)),
        }
    }

    fn read_resource(id: &Value, params: &Value) -> ResponseTemplate {
        match params["uri"].as_str().unwrap_or_default() {
            "mem://notes" => Self::result(
                id,
                json!({ "contents": [{ "uri": "mem://notes", "mimeType": "text/plain", "text": "remember the milk" }] }),
            ),
            "file:///logo.png" => Self::result(
                id,
                json!({ "contents": [{
                    "uri": "file:///logo.png",
                    "mimeType": "image/png",
                    "blob": STANDARD.encode(logo_bytes()),
                }] }),
            ),
            other => Self::error(id, -32002, &format!("resource not found: {}", other)),
        }
    }
}

impl Respond for RpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(login) = self.0.authenticate(request) else {
            return ResponseTemplate::new(401);
        };
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };

        let id = body["id"].clone();
        let rpc_method = body["method"].as_str().unwrap_or_default().to_string();
        let params = &body["params"];
        self.0.record(&login, &rpc_method);

        match rpc_method.as_str() {
            "tools/list" => Self::result(
                &id,
                json!({ "tools": [
                    { "name": "whoami", "description": "Report the calling login" },
                    {
                        "name": "echo",
                        "description": "Echo a message",
                        "inputSchema": {
                            "type": "object",
                            "properties": { "message": { "type": "string" } },
                        },
                    },
                ] }),
            ),
            "tools/call" => self.call_tool(&id, &login, params),
            "resources/list" => Self::result(
                &id,
                json!({ "resources": [
                    { "uri": "mem://notes", "name": "notes", "mimeType": "text/plain" },
                    { "uri": "file:///logo.png", "name": "logo", "mimeType": "image/png" },
                ] }),
            ),
            "resources/read" => Self::read_resource(&id, params),
            "prompts/list" => Self::result(
                &id,
                json!({ "prompts": [{
                    "name": "greet",
                    "description": "Greet someone",
                    "arguments": [{ "name": "who", "required": true }],
                }] }),
            ),
            "prompts/get" => {
                let who = params["arguments"]["who"].as_str().unwrap_or("nobody");
                Self::result(
                    &id,
                    json!({
                        "description": "Greeting",
                        "messages": [{
                            "role": "user",
                            "content": { "type": "text", "text": format!("Hello, {}", who) },
                        }],
                    }),
                )
            }
            other => Self::error(&id, -32601, &format!("method not found: {}", other)),
        }
    }
}

/// Running mock backend
pub struct MockBackend {
    pub server: MockServer,
    state: BackendState,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with_delay(Duration::ZERO).await
    }

    /// Start with `whoami` answering after `delay`
    pub async fn start_with_delay(delay: Duration) -> Self {
        let state = BackendState {
            accounts: Arc::new(
                ACCOUNTS
                    .iter()
                    .map(|(l, s)| (l.to_string(), s.to_string()))
                    .collect(),
            ),
            health_down: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
            whoami_delay: delay,
        };

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(HealthResponder(state.clone()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(RpcResponder(state.clone()))
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Make `/health` answer 503 for every caller
    pub fn set_health_down(&self, down: bool) {
        self.state.health_down.store(down, Ordering::SeqCst);
    }

    /// Every authenticated call so far, as `(login, method)`
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.calls.lock().clone()
    }

    /// Methods called by `login`, in order
    pub fn calls_by(&self, login: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(l, _)| l == login)
            .map(|(_, m)| m)
            .collect()
    }
}
