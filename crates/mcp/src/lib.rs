//! fsx-mcp: the MCP tool registry and transport (spec §4.9, C9/C10). Wires
//! up the `search`/`fetch`/`do` builtin tools over an [`fsx_core::Kernel`],
//! enforces the auth scope rules, and exposes a JSON-RPC-2.0-shaped
//! streamable HTTP transport at `/mcp`, grounded on the server binary's
//! `mcp_http.rs`/`mcp.rs` dispatch pattern.

pub mod auth;
pub mod error;
pub mod fs_binding;
pub mod registry;
pub mod sandbox;
pub mod tools;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use serde_json::{json, Value};
use uuid::Uuid;

use fsx_core::config::AuthConfig;
use fsx_core::Kernel;

pub use error::McpError;
pub use registry::{Tool, ToolContext, ToolRegistry};

const SESSION_HEADER: &str = "mcp-session-id";
const SESSION_IDLE_TTL: Duration = Duration::from_secs(600);
const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const PROTOCOL_VERSION: &str = "2025-11-25";

#[derive(Clone)]
pub struct McpState {
    pub kernel: Arc<Kernel>,
    pub registry: Arc<ToolRegistry>,
    pub auth: AuthConfig,
    sessions: Arc<DashMap<String, Instant>>,
}

impl McpState {
    pub fn new(kernel: Arc<Kernel>, auth: AuthConfig, namespace: impl Into<String>) -> Self {
        let registry = Arc::new(ToolRegistry::new());
        tools::register_builtins(&registry, Arc::clone(&kernel), namespace.into());
        Self { kernel, registry, auth, sessions: Arc::new(DashMap::new()) }
    }

    /// Spawns the idle-session pruning sweep, mirroring the server binary's
    /// MCP session cleanup task (fixed-interval tick, retain by cutoff).
    pub fn spawn_session_pruner(&self) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                let cutoff = Instant::now() - SESSION_IDLE_TTL;
                sessions.retain(|_, last_seen| *last_seen > cutoff);
            }
        });
    }
}

fn now_ms() -> i64 {
    static COUNTER: AtomicI64 = AtomicI64::new(0);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

pub fn router(state: McpState) -> Router {
    state.spawn_session_pruner();
    Router::new().route("/mcp", post(handle_post).delete(handle_delete).get(handle_get)).with_state(state)
}

fn caller_scopes(headers: &HeaderMap, auth: &AuthConfig) -> auth::CallerScopes {
    let token = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(|v| v.trim_start_matches("Bearer ").to_string());
    match token {
        Some(t) if auth.api_keys.iter().any(|k| k == &t) => {
            auth::CallerScopes { authenticated: true, scopes: ["read".to_string(), "write".to_string()].into() }
        }
        Some(_) | None => auth::CallerScopes::anonymous(),
    }
}

async fn handle_get() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn handle_delete(State(state): State<McpState>, headers: HeaderMap) -> StatusCode {
    if let Some(sid) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        state.sessions.remove(sid);
    }
    StatusCode::OK
}

async fn handle_post(State(state): State<McpState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let is_batch = body.is_array();
    let requests: Vec<Value> = if is_batch { body.as_array().cloned().unwrap_or_default() } else { vec![body] };

    let mut responses = Vec::with_capacity(requests.len());
    let mut new_session_id = None;
    let caller = caller_scopes(&headers, &state.auth);

    for req in &requests {
        let method = req.get("method").and_then(Value::as_str).unwrap_or("");
        let id = req.get("id").cloned().unwrap_or(Value::Null);

        let result = match method {
            "initialize" => {
                let sid = Uuid::new_v4().to_string();
                state.sessions.insert(sid.clone(), Instant::now());
                new_session_id = Some(sid);
                Ok(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "fsx-mcp", "version": env!("CARGO_PKG_VERSION") },
                }))
            }
            "tools/list" => Ok(json!({ "tools": state.registry.schemas() })),
            "tools/call" => handle_tool_call(&state, &caller, req).await,
            other => Err(McpError::new("METHOD_NOT_FOUND", format!("unknown MCP method: {other}"))),
        };

        responses.push(match result {
            Ok(value) => json!({ "jsonrpc": "2.0", "id": id, "result": value }),
            Err(e) => json!({ "jsonrpc": "2.0", "id": id, "result": { "content": [{ "type": "text", "text": e.message }], "isError": true, "errorCode": e.code } }),
        });
    }

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    let body_json = if is_batch { json!(responses) } else { responses.into_iter().next().unwrap() };
    let mut resp = Json(body_json).into_response();
    if let Some(sid) = new_session_id {
        resp.headers_mut().insert(SESSION_HEADER, sid.parse().expect("uuid is a valid header value"));
    }
    resp
}

async fn handle_tool_call(state: &McpState, caller: &auth::CallerScopes, req: &Value) -> Result<Value, McpError> {
    let params = &req["params"];
    let name = params.get("name").and_then(Value::as_str).ok_or_else(|| McpError::invalid_params("missing tool name"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    auth::check(name, caller, &state.auth)?;

    let value = state.registry.invoke(name, arguments, now_ms()).await?;
    let text = value.get("text").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| value.to_string());
    Ok(json!({ "content": [{ "type": "text", "text": text }], "isError": false, "data": value }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fsx_core::kernel::{Kernel, KernelLimits, WriteOptions};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> McpState {
        let kernel = Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ));
        McpState::new(kernel, AuthConfig { allow_anonymous_read: true, ..Default::default() }, "default")
    }

    async fn post_json(app: &Router, body: Value) -> Value {
        let req = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn initialize_returns_server_info() {
        let app = router(test_state());
        let resp = post_json(&app, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} })).await;
        assert_eq!(resp["result"]["serverInfo"]["name"], "fsx-mcp");
    }

    #[tokio::test]
    async fn tools_list_includes_builtins() {
        let app = router(test_state());
        let resp = post_json(&app, json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" })).await;
        let names: Vec<String> = resp["result"]["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap().to_string()).collect();
        assert!(names.contains(&"search".to_string()));
        assert!(names.contains(&"fetch".to_string()));
        assert!(names.contains(&"do".to_string()));
    }

    #[tokio::test]
    async fn fetch_tool_reads_a_written_file() {
        let state = test_state();
        state.kernel.write_file("/__ns_default__/a.txt", b"hello".to_vec(), WriteOptions::default()).await.unwrap();
        let app = router(state);
        let resp = post_json(
            &app,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "fetch", "arguments": { "resource": "/a.txt" } } }),
        )
        .await;
        assert_eq!(resp["result"]["isError"], false);
        assert_eq!(resp["result"]["content"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn do_tool_is_rejected_without_write_scope() {
        let kernel = Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ));
        let state = McpState::new(kernel, AuthConfig::default(), "default");
        let app = router(state);
        let resp = post_json(
            &app,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "do", "arguments": { "code": "1 + 1" } } }),
        )
        .await;
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["errorCode"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn unknown_tool_name_is_gated_behind_admin_auth() {
        // Unknown tool names classify as admin (spec §4.9: "unknown tools
        // require admin"); an anonymous caller fails the authentication
        // check before the registry even gets a chance to report
        // TOOL_NOT_FOUND.
        let app = router(test_state());
        let resp = post_json(
            &app,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": { "name": "nope" } }),
        )
        .await;
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["errorCode"], "AUTH_REQUIRED");
    }
}
