//! fsx-http: the HTTP JSON API layer (spec §4.7, C7). Every endpoint is a
//! POST under `/api/fs/` taking a JSON body and returning the envelope
//! defined in [`envelope`].

mod envelope;
mod handlers;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use fsx_core::config::AuthConfig;
use fsx_core::handle::FileHandle;
use fsx_core::Kernel;
use serde_json::json;
use tokio::sync::Mutex;

pub use envelope::{ApiResult, Failure, Success};

const DEFAULT_NAMESPACE: &str = "default";

/// Request-scoped context attached by [`auth_and_namespace`]: the resolved
/// namespace and, if present, the bearer token presented by the caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub namespace: String,
    pub token: Option<String>,
}

/// Open handles keyed by an opaque id (spec §6 `open`). `open` allocates an
/// id here; the companion `/api/fs/handle/*` endpoints look it up, and
/// `close` removes it.
pub type HandleTable = DashMap<String, Mutex<FileHandle>>;

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Kernel>,
    pub auth: AuthConfig,
    pub handles: Arc<HandleTable>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/fs/read", post(handlers::read))
        .route("/api/fs/write", post(handlers::write))
        .route("/api/fs/unlink", post(handlers::unlink))
        .route("/api/fs/rename", post(handlers::rename))
        .route("/api/fs/copy", post(handlers::copy))
        .route("/api/fs/truncate", post(handlers::truncate))
        .route("/api/fs/mkdir", post(handlers::mkdir))
        .route("/api/fs/rmdir", post(handlers::rmdir))
        .route("/api/fs/rm", post(handlers::rm))
        .route("/api/fs/readdir", post(handlers::readdir))
        .route("/api/fs/stat", post(handlers::stat))
        .route("/api/fs/lstat", post(handlers::lstat))
        .route("/api/fs/access", post(handlers::access))
        .route("/api/fs/chmod", post(handlers::chmod))
        .route("/api/fs/chown", post(handlers::chown))
        .route("/api/fs/utimes", post(handlers::utimes))
        .route("/api/fs/symlink", post(handlers::symlink))
        .route("/api/fs/link", post(handlers::link))
        .route("/api/fs/readlink", post(handlers::readlink))
        .route("/api/fs/realpath", post(handlers::realpath))
        .route("/api/fs/promote", post(handlers::promote))
        .route("/api/fs/demote", post(handlers::demote))
        .route("/api/fs/getTier", post(handlers::get_tier))
        .route("/api/fs/open", post(handlers::open))
        .route("/api/fs/handle/read", post(handlers::handle_read))
        .route("/api/fs/handle/write", post(handlers::handle_write))
        .route("/api/fs/handle/stat", post(handlers::handle_stat))
        .route("/api/fs/handle/truncate", post(handlers::handle_truncate))
        .route("/api/fs/handle/sync", post(handlers::handle_sync))
        .route("/api/fs/handle/close", post(handlers::handle_close))
        .route("/health", axum::routing::get(health))
        .route("/version", axum::routing::get(version))
        .layer(middleware::from_fn_with_state(state.clone(), auth_and_namespace))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Reads `Authorization` and `X-Fsx-Namespace`, validates exactly one auth
/// scheme is present, and attaches a [`RequestContext`] extension. Namespace
/// defaults to `"default"` when the header is absent (spec §4.7).
async fn auth_and_namespace(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: Next,
) -> axum::response::Response {
    let namespace = headers
        .get("X-Fsx-Namespace")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").to_string());

    if !state.auth.api_keys.is_empty() {
        let authorized = token.as_deref().map(|t| state.auth.api_keys.iter().any(|k| k == t)).unwrap_or(false);
        if !authorized {
            let body = Json(json!({
                "success": false,
                "error": { "code": "EAUTH", "message": "authentication required" }
            }));
            return (StatusCode::UNAUTHORIZED, body).into_response();
        }
    }

    request.extensions_mut().insert(RequestContext { namespace, token });
    next.run(request).await
}

use axum::response::IntoResponse;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fsx_core::kernel::{Kernel, KernelLimits};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState {
            kernel: Arc::new(Kernel::new(
                Arc::new(MemoryMetadataStore::new()),
                Arc::new(MemoryBlobStore::new()),
                Arc::new(WatchManager::new()),
                KernelLimits::default(),
            )),
            auth: AuthConfig::default(),
            handles: Arc::new(HandleTable::new()),
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips_through_http() {
        let app = router(test_state());

        let write_body = json!({ "path": "/a.txt", "content": base64_encode(b"hello") });
        let write_req = Request::builder()
            .method("POST")
            .uri("/api/fs/write")
            .header("content-type", "application/json")
            .body(Body::from(write_body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(write_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let read_body = json!({ "path": "/a.txt" });
        let read_req = Request::builder()
            .method("POST")
            .uri("/api/fs/read")
            .header("content-type", "application/json")
            .body(Body::from(read_body.to_string()))
            .unwrap();
        let resp = app.oneshot(read_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["encoding"], "base64");
    }

    #[tokio::test]
    async fn missing_path_returns_404_envelope() {
        let app = router(test_state());
        let body = json!({ "path": "/missing.txt" });
        let req = Request::builder()
            .method("POST")
            .uri("/api/fs/stat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "ENOENT");
    }

    #[tokio::test]
    async fn auth_required_when_api_keys_configured() {
        let mut state = test_state();
        state.auth.api_keys = vec!["secret".to_string()];
        let app = router(state);
        let body = json!({ "path": "/a.txt" });
        let req = Request::builder()
            .method("POST")
            .uri("/api/fs/stat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    fn base64_encode(data: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    #[tokio::test]
    async fn open_then_handle_write_and_read_round_trip() {
        let app = router(test_state());

        let write_body = json!({ "path": "/a.txt", "content": base64_encode(b"hello") });
        let write_req = Request::builder()
            .method("POST")
            .uri("/api/fs/write")
            .header("content-type", "application/json")
            .body(Body::from(write_body.to_string()))
            .unwrap();
        assert_eq!(app.clone().oneshot(write_req).await.unwrap().status(), StatusCode::OK);

        let open_req = Request::builder()
            .method("POST")
            .uri("/api/fs/open")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "path": "/a.txt", "flags": "readwrite" }).to_string()))
            .unwrap();
        let resp = app.clone().oneshot(open_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let opened: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let handle = opened["data"]["handle"].as_str().unwrap().to_string();

        let hwrite_req = Request::builder()
            .method("POST")
            .uri("/api/fs/handle/write")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "handle": handle, "content": base64_encode(b"HELLO"), "pos": 0 }).to_string()))
            .unwrap();
        assert_eq!(app.clone().oneshot(hwrite_req).await.unwrap().status(), StatusCode::OK);

        let hsync_req = Request::builder()
            .method("POST")
            .uri("/api/fs/handle/sync")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "handle": handle }).to_string()))
            .unwrap();
        assert_eq!(app.clone().oneshot(hsync_req).await.unwrap().status(), StatusCode::OK);

        let hclose_req = Request::builder()
            .method("POST")
            .uri("/api/fs/handle/close")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "handle": handle }).to_string()))
            .unwrap();
        assert_eq!(app.clone().oneshot(hclose_req).await.unwrap().status(), StatusCode::OK);

        let read_req = Request::builder()
            .method("POST")
            .uri("/api/fs/read")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "path": "/a.txt" }).to_string()))
            .unwrap();
        let resp = app.oneshot(read_req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let content = value["data"]["content"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(content).unwrap();
        assert_eq!(decoded, b"HELLO");
    }
}
