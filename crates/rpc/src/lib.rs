//! fsx-rpc: the bulk/streaming RPC facade (spec §4.8, C8). A single POST
//! endpoint accepts an [`types::RpcRequest`] envelope, dispatches on
//! `method`, and returns an [`types::RpcResponse`] envelope — mirroring the
//! server's MCP HTTP transport's method dispatch in shape, scoped instead to
//! the fs bulk/stream method set.

pub mod batch;
pub mod checksum;
pub mod stream;
pub mod tree;
pub mod types;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use dashmap::DashMap;
use fsx_core::config::AuthConfig;
use fsx_core::kernel::WriteOptions;
use fsx_core::{path, ErrorCode, FsError, Kernel};
use serde::Deserialize;
use serde_json::{json, Value};

use stream::b64_encode;
use types::{RpcRequest, RpcResponse};

#[derive(Clone)]
pub struct RpcState {
    pub kernel: Arc<Kernel>,
    pub streams: Arc<stream::StreamRegistry>,
    pub auth: AuthConfig,
    cancellations: Arc<DashMap<String, Arc<AtomicBool>>>,
}

impl RpcState {
    pub fn new(kernel: Arc<Kernel>, auth: AuthConfig) -> Self {
        let streams = Arc::new(stream::StreamRegistry::new());
        streams.spawn_pruner();
        Self { kernel, streams, auth, cancellations: Arc::new(DashMap::new()) }
    }

    /// Returns the cancellation flag for `token`, creating it if this is the
    /// first call batch/stream that references it (spec §4.8/§5: every
    /// long-running call accepts a cancellation token).
    fn cancel_flag(&self, token: Option<&str>) -> Arc<AtomicBool> {
        match token {
            Some(t) => Arc::clone(self.cancellations.entry(t.to_string()).or_insert_with(|| Arc::new(AtomicBool::new(false))).value()),
            None => Arc::new(AtomicBool::new(false)),
        }
    }
}

pub fn router(state: RpcState) -> Router {
    Router::new().route("/rpc", post(handle_rpc)).with_state(state)
}

async fn handle_rpc(State(state): State<RpcState>, Json(req): Json<RpcRequest>) -> Json<RpcResponse> {
    let start = std::time::Instant::now();
    let namespace = req
        .params
        .get("namespace")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string();

    let result = dispatch(&state, &namespace, &req.method, req.cancel_token.as_deref(), req.params.clone()).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let response = match result {
        Ok(data) => RpcResponse::ok(req.id, duration_ms, data),
        Err(e) => RpcResponse::err(req.id, duration_ms, e.into()),
    };
    Json(response)
}

async fn dispatch(state: &RpcState, namespace: &str, method: &str, cancel_token: Option<&str>, params: Value) -> Result<Value, FsError> {
    match method {
        "ping" => Ok(json!({ "ok": true, "timestamp": now_ms(), "version": env!("CARGO_PKG_VERSION") })),

        "cancel" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                cancel_token: String,
            }
            let p: P = parse(params)?;
            state.cancel_flag(Some(&p.cancel_token)).store(true, Ordering::SeqCst);
            Ok(json!({ "cancelled": true }))
        }

        "batchRead" => {
            let p: batch::BatchReadParams = parse(params)?;
            let flag = state.cancel_flag(cancel_token);
            Ok(batch::batch_read(Arc::clone(&state.kernel), namespace.to_string(), p, flag).await)
        }
        "batchWrite" => {
            let p: batch::BatchWriteParams = parse(params)?;
            let flag = state.cancel_flag(cancel_token);
            Ok(batch::batch_write(Arc::clone(&state.kernel), namespace.to_string(), p, flag).await)
        }
        "batchDelete" => {
            let p: batch::BatchDeleteParams = parse(params)?;
            let flag = state.cancel_flag(cancel_token);
            Ok(batch::batch_delete(Arc::clone(&state.kernel), namespace.to_string(), p, flag).await)
        }
        "batchStat" => {
            let p: batch::BatchStatParams = parse(params)?;
            let flag = state.cancel_flag(cancel_token);
            Ok(batch::batch_stat(Arc::clone(&state.kernel), namespace.to_string(), p, flag).await)
        }

        "streamReadStart" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                path: String,
                #[serde(default)]
                chunk_size: Option<usize>,
            }
            let p: P = parse(params)?;
            let full = path::with_namespace(namespace, &p.path);
            let (id, total) = state.streams.start_read(&state.kernel, namespace, &p.path, p.chunk_size).await.map_err(|e| e.with_path(full))?;
            Ok(json!({ "sessionId": id, "totalBytes": total }))
        }
        "streamReadChunk" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
            }
            let p: P = parse(params)?;
            let (chunk, done) = state.streams.read_chunk(&p.session_id)?;
            Ok(json!({ "chunk": b64_encode(&chunk), "done": done }))
        }
        "streamReadEnd" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
            }
            let p: P = parse(params)?;
            state.streams.end_read(&p.session_id);
            Ok(json!({ "closed": true }))
        }
        "streamReadAbort" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
            }
            let p: P = parse(params)?;
            state.streams.abort_read(&p.session_id);
            Ok(json!({ "aborted": true }))
        }

        "streamWriteStart" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                path: String,
            }
            let p: P = parse(params)?;
            let id = state.streams.start_write(&p.path);
            Ok(json!({ "sessionId": id }))
        }
        "streamWriteChunk" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
                chunk: Value,
            }
            let p: P = parse(params)?;
            let data = stream::decode_chunk_bytes(&p.chunk)?;
            let total = state.streams.write_chunk(&p.session_id, &data)?;
            Ok(json!({ "bytesReceived": total }))
        }
        "streamWriteEnd" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
                #[serde(default)]
                mode: Option<u32>,
                #[serde(default)]
                tier: Option<String>,
            }
            let p: P = parse(params)?;
            let opts = WriteOptions { mode: p.mode, flag: None, tier: parse_tier(p.tier.as_deref()) };
            let (len, checksum) = state.streams.end_write(&state.kernel, namespace, &p.session_id, opts).await?;
            Ok(json!({ "bytes": len, "checksum": checksum }))
        }
        "streamWriteAbort" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                session_id: String,
            }
            let p: P = parse(params)?;
            state.streams.abort_write(&p.session_id);
            Ok(json!({ "aborted": true }))
        }

        "copyTree" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                src: String,
                dest: String,
                #[serde(default)]
                overwrite: bool,
            }
            let p: P = parse(params)?;
            let src = path::with_namespace(namespace, &p.src);
            let dest = path::with_namespace(namespace, &p.dest);
            tree::copy_tree(&state.kernel, &src, &dest, p.overwrite).await
        }
        "moveTree" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                src: String,
                dest: String,
                #[serde(default)]
                overwrite: bool,
            }
            let p: P = parse(params)?;
            let src = path::with_namespace(namespace, &p.src);
            let dest = path::with_namespace(namespace, &p.dest);
            tree::move_tree(&state.kernel, &src, &dest, p.overwrite).await
        }
        "dirSize" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                path: String,
            }
            let p: P = parse(params)?;
            let full = path::with_namespace(namespace, &p.path);
            tree::dir_size(&state.kernel, &full).await
        }

        "checksum" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                path: String,
                #[serde(default = "default_algorithm")]
                algorithm: String,
            }
            let p: P = parse(params)?;
            let full = path::with_namespace(namespace, &p.path);
            let sum = checksum::checksum(&state.kernel, &full, &p.algorithm).await?;
            Ok(json!({ "checksum": sum, "algorithm": p.algorithm }))
        }
        "verify" => {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct P {
                path: String,
                expected_checksum: String,
                #[serde(default = "default_algorithm")]
                algorithm: String,
            }
            let p: P = parse(params)?;
            let full = path::with_namespace(namespace, &p.path);
            let matches = checksum::verify(&state.kernel, &full, &p.expected_checksum, &p.algorithm).await?;
            Ok(json!({ "matches": matches }))
        }

        other => Err(FsError::new(ErrorCode::EINVAL, format!("unknown RPC method: {other}"))),
    }
}

fn default_algorithm() -> String {
    "sha256".to_string()
}

fn parse_tier(s: Option<&str>) -> Option<fsx_core::Tier> {
    match s {
        Some("hot") => Some(fsx_core::Tier::Hot),
        Some("warm") => Some(fsx_core::Tier::Warm),
        Some("cold") => Some(fsx_core::Tier::Cold),
        _ => None,
    }
}

fn parse<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, FsError> {
    serde_json::from_value(params).map_err(|e| FsError::new(ErrorCode::EINVAL, format!("invalid params: {e}")))
}

fn now_ms() -> i64 {
    // Logical clock, matching the kernel's own `now_ms` (see kernel.rs).
    static CLOCK: AtomicI64 = AtomicI64::new(0);
    CLOCK.fetch_add(1, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_core::kernel::{Kernel, KernelLimits};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;
    use serde_json::json;

    fn make_state() -> RpcState {
        RpcState::new(
            Arc::new(Kernel::new(
                Arc::new(MemoryMetadataStore::new()),
                Arc::new(MemoryBlobStore::new()),
                Arc::new(WatchManager::new()),
                KernelLimits::default(),
            )),
            AuthConfig::default(),
        )
    }

    #[tokio::test]
    async fn ping_returns_ok() {
        let state = make_state();
        let result = dispatch(&state, "default", "ping", None, json!({})).await.unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn unknown_method_is_einval() {
        let state = make_state();
        let err = dispatch(&state, "default", "doesNotExist", None, json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EINVAL);
    }

    #[tokio::test]
    async fn batch_write_then_checksum_round_trips() {
        let state = make_state();
        let write_params = json!({
            "files": [{ "path": "/a.txt", "content": b64_encode(b"hi") }]
        });
        dispatch(&state, "default", "batchWrite", None, write_params).await.unwrap();
        let result = dispatch(&state, "default", "checksum", None, json!({ "path": "/a.txt" })).await.unwrap();
        assert!(result["checksum"].as_str().unwrap().len() == 64);
    }

    #[tokio::test]
    async fn stream_write_then_read_round_trips() {
        let state = make_state();
        let start = dispatch(&state, "default", "streamWriteStart", None, json!({ "path": "/s.txt" })).await.unwrap();
        let sid = start["sessionId"].as_str().unwrap().to_string();
        dispatch(&state, "default", "streamWriteChunk", None, json!({ "sessionId": sid, "chunk": b64_encode(b"part1") })).await.unwrap();
        let end = dispatch(&state, "default", "streamWriteEnd", None, json!({ "sessionId": sid })).await.unwrap();
        assert_eq!(end["bytes"], 5);

        let rstart = dispatch(&state, "default", "streamReadStart", None, json!({ "path": "/s.txt" })).await.unwrap();
        let rsid = rstart["sessionId"].as_str().unwrap().to_string();
        let chunk = dispatch(&state, "default", "streamReadChunk", None, json!({ "sessionId": rsid })).await.unwrap();
        assert_eq!(chunk["done"], true);
    }

    #[tokio::test]
    async fn cancel_before_batch_stops_it_from_running() {
        let state = make_state();
        dispatch(&state, "default", "cancel", None, json!({ "cancelToken": "tok1" })).await.unwrap();
        let write_params = json!({ "files": [{ "path": "/a.txt", "content": b64_encode(b"hi") }] });
        let result = dispatch(&state, "default", "batchWrite", Some("tok1"), write_params).await.unwrap();
        assert_eq!(result["total"], 0);
    }
}
