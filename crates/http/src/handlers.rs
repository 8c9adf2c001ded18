//! One handler per endpoint in the table of spec §6 "Wire protocol — HTTP".
//! Each handler: extracts the request-scoped namespace, prefixes the path,
//! calls the kernel, and maps the result into the envelope.

use std::sync::Arc;

use axum::extract::{Extension, Json, State};
use base64::Engine;
use fsx_core::entry::Dirent;
use fsx_core::handle::{FileHandle, OpenFlags};
use fsx_core::kernel::{CopyOptions, MkdirOptions, ReaddirOptions, ReaddirResult, RenameOptions, RmOptions, RmdirOptions, WriteFlag, WriteOptions};
use fsx_core::{path, ErrorCode, FsError, Tier};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::envelope::{ApiResult, Success};
use crate::{AppState, RequestContext};

fn parse_open_flags(s: Option<&str>) -> OpenFlags {
    match s {
        Some("write") => OpenFlags::Write,
        Some("readwrite") => OpenFlags::ReadWrite,
        _ => OpenFlags::Read,
    }
}

fn no_such_handle(id: &str) -> FsError {
    FsError::new(ErrorCode::EBADF, format!("no open handle: {id}"))
}

fn ns_path(ctx: &RequestContext, p: &str) -> String {
    path::with_namespace(&ctx.namespace, p)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, crate::envelope::Failure> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| crate::envelope::Failure(fsx_core::FsError::einval(format!("bad base64: {e}"))))
}

fn b64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn parse_flag(s: Option<&str>) -> Option<WriteFlag> {
    match s {
        Some("wx") => Some(WriteFlag::WriteExclusive),
        Some("a") => Some(WriteFlag::Append),
        Some("w") => Some(WriteFlag::Write),
        _ => None,
    }
}

fn parse_tier(s: Option<&str>) -> Option<Tier> {
    match s {
        Some("hot") => Some(Tier::Hot),
        Some("warm") => Some(Tier::Warm),
        Some("cold") => Some(Tier::Cold),
        _ => None,
    }
}

#[derive(Deserialize)]
pub struct ReadBody {
    path: String,
    start: Option<u64>,
    end: Option<u64>,
}

pub async fn read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ReadBody>,
) -> ApiResult<Value> {
    let data = state.kernel.read_file(&ns_path(&ctx, &body.path), body.start, body.end).await?;
    Ok(Success(json!({ "content": b64_encode(&data), "encoding": "base64" })))
}

#[derive(Deserialize)]
pub struct WriteBody {
    path: String,
    content: String,
    mode: Option<u32>,
    flag: Option<String>,
    tier: Option<String>,
}

pub async fn write(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<WriteBody>,
) -> ApiResult<Value> {
    let data = b64_decode(&body.content)?;
    state
        .kernel
        .write_file(
            &ns_path(&ctx, &body.path),
            data,
            WriteOptions { mode: body.mode, flag: parse_flag(body.flag.as_deref()), tier: parse_tier(body.tier.as_deref()) },
        )
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct PathBody {
    path: String,
}

pub async fn unlink(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    state.kernel.unlink(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct RenameBody {
    #[serde(rename = "oldPath")]
    old_path: String,
    #[serde(rename = "newPath")]
    new_path: String,
    overwrite: Option<bool>,
}

pub async fn rename(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RenameBody>,
) -> ApiResult<Value> {
    state
        .kernel
        .rename(&ns_path(&ctx, &body.old_path), &ns_path(&ctx, &body.new_path), RenameOptions { overwrite: body.overwrite.unwrap_or(false) })
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct CopyBody {
    src: String,
    dest: String,
    overwrite: Option<bool>,
}

pub async fn copy(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CopyBody>,
) -> ApiResult<Value> {
    state
        .kernel
        .copy_file(&ns_path(&ctx, &body.src), &ns_path(&ctx, &body.dest), CopyOptions { overwrite: body.overwrite.unwrap_or(false) })
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct TruncateBody {
    path: String,
    length: u64,
}

pub async fn truncate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<TruncateBody>,
) -> ApiResult<Value> {
    state.kernel.truncate(&ns_path(&ctx, &body.path), body.length).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct MkdirBody {
    path: String,
    recursive: Option<bool>,
    mode: Option<u32>,
}

pub async fn mkdir(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<MkdirBody>,
) -> ApiResult<Value> {
    state
        .kernel
        .mkdir(&ns_path(&ctx, &body.path), MkdirOptions { recursive: body.recursive.unwrap_or(false), mode: body.mode })
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct RmdirBody {
    path: String,
    recursive: Option<bool>,
}

pub async fn rmdir(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RmdirBody>,
) -> ApiResult<Value> {
    state.kernel.rmdir(&ns_path(&ctx, &body.path), RmdirOptions { recursive: body.recursive.unwrap_or(false) }).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct RmBody {
    path: String,
    recursive: Option<bool>,
    force: Option<bool>,
}

pub async fn rm(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<RmBody>,
) -> ApiResult<Value> {
    state
        .kernel
        .rm(&ns_path(&ctx, &body.path), RmOptions { recursive: body.recursive.unwrap_or(false), force: body.force.unwrap_or(false) })
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct ReaddirBody {
    path: String,
    #[serde(rename = "withFileTypes")]
    with_file_types: Option<bool>,
    recursive: Option<bool>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ReaddirEntries {
    Names(Vec<String>),
    Dirents(Vec<Dirent>),
}

pub async fn readdir(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ReaddirBody>,
) -> ApiResult<Value> {
    let result = state
        .kernel
        .readdir(
            &ns_path(&ctx, &body.path),
            ReaddirOptions { with_file_types: body.with_file_types.unwrap_or(false), recursive: body.recursive.unwrap_or(false) },
        )
        .await?;
    let entries = match result {
        ReaddirResult::Names(names) => ReaddirEntries::Names(names),
        ReaddirResult::Dirents(mut dirents) => {
            for d in &mut dirents {
                d.path = path::strip_namespace(&ctx.namespace, &d.path);
                d.parent_path = path::strip_namespace(&ctx.namespace, &d.parent_path);
            }
            ReaddirEntries::Dirents(dirents)
        }
    };
    Ok(Success(json!({ "entries": entries })))
}

pub async fn stat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    let st = state.kernel.stat(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(serde_json::to_value(st).unwrap()))
}

pub async fn lstat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    let st = state.kernel.lstat(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(serde_json::to_value(st).unwrap()))
}

#[derive(Deserialize)]
pub struct AccessBody {
    path: String,
    mode: Option<u32>,
}

pub async fn access(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<AccessBody>,
) -> ApiResult<Value> {
    state
        .kernel
        .access(&ns_path(&ctx, &body.path), body.mode, fsx_core::kernel::Caller::default())
        .await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct ChmodBody {
    path: String,
    mode: u32,
}

pub async fn chmod(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ChmodBody>,
) -> ApiResult<Value> {
    state.kernel.chmod(&ns_path(&ctx, &body.path), body.mode).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct ChownBody {
    path: String,
    uid: u32,
    gid: u32,
}

pub async fn chown(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ChownBody>,
) -> ApiResult<Value> {
    state.kernel.chown(&ns_path(&ctx, &body.path), body.uid, body.gid).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct UtimesBody {
    path: String,
    atime: i64,
    mtime: i64,
}

pub async fn utimes(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<UtimesBody>,
) -> ApiResult<Value> {
    state.kernel.utimes(&ns_path(&ctx, &body.path), body.atime, body.mtime).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct SymlinkBody {
    target: String,
    path: String,
}

pub async fn symlink(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<SymlinkBody>,
) -> ApiResult<Value> {
    state.kernel.symlink(&body.target, &ns_path(&ctx, &body.path)).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct LinkBody {
    #[serde(rename = "existingPath")]
    existing_path: String,
    #[serde(rename = "newPath")]
    new_path: String,
}

pub async fn link(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<LinkBody>,
) -> ApiResult<Value> {
    state.kernel.link(&ns_path(&ctx, &body.existing_path), &ns_path(&ctx, &body.new_path)).await?;
    Ok(Success(Value::Null))
}

pub async fn readlink(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    let target = state.kernel.readlink(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(json!({ "target": target })))
}

pub async fn realpath(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    let resolved = state.kernel.realpath(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(json!({ "path": path::strip_namespace(&ctx.namespace, &resolved) })))
}

#[derive(Deserialize)]
pub struct TierBody {
    path: String,
    tier: String,
}

pub async fn promote(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<TierBody>,
) -> ApiResult<Value> {
    let tier = parse_tier(Some(&body.tier)).ok_or_else(|| fsx_core::FsError::einval("bad tier"))?;
    state.kernel.promote(&ns_path(&ctx, &body.path), tier).await?;
    Ok(Success(Value::Null))
}

pub async fn demote(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<TierBody>,
) -> ApiResult<Value> {
    let tier = parse_tier(Some(&body.tier)).ok_or_else(|| fsx_core::FsError::einval("bad tier"))?;
    state.kernel.demote(&ns_path(&ctx, &body.path), tier).await?;
    Ok(Success(Value::Null))
}

pub async fn get_tier(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PathBody>,
) -> ApiResult<Value> {
    let tier = state.kernel.get_tier(&ns_path(&ctx, &body.path)).await?;
    Ok(Success(json!({ "tier": tier.map(|t| t.as_str()) })))
}

#[derive(Deserialize)]
pub struct OpenBody {
    path: String,
    flags: Option<String>,
}

pub async fn open(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<OpenBody>,
) -> ApiResult<Value> {
    let flags = parse_open_flags(body.flags.as_deref());
    let handle = FileHandle::open(Arc::clone(&state.kernel), &ns_path(&ctx, &body.path), flags).await?;
    let id = Uuid::new_v4().to_string();
    state.handles.insert(id.clone(), Mutex::new(handle));
    Ok(Success(json!({ "handle": id })))
}

#[derive(Deserialize)]
pub struct HandleReadBody {
    handle: String,
    pos: Option<u64>,
    len: usize,
}

pub async fn handle_read(State(state): State<AppState>, Json(body): Json<HandleReadBody>) -> ApiResult<Value> {
    let entry = state.handles.get(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    let mut handle = entry.lock().await;
    let data = handle.read(body.pos.unwrap_or(0), body.len).await?;
    Ok(Success(json!({ "content": b64_encode(&data), "encoding": "base64" })))
}

#[derive(Deserialize)]
pub struct HandleWriteBody {
    handle: String,
    content: String,
    pos: Option<u64>,
}

pub async fn handle_write(State(state): State<AppState>, Json(body): Json<HandleWriteBody>) -> ApiResult<Value> {
    let data = b64_decode(&body.content)?;
    let entry = state.handles.get(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    let mut handle = entry.lock().await;
    handle.write(&data, body.pos.unwrap_or(0)).await?;
    Ok(Success(Value::Null))
}

#[derive(Deserialize)]
pub struct HandleIdBody {
    handle: String,
}

pub async fn handle_stat(State(state): State<AppState>, Json(body): Json<HandleIdBody>) -> ApiResult<Value> {
    let entry = state.handles.get(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    let handle = entry.lock().await;
    let st = handle.stat().await?;
    Ok(Success(serde_json::to_value(st).unwrap()))
}

#[derive(Deserialize)]
pub struct HandleTruncateBody {
    handle: String,
    length: u64,
}

pub async fn handle_truncate(State(state): State<AppState>, Json(body): Json<HandleTruncateBody>) -> ApiResult<Value> {
    let entry = state.handles.get(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    let mut handle = entry.lock().await;
    handle.truncate(body.length).await?;
    Ok(Success(Value::Null))
}

pub async fn handle_sync(State(state): State<AppState>, Json(body): Json<HandleIdBody>) -> ApiResult<Value> {
    let entry = state.handles.get(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    let mut handle = entry.lock().await;
    handle.sync().await?;
    Ok(Success(Value::Null))
}

pub async fn handle_close(State(state): State<AppState>, Json(body): Json<HandleIdBody>) -> ApiResult<Value> {
    let (_, entry) = state.handles.remove(&body.handle).ok_or_else(|| no_such_handle(&body.handle))?;
    entry.into_inner().close().await?;
    Ok(Success(Value::Null))
}
