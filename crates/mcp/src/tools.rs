//! The three core MCP tools (spec §4.9): `search`, `fetch`, `do`.

use std::sync::Arc;

use serde_json::{json, Value};

use fsx_core::entry::EntryType;
use fsx_core::kernel::{ReaddirOptions, ReaddirResult};
use fsx_core::{glob::GlobMatcher, Kernel};

use crate::error::McpError;
use crate::fs_binding::{FsBinding, Permissions};
use crate::registry::{ToolContext, ToolRegistry};
use crate::sandbox;

pub fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "glob pattern, or `grep:<substring>` for content search" },
            "limit": { "type": "integer" },
            "path": { "type": "string" }
        },
        "required": ["query"]
    })
}

pub fn fetch_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "resource": { "type": "string" } },
        "required": ["resource"]
    })
}

pub fn do_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": { "type": "string" },
            "timeoutSecs": { "type": "integer" },
            "allowWrite": { "type": "boolean" },
            "allowDelete": { "type": "boolean" },
            "allowedPaths": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["code"]
    })
}

async fn walk_all(kernel: &Kernel, root: &str, out: &mut Vec<String>) -> fsx_core::FsResult<()> {
    let ReaddirResult::Dirents(entries) = kernel.readdir(root, ReaddirOptions { with_file_types: true, recursive: false }).await? else {
        unreachable!("with_file_types requests Dirents");
    };
    for entry in entries {
        out.push(entry.path.clone());
        if entry.entry_type == EntryType::Directory {
            Box::pin(walk_all(kernel, &entry.path, out)).await?;
        }
    }
    Ok(())
}

/// Registers `search`, `fetch`, and `do` against `registry`. `kernel` and
/// `namespace` are captured so every invocation resolves paths the same way
/// the HTTP/RPC layers do.
pub fn register_builtins(registry: &ToolRegistry, kernel: Arc<Kernel>, namespace: String) {
    let search_kernel = Arc::clone(&kernel);
    let search_ns = namespace.clone();
    registry
        .register("search", "Search files by glob pattern or content substring (`grep:<text>`)", search_schema(), move |params, _ctx| {
            let kernel = Arc::clone(&search_kernel);
            let namespace = search_ns.clone();
            async move { run_search(&kernel, &namespace, params).await }
        })
        .expect("builtin tool names and schemas are statically valid");

    let fetch_kernel = Arc::clone(&kernel);
    let fetch_ns = namespace.clone();
    registry
        .register("fetch", "Read a file, or render a depth-2 tree for a directory", fetch_schema(), move |params, _ctx| {
            let kernel = Arc::clone(&fetch_kernel);
            let namespace = fetch_ns.clone();
            async move { run_fetch(kernel, namespace, params).await }
        })
        .expect("builtin tool names and schemas are statically valid");

    let do_kernel = Arc::clone(&kernel);
    let do_ns = namespace;
    registry
        .register("do", "Execute sandboxed code with an `fs` capability binding", do_schema(), move |params, ctx| {
            let kernel = Arc::clone(&do_kernel);
            let namespace = do_ns.clone();
            async move { run_do(kernel, namespace, params, ctx).await }
        })
        .expect("builtin tool names and schemas are statically valid");
}

async fn run_search(kernel: &Kernel, namespace: &str, params: Value) -> Result<Value, McpError> {
    let query = params.get("query").and_then(Value::as_str).ok_or_else(|| McpError::invalid_params("query must be a string"))?;
    let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
    let root = params.get("path").and_then(Value::as_str).unwrap_or("/");
    let full_root = fsx_core::path::with_namespace(namespace, root);

    let mut all_paths = vec![full_root.clone()];
    walk_all(kernel, &full_root, &mut all_paths).await?;

    let matches: Vec<String> = if let Some(needle) = query.strip_prefix("grep:") {
        let mut hits = Vec::new();
        for p in &all_paths {
            if kernel.stat(p).await.map(|s| s.entry_type == EntryType::Directory).unwrap_or(true) {
                continue;
            }
            if let Ok(data) = kernel.read_file(p, None, None).await {
                if String::from_utf8_lossy(&data).contains(needle) {
                    hits.push(fsx_core::path::strip_namespace(namespace, p));
                }
            }
            if hits.len() >= limit {
                break;
            }
        }
        hits
    } else {
        let matcher = GlobMatcher::compile(query).map_err(|e| McpError::invalid_params(e.to_string()))?;
        all_paths
            .iter()
            .map(|p| fsx_core::path::strip_namespace(namespace, p))
            .filter(|rel| matcher.is_match(rel.trim_start_matches('/')))
            .take(limit)
            .collect()
    };

    Ok(json!({
        "text": format!("{} match(es) for {:?}:\n{}", matches.len(), query, matches.join("\n")),
        "paths": matches,
    }))
}

fn infer_mime(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "txt" => "text/plain",
        "json" => "application/json",
        "rs" => "text/x-rust",
        "toml" => "application/toml",
        "md" => "text/markdown",
        "html" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

async fn run_fetch(kernel: Arc<Kernel>, namespace: String, params: Value) -> Result<Value, McpError> {
    let resource = params.get("resource").and_then(Value::as_str).ok_or_else(|| McpError::invalid_params("resource must be a string"))?;
    let full = fsx_core::path::with_namespace(&namespace, resource);
    let st = kernel.stat(&full).await?;

    if st.entry_type == EntryType::Directory {
        let fs = FsBinding::new(Arc::clone(&kernel), namespace.clone(), Permissions::default());
        let tree = fs.tree(resource, 2).await?;
        return Ok(json!({
            "text": format!("directory tree for {resource} (depth 2):\n{}", serde_json::to_string_pretty(&tree).unwrap_or_default()),
            "tree": tree,
            "metadata": { "type": "directory", "size": 0 },
        }));
    }

    let data = kernel.read_file(&full, None, None).await?;
    let mime = infer_mime(resource);
    Ok(json!({
        "text": String::from_utf8_lossy(&data),
        "metadata": { "type": "file", "size": st.size, "mime": mime },
    }))
}

async fn run_do(kernel: Arc<Kernel>, namespace: String, params: Value, ctx: ToolContext) -> Result<Value, McpError> {
    let code = params.get("code").and_then(Value::as_str).ok_or_else(|| McpError::invalid_params("code must be a string"))?.to_string();
    let timeout_secs = params.get("timeoutSecs").and_then(Value::as_u64);
    let permissions = Permissions {
        allow_write: params.get("allowWrite").and_then(Value::as_bool).unwrap_or(false),
        allow_delete: params.get("allowDelete").and_then(Value::as_bool).unwrap_or(false),
        allowed_paths: params
            .get("allowedPaths")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    };
    let fs = Arc::new(FsBinding::new(kernel, namespace, permissions));
    sandbox::execute(fs, code, timeout_secs, ctx.timestamp).await
}
