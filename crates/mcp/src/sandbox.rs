//! Sandboxed execution for the `do` tool (spec §4.9). Runs caller-supplied
//! code through `rhai`, a pure-Rust embeddable scripting engine with no FFI
//! surface, rather than string-concatenation eval, per the spec's explicit
//! requirement for "a real isolated execution environment." See DESIGN.md
//! for why this is the one dependency in the crate with no pack precedent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rhai::{Dynamic, Engine, Scope};
use serde_json::{json, Value};

use crate::error::McpError;
use crate::fs_binding::FsBinding;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: String,
    pub timestamp: i64,
    pub message: String,
}

/// Builds a fresh `rhai::Engine` with the `fs` capability functions
/// registered and console output routed into a shared log buffer. A new
/// engine is built per invocation so permissions never leak across calls.
fn build_engine(fs: Arc<FsBinding>, logs: Arc<Mutex<Vec<LogEntry>>>, now_ms: i64, handle: tokio::runtime::Handle) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(10_000_000);
    engine.set_max_expr_depths(64, 64);

    let log_print = Arc::clone(&logs);
    engine.on_print(move |s| {
        log_print.lock().unwrap().push(LogEntry { level: "log".to_string(), timestamp: now_ms, message: s.to_string() });
    });
    let log_debug = Arc::clone(&logs);
    engine.on_debug(move |s, _src, _pos| {
        log_debug.lock().unwrap().push(LogEntry { level: "debug".to_string(), timestamp: now_ms, message: s.to_string() });
    });

    // Rhai's registered functions are synchronous; this body runs inside a
    // `spawn_blocking` thread (see `execute`), so blocking on the async `fs`
    // call here via the captured runtime handle is safe — it never blocks
    // an async worker thread.
    let fs_read = Arc::clone(&fs);
    let handle_read = handle.clone();
    engine.register_fn("fs_read", move |p: &str| -> Result<String, Box<rhai::EvalAltResult>> {
        handle_read
            .block_on(fs_read.read(p))
            .map(|b| String::from_utf8_lossy(&b).to_string())
            .map_err(rhai_err)
    });

    let fs_write = Arc::clone(&fs);
    let handle_write = handle.clone();
    engine.register_fn("fs_write", move |p: &str, content: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_write.block_on(fs_write.write(p, content.as_bytes().to_vec())).map_err(rhai_err)
    });

    let fs_exists = Arc::clone(&fs);
    let handle_exists = handle.clone();
    engine.register_fn("fs_exists", move |p: &str| -> Result<bool, Box<rhai::EvalAltResult>> {
        handle_exists.block_on(fs_exists.exists(p)).map_err(rhai_err)
    });

    let fs_delete = Arc::clone(&fs);
    let handle_delete = handle.clone();
    engine.register_fn("fs_delete", move |p: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_delete.block_on(fs_delete.delete(p)).map_err(rhai_err)
    });

    let fs_list = Arc::clone(&fs);
    let handle_list = handle.clone();
    engine.register_fn("fs_list", move |p: &str| -> Result<rhai::Array, Box<rhai::EvalAltResult>> {
        handle_list
            .block_on(fs_list.list(p))
            .map(|names| names.into_iter().map(Dynamic::from).collect())
            .map_err(rhai_err)
    });

    let fs_append = Arc::clone(&fs);
    let handle_append = handle.clone();
    engine.register_fn("fs_append", move |p: &str, content: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_append.block_on(fs_append.append(p, content.as_bytes().to_vec())).map_err(rhai_err)
    });

    let fs_move = Arc::clone(&fs);
    let handle_move = handle.clone();
    engine.register_fn("fs_move", move |src: &str, dest: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_move.block_on(fs_move.move_(src, dest)).map_err(rhai_err)
    });

    let fs_copy = Arc::clone(&fs);
    let handle_copy = handle.clone();
    engine.register_fn("fs_copy", move |src: &str, dest: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_copy.block_on(fs_copy.copy(src, dest)).map_err(rhai_err)
    });

    let fs_mkdir = Arc::clone(&fs);
    let handle_mkdir = handle.clone();
    engine.register_fn("fs_mkdir", move |p: &str| -> Result<(), Box<rhai::EvalAltResult>> {
        handle_mkdir.block_on(fs_mkdir.mkdir(p)).map_err(rhai_err)
    });

    let fs_stat = Arc::clone(&fs);
    let handle_stat = handle.clone();
    engine.register_fn("fs_stat", move |p: &str| -> Result<Dynamic, Box<rhai::EvalAltResult>> {
        handle_stat.block_on(fs_stat.stat(p)).map(|v| json_to_dynamic(&v)).map_err(rhai_err)
    });

    let fs_tree = Arc::clone(&fs);
    let handle_tree = handle.clone();
    engine.register_fn("fs_tree", move |p: &str, depth: i64| -> Result<Dynamic, Box<rhai::EvalAltResult>> {
        handle_tree.block_on(fs_tree.tree(p, depth.max(0) as usize)).map(|v| json_to_dynamic(&v)).map_err(rhai_err)
    });

    let fs_search = Arc::clone(&fs);
    let handle_search = handle.clone();
    engine.register_fn("fs_search", move |pattern: &str| -> Result<rhai::Array, Box<rhai::EvalAltResult>> {
        handle_search
            .block_on(fs_search.search(pattern))
            .map(|paths| paths.into_iter().map(Dynamic::from).collect())
            .map_err(rhai_err)
    });

    engine
}

/// Converts a JSON value returned by an `fs_*` binding (e.g. `fs_stat`,
/// `fs_tree`) into a Rhai [`Dynamic`]; rhai has no built-in `serde_json`
/// bridge without the `serde` feature, so this is hand-rolled.
fn json_to_dynamic(v: &Value) -> Dynamic {
    match v {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => n.as_i64().map(Dynamic::from).unwrap_or_else(|| Dynamic::from(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(json_to_dynamic).collect::<rhai::Array>()),
        Value::Object(map) => {
            let mut m = rhai::Map::new();
            for (k, v) in map {
                m.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(m)
        }
    }
}

fn rhai_err(e: fsx_core::FsError) -> Box<rhai::EvalAltResult> {
    format!("{}: {}", e.code.as_str(), e.message).into()
}

/// Executes `code` under a timeout, returning the script's result value
/// alongside captured console logs. Real sandboxes (this one included)
/// cannot interrupt a runaway script mid-execution without cooperative
/// yield points, so the timeout bounds the *surrounding* async task rather
/// than the Rhai VM itself — `set_max_operations` above is the in-VM
/// backstop against unbounded loops.
pub async fn execute(fs: Arc<FsBinding>, code: String, timeout_secs: Option<u64>, now_ms: i64) -> Result<Value, McpError> {
    let logs: Arc<Mutex<Vec<LogEntry>>> = Arc::new(Mutex::new(Vec::new()));
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

    let logs_for_run = Arc::clone(&logs);
    let handle = tokio::runtime::Handle::current();
    let run = tokio::task::spawn_blocking(move || {
        let engine = build_engine(fs, logs_for_run, now_ms, handle);
        let mut scope = Scope::new();
        engine.eval_with_scope::<Dynamic>(&mut scope, &code).map(dynamic_to_json).map_err(|e| e.to_string())
    });

    let outcome = tokio::time::timeout(timeout, run).await;
    let log_entries: Vec<Value> = logs
        .lock()
        .unwrap()
        .iter()
        .map(|l| json!({ "level": l.level, "timestamp": l.timestamp, "message": l.message }))
        .collect();

    match outcome {
        Err(_) => Err(McpError::timeout(format!("script exceeded {}s timeout", timeout.as_secs()))),
        Ok(Err(join_err)) => Err(McpError::new("EXECUTION_ERROR", join_err.to_string())),
        Ok(Ok(Err(eval_err))) => Err(McpError::new("EXECUTION_ERROR", eval_err)),
        Ok(Ok(Ok(result))) => Ok(json!({ "result": result, "logs": log_entries })),
    }
}

fn dynamic_to_json(d: Dynamic) -> Value {
    if d.is_unit() {
        return Value::Null;
    }
    if let Some(b) = d.clone().try_cast::<bool>() {
        return json!(b);
    }
    if let Some(i) = d.clone().try_cast::<i64>() {
        return json!(i);
    }
    if let Some(f) = d.clone().try_cast::<f64>() {
        return json!(f);
    }
    if let Some(s) = d.clone().try_cast::<String>() {
        return json!(s);
    }
    json!(d.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_binding::Permissions;
    use fsx_core::kernel::{Kernel, KernelLimits};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;

    fn make_fs() -> Arc<FsBinding> {
        let kernel = Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ));
        Arc::new(FsBinding::new(kernel, "default".to_string(), Permissions::default()))
    }

    #[tokio::test]
    async fn simple_expression_returns_result() {
        let fs = make_fs();
        let result = execute(fs, "1 + 2".to_string(), None, 0).await.unwrap();
        assert_eq!(result["result"], 3);
    }

    #[tokio::test]
    async fn print_statements_are_captured_as_logs() {
        let fs = make_fs();
        let result = execute(fs, "print(\"hello\"); 42".to_string(), None, 0).await.unwrap();
        assert_eq!(result["result"], 42);
        assert_eq!(result["logs"][0]["message"], "hello");
        assert_eq!(result["logs"][0]["level"], "log");
    }

    #[tokio::test]
    async fn syntax_error_is_reported_as_execution_error() {
        let fs = make_fs();
        let err = execute(fs, "let x = ".to_string(), None, 0).await.unwrap_err();
        assert_eq!(err.code, "EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn infinite_loop_is_stopped_by_max_operations() {
        let fs = make_fs();
        let err = execute(fs, "let i = 0; loop { i += 1; }".to_string(), Some(5), 0).await.unwrap_err();
        assert_eq!(err.code, "EXECUTION_ERROR");
    }

    #[tokio::test]
    async fn all_twelve_fs_bindings_are_reachable_from_script() {
        let kernel = Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ));
        let perms = Permissions { allow_write: true, allow_delete: true, allowed_paths: vec![] };
        let fs = Arc::new(FsBinding::new(kernel, "default".to_string(), perms));

        let script = r#"
            fs_mkdir("/d");
            fs_write("/d/a.txt", "one");
            fs_append("/d/a.txt", "-two");
            let copy_ok = fs_exists("/d/a.txt");
            fs_copy("/d/a.txt", "/d/b.txt");
            fs_move("/d/b.txt", "/d/c.txt");
            let listing = fs_list("/d");
            let s = fs_stat("/d/a.txt");
            let t = fs_tree("/d", 1);
            let found = fs_search("*.txt");
            fs_delete("/d/c.txt");
            fs_read("/d/a.txt")
        "#;
        let result = execute(fs, script.to_string(), None, 0).await.unwrap();
        assert_eq!(result["result"], "one-two");
    }
}
