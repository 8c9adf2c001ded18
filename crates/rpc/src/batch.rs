//! Batch read/write/delete/stat (spec §4.8). Operations are scheduled in
//! waves of `parallelLimit`; with `continueOnError` each failure is recorded
//! and the wave continues, otherwise the first failure aborts the batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::Engine;
use fsx_core::kernel::WriteOptions;
use fsx_core::{path, Kernel, Tier};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::{BatchItemResult, BatchResult};

fn b64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn parse_tier(s: Option<&str>) -> Option<Tier> {
    match s {
        Some("hot") => Some(Tier::Hot),
        Some("warm") => Some(Tier::Warm),
        Some("cold") => Some(Tier::Cold),
        _ => None,
    }
}

/// Runs `items` through `op` in waves of `parallel_limit` concurrent tasks,
/// preserving input order in the returned results. When `continue_on_error`
/// is false, the first failing wave stops further waves from being
/// scheduled.
async fn run_waves<T, F, Fut>(
    items: Vec<T>,
    parallel_limit: usize,
    continue_on_error: bool,
    cancelled: Arc<AtomicBool>,
    op: F,
) -> Vec<BatchItemResult>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = BatchItemResult> + Send + 'static,
{
    let op = Arc::new(op);
    let wave_size = parallel_limit.max(1);
    let mut remaining = items;
    let mut out = Vec::with_capacity(remaining.len());
    let mut aborted = false;

    while !remaining.is_empty() {
        if aborted || cancelled.load(Ordering::SeqCst) {
            break;
        }
        let wave: Vec<T> = if remaining.len() > wave_size {
            remaining.drain(..wave_size).collect()
        } else {
            std::mem::take(&mut remaining)
        };

        let mut handles = Vec::with_capacity(wave.len());
        for item in wave {
            let op = Arc::clone(&op);
            handles.push(tokio::spawn(op(item)));
        }
        for h in handles {
            let result = h.await.unwrap_or(BatchItemResult {
                path: String::new(),
                success: false,
                error: Some("task panicked".to_string()),
                code: Some("EIO".to_string()),
                bytes: None,
                tier: None,
                checksum: None,
            });
            if !result.success && !continue_on_error {
                aborted = true;
            }
            out.push(result);
        }
    }
    out
}

fn summarize(results: &[BatchItemResult], duration_ms: u64) -> BatchResult {
    let succeeded = results.iter().filter(|r| r.success).count();
    BatchResult {
        total: results.len(),
        succeeded,
        failed: results.len() - succeeded,
        results: results.to_vec(),
        duration_ms,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadParams {
    pub paths: Vec<String>,
    #[serde(default)]
    pub continue_on_error: Option<bool>,
    #[serde(default)]
    pub parallel_limit: Option<usize>,
}

pub async fn batch_read(kernel: Arc<Kernel>, namespace: String, params: BatchReadParams, cancelled: Arc<AtomicBool>) -> Value {
    let start = std::time::Instant::now();
    let continue_on_error = params.continue_on_error.unwrap_or(true);
    let parallel_limit = params.parallel_limit.unwrap_or(10);

    let contents: Arc<tokio::sync::Mutex<HashMap<String, String>>> =
        Arc::new(tokio::sync::Mutex::new(HashMap::new()));

    let ns = namespace.clone();
    let contents_for_op = Arc::clone(&contents);
    let results = run_waves(params.paths, parallel_limit, continue_on_error, Arc::clone(&cancelled), move |p: String| {
        let kernel = Arc::clone(&kernel);
        let ns = ns.clone();
        let contents = Arc::clone(&contents_for_op);
        async move {
            let full = path::with_namespace(&ns, &p);
            match kernel.read_file(&full, None, None).await {
                Ok(data) => {
                    let len = data.len() as u64;
                    contents.lock().await.insert(p.clone(), b64(&data));
                    BatchItemResult { path: p, success: true, error: None, code: None, bytes: Some(len), tier: None, checksum: None }
                }
                Err(e) => BatchItemResult {
                    path: p,
                    success: false,
                    error: Some(e.message.clone()),
                    code: Some(e.code.as_str().to_string()),
                    bytes: None,
                    tier: None,
                    checksum: None,
                },
            }
        }
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let batch = summarize(&results, duration_ms);
    let contents = Arc::try_unwrap(contents).map(|m| m.into_inner()).unwrap_or_default();
    json!({
        "total": batch.total,
        "succeeded": batch.succeeded,
        "failed": batch.failed,
        "results": batch.results,
        "durationMs": batch.duration_ms,
        "contents": contents,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteParams {
    pub files: Vec<BatchWriteFile>,
    #[serde(default)]
    pub default_tier: Option<String>,
    #[serde(default)]
    pub default_mode: Option<u32>,
    #[serde(default)]
    pub continue_on_error: Option<bool>,
    #[serde(default)]
    pub parallel_limit: Option<usize>,
}

pub async fn batch_write(kernel: Arc<Kernel>, namespace: String, params: BatchWriteParams, cancelled: Arc<AtomicBool>) -> Value {
    let start = std::time::Instant::now();
    let continue_on_error = params.continue_on_error.unwrap_or(true);
    let parallel_limit = params.parallel_limit.unwrap_or(5);
    let default_tier = params.default_tier.clone();
    let default_mode = params.default_mode;

    let ns = namespace.clone();
    let results = run_waves(params.files, parallel_limit, continue_on_error, cancelled, move |f: BatchWriteFile| {
        let kernel = Arc::clone(&kernel);
        let ns = ns.clone();
        let default_tier = default_tier.clone();
        async move {
            let full = path::with_namespace(&ns, &f.path);
            let data = match base64::engine::general_purpose::STANDARD.decode(&f.content) {
                Ok(d) => d,
                Err(e) => {
                    return BatchItemResult {
                        path: f.path,
                        success: false,
                        error: Some(format!("bad base64: {e}")),
                        code: Some("EINVAL".to_string()),
                        bytes: None,
                        tier: None,
                        checksum: None,
                    }
                }
            };
            let tier = parse_tier(f.tier.as_deref().or(default_tier.as_deref()));
            let len = data.len() as u64;
            let opts = WriteOptions { mode: f.mode.or(default_mode), flag: None, tier };
            match kernel.write_file(&full, data, opts).await {
                Ok(()) => BatchItemResult {
                    path: f.path,
                    success: true,
                    error: None,
                    code: None,
                    bytes: Some(len),
                    tier: tier.map(|t| t.as_str()),
                    checksum: None,
                },
                Err(e) => BatchItemResult {
                    path: f.path,
                    success: false,
                    error: Some(e.message.clone()),
                    code: Some(e.code.as_str().to_string()),
                    bytes: None,
                    tier: None,
                    checksum: None,
                },
            }
        }
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    serde_json::to_value(summarize(&results, duration_ms)).unwrap()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDeleteParams {
    pub paths: Vec<String>,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub force: Option<bool>,
    #[serde(default)]
    pub continue_on_error: Option<bool>,
}

pub async fn batch_delete(kernel: Arc<Kernel>, namespace: String, params: BatchDeleteParams, cancelled: Arc<AtomicBool>) -> Value {
    let start = std::time::Instant::now();
    let continue_on_error = params.continue_on_error.unwrap_or(true);
    let recursive = params.recursive.unwrap_or(false);
    let force = params.force.unwrap_or(false);

    let ns = namespace.clone();
    let results = run_waves(params.paths, 10, continue_on_error, cancelled, move |p: String| {
        let kernel = Arc::clone(&kernel);
        let ns = ns.clone();
        async move {
            let full = path::with_namespace(&ns, &p);
            match kernel.rm(&full, fsx_core::kernel::RmOptions { recursive, force }).await {
                Ok(()) => BatchItemResult { path: p, success: true, error: None, code: None, bytes: None, tier: None, checksum: None },
                Err(e) => BatchItemResult {
                    path: p,
                    success: false,
                    error: Some(e.message.clone()),
                    code: Some(e.code.as_str().to_string()),
                    bytes: None,
                    tier: None,
                    checksum: None,
                },
            }
        }
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    serde_json::to_value(summarize(&results, duration_ms)).unwrap()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatParams {
    pub paths: Vec<String>,
}

pub async fn batch_stat(kernel: Arc<Kernel>, namespace: String, params: BatchStatParams, cancelled: Arc<AtomicBool>) -> Value {
    let start = std::time::Instant::now();
    let stats: Arc<tokio::sync::Mutex<HashMap<String, Value>>> = Arc::new(tokio::sync::Mutex::new(HashMap::new()));
    let ns = namespace.clone();
    let stats_for_op = Arc::clone(&stats);

    let results = run_waves(params.paths, 10, true, cancelled, move |p: String| {
        let kernel = Arc::clone(&kernel);
        let ns = ns.clone();
        let stats = Arc::clone(&stats_for_op);
        async move {
            let full = path::with_namespace(&ns, &p);
            match kernel.stat(&full).await {
                Ok(st) => {
                    stats.lock().await.insert(p.clone(), serde_json::to_value(&st).unwrap());
                    BatchItemResult {
                        path: p,
                        success: true,
                        error: None,
                        code: None,
                        bytes: Some(st.size),
                        tier: st.tier.map(|t| t.as_str()),
                        checksum: None,
                    }
                }
                Err(e) => BatchItemResult {
                    path: p,
                    success: false,
                    error: Some(e.message.clone()),
                    code: Some(e.code.as_str().to_string()),
                    bytes: None,
                    tier: None,
                    checksum: None,
                },
            }
        }
    })
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let batch = summarize(&results, duration_ms);
    let stats = Arc::try_unwrap(stats).map(|m| m.into_inner()).unwrap_or_default();
    json!({
        "total": batch.total,
        "succeeded": batch.succeeded,
        "failed": batch.failed,
        "results": batch.results,
        "durationMs": batch.duration_ms,
        "stats": stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_core::kernel::{Kernel, KernelLimits};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;

    fn make_kernel() -> Arc<Kernel> {
        Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ))
    }

    #[tokio::test]
    async fn batch_write_then_read_preserves_order_and_counts() {
        let kernel = make_kernel();
        let files = vec![
            BatchWriteFile { path: "/a".to_string(), content: b64(b"1"), mode: None, tier: None },
            BatchWriteFile { path: "/b".to_string(), content: b64(b"2"), mode: None, tier: None },
        ];
        let result = batch_write(
            Arc::clone(&kernel),
            "default".to_string(),
            BatchWriteParams { files, default_tier: None, default_mode: None, continue_on_error: None, parallel_limit: None },
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(result["total"], 2);
        assert_eq!(result["succeeded"], 2);
        assert_eq!(result["results"][0]["path"], "/a");
        assert_eq!(result["results"][1]["path"], "/b");

        let read_result = batch_read(
            kernel,
            "default".to_string(),
            BatchReadParams { paths: vec!["/a".to_string(), "/b".to_string()], continue_on_error: None, parallel_limit: None },
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(read_result["contents"]["a"].is_null(), true); // keyed by full path, not basename
        assert_eq!(read_result["contents"]["/a"], b64(b"1"));
    }

    #[tokio::test]
    async fn batch_continue_on_error_records_failures_without_aborting() {
        let kernel = make_kernel();
        let result = batch_delete(
            kernel,
            "default".to_string(),
            BatchDeleteParams { paths: vec!["/missing1".to_string(), "/missing2".to_string()], recursive: None, force: None, continue_on_error: Some(true) },
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(result["total"], 2);
        assert_eq!(result["failed"], 2);
        assert_eq!(result["results"][0]["code"], "ENOENT");
        assert_eq!(result["results"][1]["code"], "ENOENT");
    }

    #[tokio::test]
    async fn pre_cancelled_flag_stops_batch_before_any_wave_runs() {
        let kernel = make_kernel();
        let files = vec![BatchWriteFile { path: "/a".to_string(), content: b64(b"1"), mode: None, tier: None }];
        let cancelled = Arc::new(AtomicBool::new(true));
        let result = batch_write(
            kernel,
            "default".to_string(),
            BatchWriteParams { files, default_tier: None, default_mode: None, continue_on_error: None, parallel_limit: None },
            cancelled,
        )
        .await;
        assert_eq!(result["total"], 0);
    }
}
