//! Chunked read/write stream sessions (spec §4.8 "Streams"). Sessions are
//! held server-side in a [`DashMap`], pruned by an idle-TTL sweep modeled on
//! the MCP session pruning task in the server binary's startup routine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use dashmap::DashMap;
use fsx_core::kernel::WriteOptions;
use fsx_core::{path, ErrorCode, FsError, FsResult, Kernel};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(300);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);
/// RPC stream chunk size default (64 KiB; local streams default to 16 KiB).
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

struct ReadSession {
    data: Vec<u8>,
    offset: usize,
    chunk_size: usize,
    last_activity: Instant,
}

struct WriteSession {
    path: String,
    buffer: Vec<u8>,
    hasher: Sha256,
    in_flight: AtomicBool,
    last_activity: Instant,
}

/// Server-side table of open stream sessions, keyed by an opaque session id.
pub struct StreamRegistry {
    reads: DashMap<String, ReadSession>,
    writes: DashMap<String, WriteSession>,
    idle_ttl: Duration,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self { reads: DashMap::new(), writes: DashMap::new(), idle_ttl }
    }

    /// Spawns the idle-session pruning sweep. Mirrors the server's MCP
    /// session cleanup task: a fixed-interval tick that retains only
    /// sessions touched within `idle_ttl`.
    pub fn spawn_pruner(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                let cutoff = Instant::now() - registry.idle_ttl;
                registry.reads.retain(|_, s| s.last_activity > cutoff);
                registry.writes.retain(|_, s| s.last_activity > cutoff);
            }
        });
    }

    pub async fn start_read(
        &self,
        kernel: &Kernel,
        namespace: &str,
        file_path: &str,
        chunk_size: Option<usize>,
    ) -> FsResult<(String, u64)> {
        let full = path::with_namespace(namespace, file_path);
        let data = kernel.read_file(&full, None, None).await?;
        let total = data.len() as u64;
        let id = Uuid::new_v4().to_string();
        self.reads.insert(
            id.clone(),
            ReadSession { data, offset: 0, chunk_size: chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE), last_activity: Instant::now() },
        );
        Ok((id, total))
    }

    pub fn read_chunk(&self, session_id: &str) -> FsResult<(Vec<u8>, bool)> {
        let mut session = self
            .reads
            .get_mut(session_id)
            .ok_or_else(|| FsError::new(ErrorCode::ENOENT, "unknown stream session"))?;
        session.last_activity = Instant::now();
        let start = session.offset;
        let end = (start + session.chunk_size).min(session.data.len());
        let chunk = session.data[start..end].to_vec();
        session.offset = end;
        let done = session.offset >= session.data.len();
        Ok((chunk, done))
    }

    pub fn end_read(&self, session_id: &str) {
        self.reads.remove(session_id);
    }

    pub fn abort_read(&self, session_id: &str) {
        self.reads.remove(session_id);
    }

    pub fn start_write(&self, file_path: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.writes.insert(
            id.clone(),
            WriteSession {
                path: file_path.to_string(),
                buffer: Vec::new(),
                hasher: Sha256::new(),
                in_flight: AtomicBool::new(false),
                last_activity: Instant::now(),
            },
        );
        id
    }

    /// Appends a chunk to a write session. Rejects concurrent chunk
    /// submissions on the same session with `EBUSY`.
    pub fn write_chunk(&self, session_id: &str, data: &[u8]) -> FsResult<u64> {
        let mut session = self
            .writes
            .get_mut(session_id)
            .ok_or_else(|| FsError::new(ErrorCode::ENOENT, "unknown stream session"))?;
        if session.in_flight.swap(true, Ordering::SeqCst) {
            return Err(FsError::new(ErrorCode::EBUSY, "a chunk is already in flight for this session"));
        }
        session.buffer.extend_from_slice(data);
        session.hasher.update(data);
        session.last_activity = Instant::now();
        let total = session.buffer.len() as u64;
        session.in_flight.store(false, Ordering::SeqCst);
        Ok(total)
    }

    /// Flushes the buffered content as a single `writeFile` call, per the
    /// spec's stream-write contract, and returns the SHA-256 checksum.
    pub async fn end_write(
        &self,
        kernel: &Kernel,
        namespace: &str,
        session_id: &str,
        opts: WriteOptions,
    ) -> FsResult<(u64, String)> {
        let (_, session) = self
            .writes
            .remove(session_id)
            .ok_or_else(|| FsError::new(ErrorCode::ENOENT, "unknown stream session"))?;
        let full = path::with_namespace(namespace, &session.path);
        let len = session.buffer.len() as u64;
        let checksum = format!("{:x}", session.hasher.finalize());
        kernel.write_file(&full, session.buffer, opts).await?;
        Ok((len, checksum))
    }

    pub fn abort_write(&self, session_id: &str) {
        self.writes.remove(session_id);
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn b64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn b64_decode(data: &str) -> FsResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| FsError::new(ErrorCode::EINVAL, format!("bad base64: {e}")))
}

/// Decodes a stream chunk's `data` field, tolerating three historical wire
/// shapes: a base64 string, a JSON array of byte numbers, and an object with
/// numeric-string keys (`{"0": 104, "1": 105, ...}`) produced by some JSON
/// serializers for byte buffers.
pub fn decode_chunk_bytes(value: &serde_json::Value) -> FsResult<Vec<u8>> {
    match value {
        serde_json::Value::String(s) => b64_decode(s),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| FsError::new(ErrorCode::EINVAL, "chunk array must contain byte values 0-255")),
        serde_json::Value::Object(map) => {
            let mut indexed: Vec<(usize, u8)> = Vec::with_capacity(map.len());
            for (k, v) in map {
                let idx: usize = k
                    .parse()
                    .map_err(|_| FsError::new(ErrorCode::EINVAL, "chunk object keys must be numeric strings"))?;
                let byte = v
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| FsError::new(ErrorCode::EINVAL, "chunk object values must be byte values 0-255"))?;
                indexed.push((idx, byte));
            }
            indexed.sort_by_key(|(idx, _)| *idx);
            Ok(indexed.into_iter().map(|(_, b)| b).collect())
        }
        _ => Err(FsError::new(ErrorCode::EINVAL, "chunk data must be a base64 string, byte array, or indexed byte object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_core::kernel::{Kernel, KernelLimits};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;

    fn make_kernel() -> Kernel {
        Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        )
    }

    #[tokio::test]
    async fn read_stream_chunks_through_to_completion() {
        let kernel = make_kernel();
        kernel.write_file("/__ns_default__/big.txt", vec![7u8; 10], WriteOptions::default()).await.unwrap();
        let registry = StreamRegistry::new();
        let (id, total) = registry.start_read(&kernel, "default", "/big.txt", Some(4)).await.unwrap();
        assert_eq!(total, 10);
        let (c1, done1) = registry.read_chunk(&id).unwrap();
        assert_eq!(c1.len(), 4);
        assert!(!done1);
        let (_c2, _done2) = registry.read_chunk(&id).unwrap();
        let (c3, done3) = registry.read_chunk(&id).unwrap();
        assert_eq!(c3.len(), 2);
        assert!(done3);
        registry.end_read(&id);
        assert!(registry.read_chunk(&id).is_err());
    }

    #[tokio::test]
    async fn write_stream_checksum_matches_sha256_of_full_content() {
        let kernel = make_kernel();
        let registry = StreamRegistry::new();
        let id = registry.start_write("/out.txt");
        registry.write_chunk(&id, b"hello ").unwrap();
        registry.write_chunk(&id, b"world").unwrap();
        let (len, checksum) = registry.end_write(&kernel, "default", &id, WriteOptions::default()).await.unwrap();
        assert_eq!(len, 11);
        let mut hasher = Sha256::new();
        hasher.update(b"hello world");
        assert_eq!(checksum, format!("{:x}", hasher.finalize()));

        let data = kernel.read_file("/__ns_default__/out.txt", None, None).await.unwrap();
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn unknown_session_returns_enoent() {
        let registry = StreamRegistry::new();
        assert!(registry.read_chunk("nope").is_err());
        assert!(registry.write_chunk("nope", b"x").is_err());
    }

    #[test]
    fn decode_chunk_bytes_accepts_legacy_shapes() {
        let b64 = serde_json::Value::String(b64_encode(b"hi"));
        assert_eq!(decode_chunk_bytes(&b64).unwrap(), b"hi");

        let arr = serde_json::json!([104, 105]);
        assert_eq!(decode_chunk_bytes(&arr).unwrap(), b"hi");

        let obj = serde_json::json!({"1": 105, "0": 104});
        assert_eq!(decode_chunk_bytes(&obj).unwrap(), b"hi");

        assert!(decode_chunk_bytes(&serde_json::json!(42)).is_err());
    }
}
