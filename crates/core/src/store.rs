//! Metadata & blob store interfaces (spec §4.2, C2/C3). The kernel is
//! generic over these traits; a namespace is just a key prefix applied by
//! the caller, never interpreted here.
//!
//! Contract: an absent key returns `Ok(None)`, never an error. The kernel
//! decides when absence should surface as a typed `ENOENT`.

use async_trait::async_trait;

use crate::entry::Entry;
use crate::error::FsResult;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, path: &str) -> FsResult<Option<Entry>>;
    async fn put(&self, path: &str, entry: Entry) -> FsResult<()>;
    async fn delete(&self, path: &str) -> FsResult<()>;
    async fn exists(&self, path: &str) -> FsResult<bool>;

    /// Immediate child names of `dir` (not full paths).
    async fn list_children(&self, dir: &str) -> FsResult<Vec<String>>;

    /// All descendant paths under `dir` (not including `dir` itself),
    /// in no particular order. Used by recursive rmdir/rm/readdir/copyTree.
    async fn list_descendants(&self, dir: &str) -> FsResult<Vec<String>>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, path: &str) -> FsResult<Option<Vec<u8>>>;
    async fn put(&self, path: &str, data: Vec<u8>, tier: crate::entry::Tier) -> FsResult<()>;
    async fn get_range(&self, path: &str, start: u64, end: Option<u64>) -> FsResult<Option<Vec<u8>>>;
    async fn head(&self, path: &str) -> FsResult<Option<(u64, crate::entry::Tier)>>;
    async fn copy(&self, src: &str, dest: &str) -> FsResult<()>;
    async fn delete(&self, path: &str) -> FsResult<()>;
    async fn get_tier(&self, path: &str) -> FsResult<Option<crate::entry::Tier>>;
    async fn set_tier(&self, path: &str, tier: crate::entry::Tier) -> FsResult<()>;
}

/// Reference in-memory implementations used by the server's default
/// configuration and by the test suite. Namespacing is applied by the
/// kernel via path prefixing, so a single instance serves all namespaces.
pub mod memory {
    use std::sync::atomic::{AtomicU64, Ordering};

    use dashmap::DashMap;

    use super::*;
    use crate::entry::Tier;

    #[derive(Default)]
    pub struct MemoryMetadataStore {
        entries: DashMap<String, Entry>,
    }

    impl MemoryMetadataStore {
        pub fn new() -> Self {
            Self { entries: DashMap::new() }
        }
    }

    #[async_trait]
    impl MetadataStore for MemoryMetadataStore {
        async fn get(&self, path: &str) -> FsResult<Option<Entry>> {
            Ok(self.entries.get(path).map(|e| e.clone()))
        }

        async fn put(&self, path: &str, entry: Entry) -> FsResult<()> {
            self.entries.insert(path.to_string(), entry);
            Ok(())
        }

        async fn delete(&self, path: &str) -> FsResult<()> {
            self.entries.remove(path);
            Ok(())
        }

        async fn exists(&self, path: &str) -> FsResult<bool> {
            Ok(self.entries.contains_key(path))
        }

        async fn list_children(&self, dir: &str) -> FsResult<Vec<String>> {
            let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
            let mut out = Vec::new();
            for item in self.entries.iter() {
                let path = item.key();
                if path == dir {
                    continue;
                }
                if let Some(rest) = path.strip_prefix(&prefix) {
                    if !rest.is_empty() && !rest.contains('/') {
                        out.push(rest.to_string());
                    }
                }
            }
            Ok(out)
        }

        async fn list_descendants(&self, dir: &str) -> FsResult<Vec<String>> {
            let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
            let mut out = Vec::new();
            for item in self.entries.iter() {
                let path = item.key();
                if path.starts_with(&prefix) {
                    out.push(path.clone());
                }
            }
            Ok(out)
        }
    }

    #[derive(Default)]
    pub struct MemoryBlobStore {
        blobs: DashMap<String, (Vec<u8>, Tier)>,
        #[allow(dead_code)]
        next_id: AtomicU64,
    }

    impl MemoryBlobStore {
        pub fn new() -> Self {
            Self { blobs: DashMap::new(), next_id: AtomicU64::new(0) }
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn get(&self, path: &str) -> FsResult<Option<Vec<u8>>> {
            Ok(self.blobs.get(path).map(|b| b.0.clone()))
        }

        async fn put(&self, path: &str, data: Vec<u8>, tier: Tier) -> FsResult<()> {
            self.blobs.insert(path.to_string(), (data, tier));
            Ok(())
        }

        async fn get_range(&self, path: &str, start: u64, end: Option<u64>) -> FsResult<Option<Vec<u8>>> {
            let Some(entry) = self.blobs.get(path) else { return Ok(None) };
            let data = &entry.0;
            let start = start.min(data.len() as u64) as usize;
            let end = end.map(|e| (e as usize).min(data.len())).unwrap_or(data.len());
            if start > end {
                return Ok(Some(Vec::new()));
            }
            Ok(Some(data[start..end].to_vec()))
        }

        async fn head(&self, path: &str) -> FsResult<Option<(u64, Tier)>> {
            Ok(self.blobs.get(path).map(|b| (b.0.len() as u64, b.1)))
        }

        async fn copy(&self, src: &str, dest: &str) -> FsResult<()> {
            if let Some(b) = self.blobs.get(src) {
                let value = b.clone();
                drop(b);
                self.blobs.insert(dest.to_string(), value);
            }
            Ok(())
        }

        async fn delete(&self, path: &str) -> FsResult<()> {
            self.blobs.remove(path);
            Ok(())
        }

        async fn get_tier(&self, path: &str) -> FsResult<Option<Tier>> {
            Ok(self.blobs.get(path).map(|b| b.1))
        }

        async fn set_tier(&self, path: &str, tier: Tier) -> FsResult<()> {
            if let Some(mut b) = self.blobs.get_mut(path) {
                b.1 = tier;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryBlobStore, MemoryMetadataStore};
    use super::*;
    use crate::entry::{Entry, Tier};

    #[tokio::test]
    async fn metadata_list_children_is_immediate_only() {
        let store = MemoryMetadataStore::new();
        store.put("/a", Entry::new_directory(0o755, 0, 0, 0)).await.unwrap();
        store.put("/a/b", Entry::new_directory(0o755, 0, 0, 0)).await.unwrap();
        store.put("/a/b/c", Entry::new_file(0o644, 0, 0, 0, Tier::Hot)).await.unwrap();

        let children = store.list_children("/a").await.unwrap();
        assert_eq!(children, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn blob_range_clamps_and_handles_start_gt_len() {
        let store = MemoryBlobStore::new();
        store.put("/f", b"hello world".to_vec(), Tier::Hot).await.unwrap();
        let range = store.get_range("/f", 6, None).await.unwrap().unwrap();
        assert_eq!(range, b"world");
        let empty = store.get_range("/f", 100, None).await.unwrap().unwrap();
        assert_eq!(empty, Vec::<u8>::new());
    }

    #[tokio::test]
    async fn absent_key_returns_none_not_error() {
        let store = MemoryMetadataStore::new();
        assert!(store.get("/nope").await.unwrap().is_none());
        let blobs = MemoryBlobStore::new();
        assert!(blobs.get("/nope").await.unwrap().is_none());
    }
}
