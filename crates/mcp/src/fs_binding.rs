//! The `fs` capability binding exposed to the `do` tool's sandbox (spec
//! §4.9 "The `fs` binding"). Thin, permission-checked adapters over the
//! kernel: every call is checked against the caller's declared permissions
//! before it touches storage, raising `EACCES` on violation.

use std::sync::Arc;

use serde_json::{json, Value};

use fsx_core::entry::EntryType;
use fsx_core::kernel::{CopyOptions, MkdirOptions, ReaddirOptions, ReaddirResult, RenameOptions, WriteOptions};
use fsx_core::{path, ErrorCode, FsError, FsResult, Kernel};

/// Permissions granted to one `do` invocation (spec §4.9: `allowWrite`,
/// `allowDelete`, `allowedPaths[]`).
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    pub allow_write: bool,
    pub allow_delete: bool,
    pub allowed_paths: Vec<String>,
}

impl Permissions {
    fn check_path(&self, p: &str) -> FsResult<()> {
        if self.allowed_paths.is_empty() {
            return Ok(());
        }
        if self.allowed_paths.iter().any(|allowed| p == allowed || p.starts_with(&format!("{}/", allowed.trim_end_matches('/')))) {
            return Ok(());
        }
        Err(FsError::new(ErrorCode::EACCES, format!("path not in allowedPaths: {p}")))
    }

    fn check_write(&self, p: &str) -> FsResult<()> {
        self.check_path(p)?;
        if !self.allow_write {
            return Err(FsError::new(ErrorCode::EACCES, "write not permitted for this invocation"));
        }
        Ok(())
    }

    fn check_delete(&self, p: &str) -> FsResult<()> {
        self.check_path(p)?;
        if !self.allow_delete {
            return Err(FsError::new(ErrorCode::EACCES, "delete not permitted for this invocation"));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct FsBinding {
    kernel: Arc<Kernel>,
    namespace: String,
    permissions: Permissions,
}

impl FsBinding {
    pub fn new(kernel: Arc<Kernel>, namespace: String, permissions: Permissions) -> Self {
        Self { kernel, namespace, permissions }
    }

    fn full(&self, p: &str) -> String {
        path::with_namespace(&self.namespace, p)
    }

    pub async fn read(&self, p: &str) -> FsResult<Vec<u8>> {
        self.permissions.check_path(p)?;
        self.kernel.read_file(&self.full(p), None, None).await
    }

    pub async fn write(&self, p: &str, data: Vec<u8>) -> FsResult<()> {
        self.permissions.check_write(p)?;
        self.kernel.write_file(&self.full(p), data, WriteOptions::default()).await
    }

    pub async fn append(&self, p: &str, data: Vec<u8>) -> FsResult<()> {
        self.permissions.check_write(p)?;
        self.kernel.append_file(&self.full(p), data).await
    }

    pub async fn delete(&self, p: &str) -> FsResult<()> {
        self.permissions.check_delete(p)?;
        self.kernel.rm(&self.full(p), fsx_core::kernel::RmOptions { recursive: true, force: false }).await
    }

    pub async fn move_(&self, src: &str, dest: &str) -> FsResult<()> {
        self.permissions.check_write(src)?;
        self.permissions.check_write(dest)?;
        self.kernel.rename(&self.full(src), &self.full(dest), RenameOptions { overwrite: false }).await
    }

    pub async fn copy(&self, src: &str, dest: &str) -> FsResult<()> {
        self.permissions.check_path(src)?;
        self.permissions.check_write(dest)?;
        self.kernel.copy_file(&self.full(src), &self.full(dest), CopyOptions { overwrite: false }).await
    }

    pub async fn mkdir(&self, p: &str) -> FsResult<()> {
        self.permissions.check_write(p)?;
        self.kernel.mkdir(&self.full(p), MkdirOptions { recursive: true, mode: None }).await
    }

    pub async fn stat(&self, p: &str) -> FsResult<Value> {
        self.permissions.check_path(p)?;
        let st = self.kernel.stat(&self.full(p)).await?;
        serde_json::to_value(&st).map_err(|e| FsError::new(ErrorCode::EIO, e.to_string()))
    }

    pub async fn list(&self, p: &str) -> FsResult<Vec<String>> {
        self.permissions.check_path(p)?;
        match self.kernel.readdir(&self.full(p), ReaddirOptions { with_file_types: false, recursive: false }).await? {
            ReaddirResult::Names(names) => Ok(names),
            ReaddirResult::Dirents(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
        }
    }

    pub async fn tree(&self, p: &str, max_depth: usize) -> FsResult<Value> {
        self.permissions.check_path(p)?;
        Box::pin(self.tree_inner(p, 0, max_depth)).await
    }

    fn tree_inner<'a>(&'a self, p: &'a str, depth: usize, max_depth: usize) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<Value>> + Send + 'a>> {
        Box::pin(async move {
            let full = self.full(p);
            let st = self.kernel.stat(&full).await?;
            if st.entry_type != EntryType::Directory || depth >= max_depth {
                return Ok(json!({ "name": p, "type": st.entry_type.as_str() }));
            }
            let ReaddirResult::Dirents(entries) = self.kernel.readdir(&full, ReaddirOptions { with_file_types: true, recursive: false }).await? else {
                unreachable!("with_file_types requests Dirents");
            };
            let mut children = Vec::with_capacity(entries.len());
            for entry in entries {
                let child_p = format!("{}/{}", p.trim_end_matches('/'), entry.name);
                children.push(self.tree_inner(&child_p, depth + 1, max_depth).await?);
            }
            Ok(json!({ "name": p, "type": "directory", "children": children }))
        })
    }

    pub async fn search(&self, pattern: &str) -> FsResult<Vec<String>> {
        self.permissions.check_path("/")?;
        let matcher = fsx_core::glob::GlobMatcher::compile(pattern).map_err(|e| FsError::new(ErrorCode::EINVAL, e.to_string()))?;
        let mut matches = Vec::new();
        self.search_inner("/", &matcher, &mut matches).await?;
        Ok(matches)
    }

    fn search_inner<'a>(
        &'a self,
        dir: &'a str,
        matcher: &'a fsx_core::glob::GlobMatcher,
        matches: &'a mut Vec<String>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let full = self.full(dir);
            let ReaddirResult::Dirents(entries) = self.kernel.readdir(&full, ReaddirOptions { with_file_types: true, recursive: false }).await? else {
                unreachable!("with_file_types requests Dirents");
            };
            for entry in entries {
                let child = format!("{}/{}", dir.trim_end_matches('/'), entry.name);
                if matcher.is_match(child.trim_start_matches('/')) {
                    matches.push(child.clone());
                }
                if entry.entry_type == EntryType::Directory {
                    self.search_inner(&child, matcher, matches).await?;
                }
            }
            Ok(())
        })
    }

    pub async fn exists(&self, p: &str) -> FsResult<bool> {
        self.permissions.check_path(p)?;
        self.kernel.exists(&self.full(p)).await
    }
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
    async fn write_rejected_without_allow_write() {
        let kernel = make_kernel();
        let fs = FsBinding::new(kernel, "default".to_string(), Permissions::default());
        let err = fs.write("/a.txt", b"hi".to_vec()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EACCES);
    }

    #[tokio::test]
    async fn write_allowed_within_allowed_paths() {
        let kernel = make_kernel();
        let perms = Permissions { allow_write: true, allow_delete: false, allowed_paths: vec!["/sandbox".to_string()] };
        let fs = FsBinding::new(kernel, "default".to_string(), perms);
        fs.write("/sandbox/a.txt", b"hi".to_vec()).await.unwrap();
        let err = fs.write("/other/a.txt", b"hi".to_vec()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EACCES);
    }

    #[tokio::test]
    async fn delete_requires_allow_delete() {
        let kernel = make_kernel();
        let perms = Permissions { allow_write: true, allow_delete: false, allowed_paths: vec![] };
        let fs = FsBinding::new(kernel.clone(), "default".to_string(), perms);
        fs.write("/a.txt", b"hi".to_vec()).await.unwrap();
        let err = fs.delete("/a.txt").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EACCES);
    }

    #[tokio::test]
    async fn tree_renders_nested_structure_to_depth() {
        let kernel = make_kernel();
        kernel.mkdir("/__ns_default__/d/sub", MkdirOptions { recursive: true, mode: None }).await.unwrap();
        kernel.write_file("/__ns_default__/d/sub/f.txt", b"x".to_vec(), WriteOptions::default()).await.unwrap();
        let fs = FsBinding::new(kernel, "default".to_string(), Permissions::default());
        let tree = fs.tree("/d", 2).await.unwrap();
        assert_eq!(tree["type"], "directory");
        assert_eq!(tree["children"][0]["name"], "/d/sub");
    }
}
