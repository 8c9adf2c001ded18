//! Tree-level conveniences layered on the kernel: recursive copy/move and
//! directory size accounting (spec §4.8 "Tree operations").

use serde_json::{json, Value};

use fsx_core::entry::EntryType;
use fsx_core::kernel::{CopyOptions, MkdirOptions, ReaddirOptions, ReaddirResult, RenameOptions};
use fsx_core::{path, ErrorCode, FsError, FsResult, Kernel};

pub async fn copy_tree(kernel: &Kernel, src: &str, dest: &str, overwrite: bool) -> FsResult<Value> {
    let mut files_copied = 0u64;
    let mut dirs_created = 0u64;
    copy_tree_inner(kernel, src, dest, overwrite, &mut files_copied, &mut dirs_created).await?;
    Ok(json!({ "filesCopied": files_copied, "dirsCreated": dirs_created }))
}

fn copy_tree_inner<'a>(
    kernel: &'a Kernel,
    src: &'a str,
    dest: &'a str,
    overwrite: bool,
    files_copied: &'a mut u64,
    dirs_created: &'a mut u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let st = kernel.stat(src).await?;
        if st.entry_type != EntryType::Directory {
            kernel.copy_file(src, dest, CopyOptions { overwrite }).await?;
            *files_copied += 1;
            return Ok(());
        }

        kernel.mkdir(dest, MkdirOptions { recursive: true, mode: None }).await?;
        *dirs_created += 1;

        let ReaddirResult::Dirents(entries) = kernel.readdir(src, ReaddirOptions { with_file_types: true, recursive: false }).await? else {
            unreachable!("with_file_types requests Dirents");
        };
        for entry in entries {
            let child_src = entry.path.clone();
            let child_dest = format!("{}/{}", dest.trim_end_matches('/'), entry.name);
            copy_tree_inner(kernel, &child_src, &child_dest, overwrite, files_copied, dirs_created).await?;
        }
        Ok(())
    })
}

/// Relocates a subtree. The kernel's `rename` already remaps every
/// descendant path for directories, so this is a thin, namespace-scoped
/// wrapper rather than a manual walk.
pub async fn move_tree(kernel: &Kernel, src: &str, dest: &str, overwrite: bool) -> FsResult<Value> {
    kernel.rename(src, dest, RenameOptions { overwrite }).await?;
    Ok(json!({ "moved": true }))
}

pub async fn dir_size(kernel: &Kernel, root: &str) -> FsResult<Value> {
    let mut total_size = 0u64;
    let mut file_count = 0u64;
    let mut dir_count = 0u64;
    dir_size_inner(kernel, root, &mut total_size, &mut file_count, &mut dir_count).await?;
    Ok(json!({ "totalSize": total_size, "fileCount": file_count, "dirCount": dir_count }))
}

fn dir_size_inner<'a>(
    kernel: &'a Kernel,
    root: &'a str,
    total_size: &'a mut u64,
    file_count: &'a mut u64,
    dir_count: &'a mut u64,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = FsResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let st = kernel.stat(root).await?;
        if st.entry_type != EntryType::Directory {
            *total_size += st.size;
            *file_count += 1;
            return Ok(());
        }
        *dir_count += 1;
        let ReaddirResult::Dirents(entries) = kernel.readdir(root, ReaddirOptions { with_file_types: true, recursive: false }).await? else {
            unreachable!("with_file_types requests Dirents");
        };
        for entry in entries {
            dir_size_inner(kernel, &entry.path, total_size, file_count, dir_count).await?;
        }
        Ok(())
    })
}

pub fn namespaced(namespace: &str, p: &str) -> String {
    path::with_namespace(namespace, p)
}

pub fn require_sha256(algorithm: &str) -> FsResult<()> {
    if algorithm != "sha256" {
        return Err(FsError::new(ErrorCode::EINVAL, format!("unsupported checksum algorithm: {algorithm}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsx_core::kernel::{Kernel, KernelLimits, WriteOptions};
    use fsx_core::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use fsx_core::WatchManager;
    use std::sync::Arc;

    fn make_kernel() -> Kernel {
        Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        )
    }

    #[tokio::test]
    async fn copy_tree_copies_nested_files_and_dirs() {
        let kernel = make_kernel();
        kernel.mkdir("/src/sub", fsx_core::kernel::MkdirOptions { recursive: true, mode: None }).await.unwrap();
        kernel.write_file("/src/a.txt", b"a".to_vec(), WriteOptions::default()).await.unwrap();
        kernel.write_file("/src/sub/b.txt", b"b".to_vec(), WriteOptions::default()).await.unwrap();

        let result = copy_tree(&kernel, "/src", "/dst", false).await.unwrap();
        assert_eq!(result["filesCopied"], 2);
        assert_eq!(result["dirsCreated"], 2);
        assert_eq!(kernel.read_file("/dst/sub/b.txt", None, None).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn dir_size_sums_nested_file_sizes() {
        let kernel = make_kernel();
        kernel.mkdir("/d/sub", fsx_core::kernel::MkdirOptions { recursive: true, mode: None }).await.unwrap();
        kernel.write_file("/d/a.txt", vec![0u8; 3], WriteOptions::default()).await.unwrap();
        kernel.write_file("/d/sub/b.txt", vec![0u8; 4], WriteOptions::default()).await.unwrap();

        let result = dir_size(&kernel, "/d").await.unwrap();
        assert_eq!(result["totalSize"], 7);
        assert_eq!(result["fileCount"], 2);
        assert_eq!(result["dirCount"], 2);
    }

    #[test]
    fn md5_is_rejected_as_unsupported() {
        assert!(require_sha256("md5").is_err());
        assert!(require_sha256("sha256").is_ok());
    }
}
