//! Content checksums (spec §4.8 "checksum" / "verify"). SHA-256 only — MD5
//! is explicitly unsupported per spec §9.

use sha2::{Digest, Sha256};

use fsx_core::{ErrorCode, FsError, FsResult, Kernel};

use crate::tree::require_sha256;

pub async fn checksum(kernel: &Kernel, full_path: &str, algorithm: &str) -> FsResult<String> {
    require_sha256(algorithm)?;
    let data = kernel.read_file(full_path, None, None).await?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(format!("{:x}", hasher.finalize()))
}

pub async fn verify(kernel: &Kernel, full_path: &str, expected: &str, algorithm: &str) -> FsResult<bool> {
    let actual = checksum(kernel, full_path, algorithm).await?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

pub fn unsupported_algorithm(algorithm: &str) -> FsError {
    FsError::new(ErrorCode::EINVAL, format!("unsupported checksum algorithm: {algorithm}"))
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
    async fn checksum_matches_known_sha256() {
        let kernel = make_kernel();
        kernel.write_file("/f.txt", b"abc".to_vec(), WriteOptions::default()).await.unwrap();
        let sum = checksum(&kernel, "/f.txt", "sha256").await.unwrap();
        assert_eq!(sum, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[tokio::test]
    async fn verify_detects_mismatch() {
        let kernel = make_kernel();
        kernel.write_file("/f.txt", b"abc".to_vec(), WriteOptions::default()).await.unwrap();
        assert!(verify(&kernel, "/f.txt", "deadbeef", "sha256").await.unwrap() == false);
    }

    #[tokio::test]
    async fn md5_algorithm_is_rejected() {
        let kernel = make_kernel();
        kernel.write_file("/f.txt", b"abc".to_vec(), WriteOptions::default()).await.unwrap();
        let err = checksum(&kernel, "/f.txt", "md5").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EINVAL);
    }
}
