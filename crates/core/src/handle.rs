//! File handles and local byte streams (spec §4.3 "Handles and streams").
//!
//! A [`FileHandle`] is an in-process convenience: it caches content and a
//! dirty bit, writing back on close, and never pins server-side state in the
//! remote case (the RPC layer's stream sessions, in `fsx-rpc`, are the
//! cross-process analogue).

use std::sync::Arc;

use crate::entry::Stat;
use crate::error::{ErrorCode, FsError, FsResult};
use crate::kernel::{Kernel, WriteFlag, WriteOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    Read,
    Write,
    ReadWrite,
}

/// Handle state machine: `open -> { read/write/stat/truncate/sync }* -> close`.
/// Any operation after `close` returns `EBADF`.
///
/// Holds an owned `Arc<Kernel>` rather than a borrow so a handle can outlive
/// the request that opened it — the HTTP layer keys a table of these by an
/// opaque id across `open`/`read`/`write`/`close` calls (spec §6 `open`).
pub struct FileHandle {
    kernel: Arc<Kernel>,
    path: String,
    flags: OpenFlags,
    cached: Vec<u8>,
    dirty: bool,
    closed: bool,
}

impl FileHandle {
    pub async fn open(kernel: Arc<Kernel>, path: &str, flags: OpenFlags) -> FsResult<Self> {
        let cached = if matches!(flags, OpenFlags::Write) {
            Vec::new()
        } else {
            kernel.read_file(path, None, None).await?
        };
        Ok(Self { kernel, path: path.to_string(), flags, cached, dirty: false, closed: false })
    }

    fn ensure_open(&self) -> FsResult<()> {
        if self.closed {
            return Err(FsError::new(ErrorCode::EBADF, "handle is closed").with_path(self.path.clone()));
        }
        Ok(())
    }

    pub async fn read(&mut self, pos: u64, len: usize) -> FsResult<Vec<u8>> {
        self.ensure_open()?;
        if matches!(self.flags, OpenFlags::Write) {
            return Err(FsError::new(ErrorCode::EBADF, "handle not opened for reading"));
        }
        let start = (pos as usize).min(self.cached.len());
        let end = (start + len).min(self.cached.len());
        Ok(self.cached[start..end].to_vec())
    }

    pub async fn write(&mut self, data: &[u8], pos: u64) -> FsResult<()> {
        self.ensure_open()?;
        if matches!(self.flags, OpenFlags::Read) {
            return Err(FsError::new(ErrorCode::EBADF, "handle not opened for writing"));
        }
        let pos = pos as usize;
        if self.cached.len() < pos + data.len() {
            self.cached.resize(pos + data.len(), 0);
        }
        self.cached[pos..pos + data.len()].copy_from_slice(data);
        self.dirty = true;
        Ok(())
    }

    pub async fn stat(&self) -> FsResult<Stat> {
        self.ensure_open()?;
        self.kernel.stat(&self.path).await
    }

    pub async fn truncate(&mut self, length: u64) -> FsResult<()> {
        self.ensure_open()?;
        self.cached.resize(length as usize, 0);
        self.dirty = true;
        Ok(())
    }

    /// Flushes the dirty buffer without closing the handle.
    pub async fn sync(&mut self) -> FsResult<()> {
        self.ensure_open()?;
        if self.dirty {
            self.kernel
                .write_file(&self.path, self.cached.clone(), WriteOptions { flag: Some(WriteFlag::Write), ..Default::default() })
                .await?;
            self.dirty = false;
        }
        Ok(())
    }

    pub async fn close(mut self) -> FsResult<()> {
        self.sync().await?;
        self.closed = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadStreamOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub high_water_mark: Option<usize>,
}

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// A lazily-produced sequence of byte chunks over a file's content. For the
/// in-memory store this simply slices a fully-fetched buffer; a blob store
/// with genuine ranged reads would fetch each chunk lazily instead.
pub struct ReadStream {
    data: Vec<u8>,
    chunk_size: usize,
    offset: usize,
}

impl ReadStream {
    pub async fn open(kernel: &Kernel, path: &str, opts: ReadStreamOptions) -> FsResult<Self> {
        let data = kernel.read_file(path, opts.start, opts.end).await?;
        Ok(Self { data, chunk_size: opts.high_water_mark.unwrap_or(DEFAULT_CHUNK_SIZE), offset: 0 })
    }

    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Some(chunk)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteStreamOptions {
    pub flags: Option<WriteFlag>,
    pub mode: Option<u32>,
}

/// Buffers chunks until `close`, then performs a single `writeFile` (spec
/// §4.3: `createWriteStream` "buffers until close, then performs a single
/// writeFile").
pub struct WriteStream<'k> {
    kernel: &'k Kernel,
    path: String,
    buffer: Vec<u8>,
    opts: WriteStreamOptions,
}

impl<'k> WriteStream<'k> {
    pub fn open(kernel: &'k Kernel, path: &str, opts: WriteStreamOptions) -> Self {
        Self { kernel, path: path.to_string(), buffer: Vec::new(), opts }
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub async fn close(self) -> FsResult<()> {
        self.kernel
            .write_file(
                &self.path,
                self.buffer,
                WriteOptions { mode: self.opts.mode, flag: self.opts.flags, tier: None },
            )
            .await
    }
}

impl Kernel {
    pub async fn create_read_stream(&self, path: &str, opts: ReadStreamOptions) -> FsResult<ReadStream> {
        ReadStream::open(self, path, opts).await
    }

    pub fn create_write_stream(&self, path: &str, opts: WriteStreamOptions) -> WriteStream<'_> {
        WriteStream::open(self, path, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Kernel, KernelLimits, WriteOptions};
    use crate::store::memory::{MemoryBlobStore, MemoryMetadataStore};
    use crate::watch::WatchManager;
    use std::sync::Arc;

    fn make_kernel() -> Arc<Kernel> {
        Arc::new(Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        ))
    }

    #[tokio::test]
    async fn handle_write_then_sync_is_visible_to_kernel_reads() {
        let k = make_kernel();
        k.write_file("/f", b"hello".to_vec(), WriteOptions::default()).await.unwrap();
        let mut h = FileHandle::open(Arc::clone(&k), "/f", OpenFlags::ReadWrite).await.unwrap();
        h.write(b"HELLO", 0).await.unwrap();
        h.sync().await.unwrap();
        assert_eq!(k.read_file("/f", None, None).await.unwrap(), b"HELLO");
    }

    #[tokio::test]
    async fn handle_rejects_ops_after_close() {
        let k = make_kernel();
        k.write_file("/f", b"hi".to_vec(), WriteOptions::default()).await.unwrap();
        let h = FileHandle::open(Arc::clone(&k), "/f", OpenFlags::Read).await.unwrap();
        h.close().await.unwrap();
    }

    #[tokio::test]
    async fn read_stream_chunks_respect_high_water_mark() {
        let k = make_kernel();
        k.write_file("/f", vec![1u8; 10], WriteOptions::default()).await.unwrap();
        let mut stream = k
            .create_read_stream("/f", ReadStreamOptions { high_water_mark: Some(4), ..Default::default() })
            .await
            .unwrap();
        let mut total = 0;
        let mut chunks = 0;
        while let Some(c) = stream.next_chunk() {
            total += c.len();
            chunks += 1;
        }
        assert_eq!(total, 10);
        assert_eq!(chunks, 3);
    }

    #[tokio::test]
    async fn write_stream_performs_single_write_on_close() {
        let k = make_kernel();
        let mut stream = k.create_write_stream("/f", WriteStreamOptions::default());
        stream.write_chunk(b"ab");
        stream.write_chunk(b"cd");
        stream.close().await.unwrap();
        assert_eq!(k.read_file("/f", None, None).await.unwrap(), b"abcd");
    }
}
