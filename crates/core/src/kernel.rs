//! The FS kernel (spec §4.3, C4): the operation set that everything else
//! (HTTP, RPC, MCP tools) is a thin adapter over.
//!
//! Every path argument is canonicalized first; `isPathTraversal` is checked
//! before any store access (spec invariant 8). Namespace is applied by the
//! caller prefixing paths before they reach the kernel — the kernel itself
//! has no notion of namespace, which is what makes isolation (invariant 9)
//! structurally guaranteed rather than policy-enforced.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entry::{Dirent, Entry, EntryType, Stat, Tier};
use crate::error::{ErrorCode, FsError, FsResult};
use crate::path;
use crate::store::{BlobStore, MetadataStore};
use crate::watch::{WatchEvent, WatchManager};

const MAX_SYMLINK_HOPS: u32 = 40;

#[derive(Debug, Clone, Copy)]
pub struct KernelLimits {
    pub max_file_size: u64,
    pub max_path_length: usize,
    pub hot_max_size: u64,
    pub warm_enabled: bool,
    pub cold_enabled: bool,
}

impl Default for KernelLimits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            max_path_length: 4096,
            hot_max_size: 1024 * 1024,
            warm_enabled: true,
            cold_enabled: true,
        }
    }
}

/// The uid/gid the engine trusts from the request context (spec §4.3
/// `access`: "engine trusts uid/gid supplied in the request context").
#[derive(Debug, Clone, Copy, Default)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFlag {
    Write,
    WriteExclusive,
    Append,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub mode: Option<u32>,
    pub flag: Option<WriteFlag>,
    pub tier: Option<Tier>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MkdirOptions {
    pub recursive: bool,
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RmdirOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RmOptions {
    pub recursive: bool,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenameOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    pub overwrite: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReaddirOptions {
    pub with_file_types: bool,
    pub recursive: bool,
}

pub enum ReaddirResult {
    Names(Vec<String>),
    Dirents(Vec<Dirent>),
}

fn now_ms() -> i64 {
    // The kernel is wired to a caller-provided clock at the edges (HTTP/RPC
    // layers stamp `timestamp` on the request); internal mutation points use
    // a monotonically increasing logical clock seeded from wall time at
    // construction, since `Kernel` itself must stay free of a hard
    // `SystemTime::now()` dependency for deterministic testing.
    static CLOCK: AtomicI64 = AtomicI64::new(0);
    CLOCK.fetch_add(1, Ordering::SeqCst)
}

fn path_to_ino(path: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

pub struct Kernel {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    pub watch: Arc<WatchManager>,
    limits: KernelLimits,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Remaining alias count per `link_id` (spec §3 invariant 5). Entries
    /// created by `link()` share an id here instead of sharing physical
    /// storage, since the blob store is keyed by path, not content.
    link_counts: DashMap<String, u32>,
}

impl Kernel {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        watch: Arc<WatchManager>,
        limits: KernelLimits,
    ) -> Self {
        Self { metadata, blobs, watch, limits, locks: DashMap::new(), link_counts: DashMap::new() }
    }

    fn check_path(&self, p: &str) -> FsResult<String> {
        if path::is_path_traversal(p) {
            return Err(FsError::new(ErrorCode::EACCES, "path traversal rejected").with_path(p));
        }
        let canon = path::canonicalize(p);
        if canon.len() > self.limits.max_path_length {
            return Err(FsError::enametoolong(canon));
        }
        Ok(canon)
    }

    async fn lock_path(&self, path: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    fn root_entry() -> Entry {
        Entry::new_directory(0o755, 0, 0, 0)
    }

    /// Walks `path` segment by segment, following symlinks at every
    /// intermediate segment and, when `follow_terminal` is true, at the
    /// final segment too. Bounded by `MAX_SYMLINK_HOPS` total hops across the
    /// whole resolution (spec invariant 7).
    async fn resolve(&self, path: &str, follow_terminal: bool) -> FsResult<(String, Entry)> {
        let canon = self.check_path(path)?;
        if canon == "/" {
            return Ok(("/".to_string(), Self::root_entry()));
        }
        let segments: Vec<&str> =
            canon.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();

        let mut current = "/".to_string();
        let mut entry = Self::root_entry();
        let mut hops = 0u32;

        for (i, seg) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            if !entry.is_directory() {
                return Err(FsError::enotdir(current));
            }
            let mut next_path = path::join(&current, seg);
            loop {
                let next_entry = self
                    .metadata
                    .get(&next_path)
                    .await?
                    .ok_or_else(|| FsError::enoent(next_path.clone()))?;
                if next_entry.is_symbolic_link() && (!is_last || follow_terminal) {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(FsError::eloop(next_path));
                    }
                    let target = next_entry.link_target.clone().unwrap_or_default();
                    next_path = if target.starts_with('/') {
                        path::canonicalize(&target)
                    } else {
                        path::canonicalize(&path::join(&path::parent(&next_path), &target))
                    };
                    continue;
                }
                entry = next_entry;
                current = next_path;
                break;
            }
        }
        Ok((current, entry))
    }

    fn pick_tier(&self, size: u64, requested: Option<Tier>) -> FsResult<Tier> {
        if let Some(t) = requested {
            match t {
                Tier::Warm if !self.limits.warm_enabled => {
                    return Err(FsError::einval("warm tier disabled"))
                }
                Tier::Cold if !self.limits.cold_enabled => {
                    return Err(FsError::einval("cold tier disabled"))
                }
                _ => {}
            }
            return Ok(t);
        }
        if size <= self.limits.hot_max_size {
            Ok(Tier::Hot)
        } else if self.limits.warm_enabled {
            Ok(Tier::Warm)
        } else if self.limits.cold_enabled {
            Ok(Tier::Cold)
        } else {
            Ok(Tier::Hot)
        }
    }

    // ---- Files ----------------------------------------------------------

    pub async fn read_file(&self, p: &str, start: Option<u64>, end: Option<u64>) -> FsResult<Vec<u8>> {
        let (canon, entry) = self.resolve(p, true).await?;
        if entry.is_directory() {
            return Err(FsError::eisdir(canon));
        }
        if !entry.is_file() {
            return Err(FsError::einval(format!("not a regular file: {canon}")));
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(FsError::einval("range start exceeds end"));
            }
        }
        let data = match (start, end) {
            (Some(s), e) => self.blobs.get_range(&canon, s, e).await?.unwrap_or_default(),
            (None, _) => self.blobs.get(&canon).await?.unwrap_or_default(),
        };
        Ok(data)
    }

    pub async fn write_file(&self, p: &str, data: Vec<u8>, opts: WriteOptions) -> FsResult<()> {
        let canon = self.check_path(p)?;
        if data.len() as u64 > self.limits.max_file_size {
            return Err(FsError::new(ErrorCode::ENOSPC, "file exceeds maxFileSize").with_path(canon));
        }
        let _guard = self.lock_path(&canon).await;

        let parent = path::parent(&canon);
        if parent != "/" {
            let parent_entry = self.metadata.get(&parent).await?;
            match parent_entry {
                Some(e) if e.is_directory() => {}
                Some(_) => return Err(FsError::enotdir(parent)),
                None => return Err(FsError::enoent(parent)),
            }
        }

        let flag = opts.flag.unwrap_or(WriteFlag::Write);
        let existing = self.metadata.get(&canon).await?;

        if let Some(ref e) = existing {
            if e.is_directory() {
                return Err(FsError::eisdir(canon));
            }
            if flag == WriteFlag::WriteExclusive {
                return Err(FsError::eexist(canon));
            }
        }

        let now = now_ms();
        let final_bytes = if flag == WriteFlag::Append {
            let mut prior = self.blobs.get(&canon).await?.unwrap_or_default();
            prior.extend_from_slice(&data);
            prior
        } else {
            data
        };
        let tier = self.pick_tier(final_bytes.len() as u64, opts.tier)?;
        let size = final_bytes.len() as u64;
        self.blobs.put(&canon, final_bytes, tier).await?;

        let created = existing.is_none();
        let mut entry = existing.unwrap_or_else(|| {
            Entry::new_file(opts.mode.unwrap_or(crate::mode::DEFAULT_FILE_MODE), 0, 0, now, tier)
        });
        entry.size = size;
        entry.mtime = now;
        entry.ctime = now;
        entry.tier = Some(tier);
        if created {
            entry.birthtime = now;
        }
        self.metadata.put(&canon, entry).await?;

        self.watch.emit(if created { WatchEvent::Rename } else { WatchEvent::Change }, &canon);
        Ok(())
    }

    pub async fn append_file(&self, p: &str, data: Vec<u8>) -> FsResult<()> {
        self.write_file(p, data, WriteOptions { flag: Some(WriteFlag::Append), ..Default::default() })
            .await
    }

    pub async fn unlink(&self, p: &str) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let _guard = self.lock_path(&canon).await;
        let entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        if entry.is_directory() {
            return Err(FsError::eisdir(canon));
        }
        self.metadata.delete(&canon).await?;
        self.blobs.delete(&canon).await?;
        if let Some(link_id) = &entry.link_id {
            if let Some(mut remaining) = self.link_counts.get_mut(link_id) {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    drop(remaining);
                    self.link_counts.remove(link_id);
                }
            }
        }
        self.watch.emit(WatchEvent::Rename, &canon);
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str, opts: RenameOptions) -> FsResult<()> {
        let old_canon = self.check_path(old)?;
        let new_canon = self.check_path(new)?;
        let _guard_old = self.lock_path(&old_canon).await;
        let _guard_new = self.lock_path(&new_canon).await;

        let entry = self.metadata.get(&old_canon).await?.ok_or_else(|| FsError::enoent(old_canon.clone()))?;
        if let Some(existing) = self.metadata.get(&new_canon).await? {
            if !opts.overwrite {
                return Err(FsError::eexist(new_canon));
            }
            if existing.is_directory() && !self.metadata.list_children(&new_canon).await?.is_empty() {
                return Err(FsError::enotempty(new_canon));
            }
        }

        if entry.is_directory() {
            let descendants = self.metadata.list_descendants(&old_canon).await?;
            for desc in descendants {
                if let Some(rest) = desc.strip_prefix(&old_canon) {
                    let dest = format!("{new_canon}{rest}");
                    if let Some(desc_entry) = self.metadata.get(&desc).await? {
                        self.metadata.put(&dest, desc_entry).await?;
                        self.metadata.delete(&desc).await?;
                        if self.blobs.head(&desc).await?.is_some() {
                            self.blobs.copy(&desc, &dest).await?;
                            self.blobs.delete(&desc).await?;
                        }
                    }
                }
            }
        } else if self.blobs.head(&old_canon).await?.is_some() {
            self.blobs.copy(&old_canon, &new_canon).await?;
            self.blobs.delete(&old_canon).await?;
        }

        self.metadata.put(&new_canon, entry).await?;
        self.metadata.delete(&old_canon).await?;

        self.watch.emit(WatchEvent::Rename, &old_canon);
        self.watch.emit(WatchEvent::Rename, &new_canon);
        Ok(())
    }

    pub async fn copy_file(&self, src: &str, dest: &str, opts: CopyOptions) -> FsResult<()> {
        let src_canon = self.check_path(src)?;
        let dest_canon = self.check_path(dest)?;
        let (src_resolved, entry) = self.resolve(&src_canon, true).await?;
        if entry.is_directory() {
            return Err(FsError::eisdir(src_canon));
        }
        if !opts.overwrite && self.metadata.exists(&dest_canon).await? {
            return Err(FsError::eexist(dest_canon));
        }
        let now = now_ms();
        let data = self.blobs.get(&src_resolved).await?.unwrap_or_default();
        let tier = entry.tier.unwrap_or(Tier::Hot);
        self.blobs.put(&dest_canon, data.clone(), tier).await?;
        let mut new_entry = entry.clone();
        new_entry.size = data.len() as u64;
        new_entry.mtime = now;
        new_entry.ctime = now;
        new_entry.birthtime = now;
        new_entry.nlink = 1;
        self.metadata.put(&dest_canon, new_entry).await?;
        self.watch.emit(WatchEvent::Rename, &dest_canon);
        Ok(())
    }

    pub async fn truncate(&self, p: &str, length: u64) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let _guard = self.lock_path(&canon).await;
        let mut entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        if entry.is_directory() {
            return Err(FsError::eisdir(canon));
        }
        let mut data = self.blobs.get(&canon).await?.unwrap_or_default();
        data.resize(length as usize, 0);
        let tier = entry.tier.unwrap_or(Tier::Hot);
        self.blobs.put(&canon, data, tier).await?;
        let now = now_ms();
        entry.size = length;
        entry.mtime = now;
        entry.ctime = now;
        self.metadata.put(&canon, entry).await?;
        self.watch.emit(WatchEvent::Change, &canon);
        Ok(())
    }

    // ---- Directories ------------------------------------------------------

    pub async fn mkdir(&self, p: &str, opts: MkdirOptions) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let mode = opts.mode.unwrap_or(0o755);
        let now = now_ms();

        if !opts.recursive {
            let parent = path::parent(&canon);
            if parent != "/" {
                match self.metadata.get(&parent).await? {
                    Some(e) if e.is_directory() => {}
                    Some(_) => return Err(FsError::enotdir(parent)),
                    None => return Err(FsError::enoent(parent)),
                }
            }
            if self.metadata.exists(&canon).await? {
                return Err(FsError::eexist(canon));
            }
            self.metadata.put(&canon, Entry::new_directory(mode, 0, 0, now)).await?;
            self.watch.emit(WatchEvent::Rename, &canon);
            return Ok(());
        }

        let segments: Vec<&str> =
            canon.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect();
        let mut current = String::from("/");
        for seg in segments {
            current = path::join(&current, seg);
            match self.metadata.get(&current).await? {
                Some(e) if e.is_directory() => continue,
                Some(_) => return Err(FsError::enotdir(current)),
                None => {
                    self.metadata.put(&current, Entry::new_directory(mode, 0, 0, now)).await?;
                    self.watch.emit(WatchEvent::Rename, &current);
                }
            }
        }
        Ok(())
    }

    pub async fn rmdir(&self, p: &str, opts: RmdirOptions) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        if !entry.is_directory() {
            return Err(FsError::enotdir(canon));
        }
        let descendants = self.metadata.list_descendants(&canon).await?;
        if !descendants.is_empty() && !opts.recursive {
            return Err(FsError::enotempty(canon));
        }
        let mut ordered = descendants;
        ordered.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
        for desc in ordered {
            self.metadata.delete(&desc).await?;
            self.blobs.delete(&desc).await?;
        }
        self.metadata.delete(&canon).await?;
        self.watch.emit(WatchEvent::Rename, &canon);
        Ok(())
    }

    pub async fn rm(&self, p: &str, opts: RmOptions) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let entry = match self.metadata.get(&canon).await? {
            Some(e) => e,
            None if opts.force => return Ok(()),
            None => return Err(FsError::enoent(canon)),
        };
        if entry.is_directory() {
            self.rmdir(&canon, RmdirOptions { recursive: opts.recursive }).await
        } else {
            self.unlink(&canon).await
        }
    }

    pub async fn readdir(&self, p: &str, opts: ReaddirOptions) -> FsResult<ReaddirResult> {
        let canon = self.check_path(p)?;
        let entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        if !entry.is_directory() {
            return Err(FsError::enotdir(canon));
        }

        let paths: Vec<String> = if opts.recursive {
            self.metadata.list_descendants(&canon).await?
        } else {
            let children = self.metadata.list_children(&canon).await?;
            children.into_iter().map(|name| path::join(&canon, &name)).collect()
        };

        if opts.with_file_types {
            let mut dirents = Vec::with_capacity(paths.len());
            for path_str in &paths {
                if let Some(child_entry) = self.metadata.get(path_str).await? {
                    dirents.push(Dirent {
                        name: path::basename(path_str).to_string(),
                        parent_path: path::parent(path_str),
                        path: path_str.clone(),
                        entry_type: child_entry.entry_type,
                    });
                }
            }
            Ok(ReaddirResult::Dirents(dirents))
        } else {
            let names = if opts.recursive {
                paths.iter().map(|p| path::relative(&canon, p)).collect()
            } else {
                paths.iter().map(|p| path::basename(p).to_string()).collect()
            };
            Ok(ReaddirResult::Names(names))
        }
    }

    // ---- Metadata ---------------------------------------------------------

    pub async fn stat(&self, p: &str) -> FsResult<Stat> {
        let (canon, entry) = self.resolve(p, true).await?;
        Ok(Stat::from_entry(path_to_ino(&canon), &entry))
    }

    pub async fn lstat(&self, p: &str) -> FsResult<Stat> {
        let (canon, entry) = self.resolve(p, false).await?;
        Ok(Stat::from_entry(path_to_ino(&canon), &entry))
    }

    pub async fn exists(&self, p: &str) -> FsResult<bool> {
        match self.stat(p).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == ErrorCode::ENOENT => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn access(&self, p: &str, mode: Option<u32>, caller: Caller) -> FsResult<()> {
        let (canon, entry) = self.resolve(p, true).await?;
        let Some(mode) = mode else { return Ok(()) };
        if mode == 0 {
            return Ok(());
        }
        let bits = if entry.uid == caller.uid {
            (entry.mode >> 6) & 0o7
        } else if entry.gid == caller.gid {
            (entry.mode >> 3) & 0o7
        } else {
            entry.mode & 0o7
        };
        if (bits & mode) != mode {
            return Err(FsError::eacces(canon));
        }
        Ok(())
    }

    pub async fn chmod(&self, p: &str, mode: u32) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let mut entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        let type_bits = entry.mode & crate::mode::S_IFMT;
        entry.mode = type_bits | (mode & !crate::mode::S_IFMT);
        entry.ctime = now_ms();
        self.metadata.put(&canon, entry).await?;
        Ok(())
    }

    pub async fn chown(&self, p: &str, uid: u32, gid: u32) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let mut entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        entry.uid = uid;
        entry.gid = gid;
        entry.ctime = now_ms();
        self.metadata.put(&canon, entry).await?;
        Ok(())
    }

    pub async fn utimes(&self, p: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let canon = self.check_path(p)?;
        let mut entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        entry.atime = atime;
        entry.mtime = mtime;
        entry.ctime = now_ms();
        self.metadata.put(&canon, entry).await?;
        Ok(())
    }

    // ---- Links --------------------------------------------------------------

    pub async fn symlink(&self, target: &str, p: &str) -> FsResult<()> {
        let canon = self.check_path(p)?;
        if self.metadata.exists(&canon).await? {
            return Err(FsError::eexist(canon));
        }
        let now = now_ms();
        self.metadata.put(&canon, Entry::new_symlink(target, 0, 0, now)).await?;
        self.watch.emit(WatchEvent::Rename, &canon);
        Ok(())
    }

    pub async fn link(&self, existing: &str, new: &str) -> FsResult<()> {
        let existing_canon = self.check_path(existing)?;
        let new_canon = self.check_path(new)?;
        let mut entry = self
            .metadata
            .get(&existing_canon)
            .await?
            .ok_or_else(|| FsError::enoent(existing_canon.clone()))?;
        if entry.is_directory() {
            return Err(FsError::eperm("cannot hard link a directory"));
        }
        if self.metadata.exists(&new_canon).await? {
            return Err(FsError::eexist(new_canon));
        }
        let link_id = entry.link_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let starting_count = if entry.link_id.is_some() {
            *self.link_counts.get(&link_id).expect("link_id present implies a link_counts entry")
        } else {
            self.link_counts.insert(link_id.clone(), 1);
            1
        };
        let new_count = starting_count + 1;
        self.link_counts.insert(link_id.clone(), new_count);

        entry.link_id = Some(link_id.clone());
        entry.nlink = new_count;
        self.metadata.put(&existing_canon, entry.clone()).await?;

        let mut new_entry = entry;
        new_entry.link_id = Some(link_id);
        new_entry.nlink = new_count;
        self.metadata.put(&new_canon, new_entry).await?;
        self.blobs.copy(&existing_canon, &new_canon).await?;
        self.watch.emit(WatchEvent::Rename, &new_canon);
        Ok(())
    }

    pub async fn readlink(&self, p: &str) -> FsResult<String> {
        let canon = self.check_path(p)?;
        let entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        entry.link_target.clone().ok_or_else(|| FsError::einval(format!("not a symlink: {canon}")))
    }

    pub async fn realpath(&self, p: &str) -> FsResult<String> {
        let (canon, _) = self.resolve(p, true).await?;
        Ok(canon)
    }

    // ---- Tiering ------------------------------------------------------------

    pub async fn promote(&self, p: &str, tier: Tier) -> FsResult<()> {
        if matches!(tier, Tier::Cold) {
            return Err(FsError::einval("promote target must be hot or warm"));
        }
        self.set_tier(p, tier).await
    }

    pub async fn demote(&self, p: &str, tier: Tier) -> FsResult<()> {
        if matches!(tier, Tier::Hot) {
            return Err(FsError::einval("demote target must be warm or cold"));
        }
        self.set_tier(p, tier).await
    }

    async fn set_tier(&self, p: &str, tier: Tier) -> FsResult<()> {
        let canon = self.check_path(p)?;
        match tier {
            Tier::Warm if !self.limits.warm_enabled => return Err(FsError::einval("warm tier disabled")),
            Tier::Cold if !self.limits.cold_enabled => return Err(FsError::einval("cold tier disabled")),
            _ => {}
        }
        let mut entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        if !entry.is_file() {
            return Err(FsError::einval(format!("not a regular file: {canon}")));
        }
        self.blobs.set_tier(&canon, tier).await?;
        entry.tier = Some(tier);
        entry.ctime = now_ms();
        self.metadata.put(&canon, entry).await?;
        Ok(())
    }

    pub async fn get_tier(&self, p: &str) -> FsResult<Option<Tier>> {
        let canon = self.check_path(p)?;
        let entry = self.metadata.get(&canon).await?.ok_or_else(|| FsError::enoent(canon.clone()))?;
        Ok(entry.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryBlobStore, MemoryMetadataStore};

    fn make_kernel() -> Kernel {
        Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            KernelLimits::default(),
        )
    }

    #[tokio::test]
    async fn s1_create_read_overwrite_delete() {
        let k = make_kernel();
        k.write_file("/a.txt", b"Hello".to_vec(), WriteOptions::default()).await.unwrap();
        assert_eq!(k.read_file("/a.txt", None, None).await.unwrap(), b"Hello");
        let st = k.stat("/a.txt").await.unwrap();
        assert_eq!(st.size, 5);
        assert!(st.is_file());

        k.write_file("/a.txt", b"Hi".to_vec(), WriteOptions::default()).await.unwrap();
        assert_eq!(k.read_file("/a.txt", None, None).await.unwrap(), b"Hi");
        assert_eq!(k.stat("/a.txt").await.unwrap().size, 2);

        k.unlink("/a.txt").await.unwrap();
        assert!(matches!(k.read_file("/a.txt", None, None).await, Err(e) if e.code == ErrorCode::ENOENT));
    }

    #[tokio::test]
    async fn s2_recursive_mkdir_rm() {
        let k = make_kernel();
        k.mkdir("/a/b/c", MkdirOptions { recursive: true, mode: None }).await.unwrap();
        assert!(k.stat("/a").await.unwrap().is_directory());
        assert!(k.stat("/a/b").await.unwrap().is_directory());
        assert!(k.stat("/a/b/c").await.unwrap().is_directory());

        let err = k.mkdir("/a/b/c", MkdirOptions::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EEXIST);

        k.rm("/a", RmOptions { recursive: true, force: true }).await.unwrap();
        assert!(!k.exists("/a").await.unwrap());
    }

    #[tokio::test]
    async fn s3_rename_overwrite() {
        let k = make_kernel();
        k.write_file("/x", b"1".to_vec(), WriteOptions::default()).await.unwrap();
        k.write_file("/y", b"2".to_vec(), WriteOptions::default()).await.unwrap();

        let err = k.rename("/x", "/y", RenameOptions::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EEXIST);

        k.rename("/x", "/y", RenameOptions { overwrite: true }).await.unwrap();
        assert_eq!(k.read_file("/y", None, None).await.unwrap(), b"1");
        assert!(!k.exists("/x").await.unwrap());
    }

    #[tokio::test]
    async fn s4_symlink_chain() {
        let k = make_kernel();
        k.write_file("/target", b"data".to_vec(), WriteOptions::default()).await.unwrap();
        k.symlink("/target", "/l1").await.unwrap();
        k.symlink("/l1", "/l2").await.unwrap();

        assert_eq!(k.read_file("/l2", None, None).await.unwrap(), b"data");
        assert!(k.lstat("/l2").await.unwrap().is_symbolic_link());
        assert!(!k.stat("/l2").await.unwrap().is_symbolic_link());
        assert_eq!(k.readlink("/l2").await.unwrap(), "/l1");
        assert_eq!(k.realpath("/l2").await.unwrap(), "/target");
    }

    #[tokio::test]
    async fn s5_tiering() {
        let mut limits = KernelLimits::default();
        limits.hot_max_size = 1024;
        let k = Kernel::new(
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryBlobStore::new()),
            Arc::new(WatchManager::new()),
            limits,
        );
        k.write_file("/small", vec![0u8; 512], WriteOptions::default()).await.unwrap();
        assert_eq!(k.get_tier("/small").await.unwrap(), Some(Tier::Hot));
        k.write_file("/big", vec![0u8; 2048], WriteOptions::default()).await.unwrap();
        assert_eq!(k.get_tier("/big").await.unwrap(), Some(Tier::Warm));

        k.demote("/small", Tier::Warm).await.unwrap();
        assert_eq!(k.get_tier("/small").await.unwrap(), Some(Tier::Warm));
        k.promote("/small", Tier::Hot).await.unwrap();
        assert_eq!(k.get_tier("/small").await.unwrap(), Some(Tier::Hot));
    }

    #[tokio::test]
    async fn truncate_zero_pads_on_extend() {
        let k = make_kernel();
        k.write_file("/f", b"ab".to_vec(), WriteOptions::default()).await.unwrap();
        k.truncate("/f", 5).await.unwrap();
        assert_eq!(k.stat("/f").await.unwrap().size, 5);
        assert_eq!(k.read_file("/f", None, None).await.unwrap(), vec![b'a', b'b', 0, 0, 0]);
    }

    #[tokio::test]
    async fn path_traversal_rejected_with_eacces() {
        let k = make_kernel();
        let err = k.stat("/../../etc/passwd").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EACCES);
    }

    #[tokio::test]
    async fn hardlink_shares_content_until_last_unlink() {
        let k = make_kernel();
        k.write_file("/a", b"shared".to_vec(), WriteOptions::default()).await.unwrap();
        k.link("/a", "/b").await.unwrap();
        assert_eq!(k.stat("/a").await.unwrap().nlink, 2);
        k.unlink("/a").await.unwrap();
        assert!(!k.exists("/a").await.unwrap());
        assert_eq!(k.read_file("/b", None, None).await.unwrap(), b"shared");
        k.unlink("/b").await.unwrap();
        assert!(!k.exists("/b").await.unwrap());
    }

    #[tokio::test]
    async fn readdir_lists_immediate_children_only() {
        let k = make_kernel();
        k.mkdir("/a", MkdirOptions::default()).await.unwrap();
        k.write_file("/a/one.txt", b"1".to_vec(), WriteOptions::default()).await.unwrap();
        k.mkdir("/a/sub", MkdirOptions::default()).await.unwrap();
        k.write_file("/a/sub/two.txt", b"2".to_vec(), WriteOptions::default()).await.unwrap();

        let ReaddirResult::Names(mut names) = k.readdir("/a", ReaddirOptions::default()).await.unwrap()
        else {
            panic!("expected names")
        };
        names.sort();
        assert_eq!(names, vec!["one.txt".to_string(), "sub".to_string()]);
    }
}
