//! The data model (spec §3): `Entry`, tiers, dirents, and the stat record
//! returned by `stat`/`lstat`.

use serde::{Deserialize, Serialize};

use crate::mode;

/// Millisecond-resolution epoch timestamp.
pub type TimestampMs = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Directory => "directory",
            EntryType::Symlink => "symlink",
        }
    }
}

/// Storage tier for regular file content (spec §4.3 Tiering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }
}

/// The sole structural unit of the filesystem, keyed by absolute canonical
/// path in the metadata store. Child names are never denormalized here —
/// they're derived by prefix query against the store (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub entry_type: EntryType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    pub atime: TimestampMs,
    pub mtime: TimestampMs,
    pub ctime: TimestampMs,
    pub birthtime: TimestampMs,
    /// Present only for files.
    pub tier: Option<Tier>,
    /// Present only for files once computed.
    pub checksum: Option<String>,
    /// Present only for symlinks; opaque until resolved.
    pub link_target: Option<String>,
    /// Shared identity for a group of hard-linked paths (spec §4.3 `link`).
    /// `None` until `link()` creates the first alias; all paths sharing a
    /// `link_id` share one entry in the kernel's link-count table.
    pub link_id: Option<String>,
}

impl Entry {
    pub fn new_file(mode: u32, uid: u32, gid: u32, now: TimestampMs, tier: Tier) -> Self {
        Self {
            entry_type: EntryType::File,
            mode: (mode & !mode::S_IFMT) | mode::S_IFREG,
            uid,
            gid,
            nlink: 1,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            tier: Some(tier),
            checksum: None,
            link_target: None,
            link_id: None,
        }
    }

    pub fn new_directory(mode: u32, uid: u32, gid: u32, now: TimestampMs) -> Self {
        Self {
            entry_type: EntryType::Directory,
            mode: (mode & !mode::S_IFMT) | mode::S_IFDIR,
            uid,
            gid,
            nlink: 1,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            tier: None,
            checksum: None,
            link_target: None,
            link_id: None,
        }
    }

    pub fn new_symlink(target: impl Into<String>, uid: u32, gid: u32, now: TimestampMs) -> Self {
        let target = target.into();
        let size = target.len() as u64;
        Self {
            entry_type: EntryType::Symlink,
            mode: mode::DEFAULT_SYMLINK_MODE,
            uid,
            gid,
            nlink: 1,
            size,
            atime: now,
            mtime: now,
            ctime: now,
            birthtime: now,
            tier: None,
            checksum: None,
            link_target: Some(target),
            link_id: None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.entry_type, EntryType::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.entry_type, EntryType::Directory)
    }

    pub fn is_symbolic_link(&self) -> bool {
        matches!(self.entry_type, EntryType::Symlink)
    }
}

/// `{name, parentPath, path, type}` as returned by `readdir` with
/// `withFileTypes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dirent {
    pub name: String,
    pub parent_path: String,
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// The full record returned by `stat`/`lstat` (spec §6 wire protocol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    #[serde(rename = "atimeMs")]
    pub atime_ms: TimestampMs,
    #[serde(rename = "mtimeMs")]
    pub mtime_ms: TimestampMs,
    #[serde(rename = "ctimeMs")]
    pub ctime_ms: TimestampMs,
    #[serde(rename = "birthtimeMs")]
    pub birthtime_ms: TimestampMs,
    pub tier: Option<Tier>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

pub const BLOCK_SIZE: u64 = 512;
pub const BLKSIZE: u64 = 4096;

impl Stat {
    pub fn from_entry(ino: u64, entry: &Entry) -> Self {
        let size = entry.size;
        Self {
            dev: 0,
            ino,
            mode: entry.mode,
            nlink: entry.nlink,
            uid: entry.uid,
            gid: entry.gid,
            rdev: 0,
            size,
            blksize: BLKSIZE,
            blocks: size.div_ceil(BLOCK_SIZE),
            atime_ms: entry.atime,
            mtime_ms: entry.mtime,
            ctime_ms: entry.ctime,
            birthtime_ms: entry.birthtime,
            tier: entry.tier,
            entry_type: entry.entry_type,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.entry_type, EntryType::File)
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.entry_type, EntryType::Directory)
    }

    pub fn is_symbolic_link(&self) -> bool {
        matches!(self.entry_type, EntryType::Symlink)
    }
}
