//! POSIX-style error taxonomy shared by the kernel, the HTTP layer, the RPC
//! layer, and the MCP tool surface (spec §7).
//!
//! Every kernel operation returns `Result<T, FsError>`; transport layers map
//! `FsError` to their own wire shape (HTTP status codes, RPC error objects,
//! tool `isError` text) without re-deriving the taxonomy.

use thiserror::Error;

/// The POSIX-style code carried by every [`FsError`]. Kept separate from the
/// error itself so transports can match on it without destructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    ENOENT,
    EEXIST,
    EISDIR,
    ENOTDIR,
    EACCES,
    EPERM,
    ENOTEMPTY,
    EBADF,
    EINVAL,
    ELOOP,
    ENAMETOOLONG,
    ENOSPC,
    EROFS,
    EBUSY,
    EMFILE,
    ENFILE,
    EXDEV,
    EAUTH,
    ETIMEDOUT,
    EIO,
    UNKNOWN,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ENOENT => "ENOENT",
            ErrorCode::EEXIST => "EEXIST",
            ErrorCode::EISDIR => "EISDIR",
            ErrorCode::ENOTDIR => "ENOTDIR",
            ErrorCode::EACCES => "EACCES",
            ErrorCode::EPERM => "EPERM",
            ErrorCode::ENOTEMPTY => "ENOTEMPTY",
            ErrorCode::EBADF => "EBADF",
            ErrorCode::EINVAL => "EINVAL",
            ErrorCode::ELOOP => "ELOOP",
            ErrorCode::ENAMETOOLONG => "ENAMETOOLONG",
            ErrorCode::ENOSPC => "ENOSPC",
            ErrorCode::EROFS => "EROFS",
            ErrorCode::EBUSY => "EBUSY",
            ErrorCode::EMFILE => "EMFILE",
            ErrorCode::ENFILE => "ENFILE",
            ErrorCode::EXDEV => "EXDEV",
            ErrorCode::EAUTH => "EAUTH",
            ErrorCode::ETIMEDOUT => "ETIMEDOUT",
            ErrorCode::EIO => "EIO",
            ErrorCode::UNKNOWN => "UNKNOWN",
        }
    }
}

/// A filesystem operation failure. Carries the POSIX code, a human message,
/// and (when known) the path and syscall-like operation name that failed —
/// these surface verbatim in the HTTP envelope and RPC error object (spec §6).
#[derive(Debug, Error, Clone)]
#[error("{code:?}: {message}{}", path.as_ref().map(|p| format!(" ({p})")).unwrap_or_default())]
pub struct FsError {
    pub code: ErrorCode,
    pub message: String,
    pub path: Option<String>,
    pub syscall: Option<&'static str>,
}

impl FsError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), path: None, syscall: None }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_syscall(mut self, syscall: &'static str) -> Self {
        self.syscall = Some(syscall);
        self
    }

    pub fn enoent(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::ENOENT, format!("no such file or directory: {path}")).with_path(path)
    }

    pub fn eexist(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::EEXIST, format!("already exists: {path}")).with_path(path)
    }

    pub fn eisdir(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::EISDIR, format!("is a directory: {path}")).with_path(path)
    }

    pub fn enotdir(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::ENOTDIR, format!("not a directory: {path}")).with_path(path)
    }

    pub fn eacces(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::EACCES, format!("permission denied: {path}")).with_path(path)
    }

    pub fn eperm(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EPERM, message)
    }

    pub fn enotempty(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::ENOTEMPTY, format!("directory not empty: {path}")).with_path(path)
    }

    pub fn einval(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EINVAL, message)
    }

    pub fn eloop(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::ELOOP, format!("too many levels of symbolic links: {path}"))
            .with_path(path)
    }

    pub fn enametoolong(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(ErrorCode::ENAMETOOLONG, format!("path too long: {path}")).with_path(path)
    }
}

pub type FsResult<T> = Result<T, FsError>;

/// Convenience conversion from a pathless io error into [`FsError`] for the
/// handful of call sites that proxy `std::io::Error` (metadata/blob store
/// implementations over real files in tests).
impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let code = match e.kind() {
            NotFound => ErrorCode::ENOENT,
            AlreadyExists => ErrorCode::EEXIST,
            PermissionDenied => ErrorCode::EACCES,
            InvalidInput | InvalidData => ErrorCode::EINVAL,
            TimedOut => ErrorCode::ETIMEDOUT,
            _ => ErrorCode::EIO,
        };
        FsError::new(code, e.to_string())
    }
}
