//! MCP-level error vocabulary (spec §4.9). Distinct from the POSIX
//! [`fsx_core::ErrorCode`] taxonomy: auth and tool-dispatch failures here use
//! their own codes (`AUTH_REQUIRED`, `PERMISSION_DENIED`, `TOOL_NOT_FOUND`,
//! `INVALID_PARAMS`, `TIMEOUT`), while `fs`-binding calls still surface the
//! POSIX codes (e.g. `EACCES`) passed through from the kernel or permission
//! checks.

use fsx_core::FsError;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct McpError {
    pub code: String,
    pub message: String,
}

impl McpError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new("TOOL_NOT_FOUND", format!("unknown tool: {name}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new("INVALID_PARAMS", message.into())
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new("AUTH_REQUIRED", message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new("PERMISSION_DENIED", message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message.into())
    }
}

impl From<FsError> for McpError {
    fn from(e: FsError) -> Self {
        Self::new(e.code.as_str(), e.message)
    }
}
