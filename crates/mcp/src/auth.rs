//! Tool auth middleware (spec §4.9 "Auth middleware"). Classifies tools as
//! read-only, write-requiring, or admin and enforces scope rules. Loosely
//! follows the header-inspection shape of the server binary's
//! `validate_bearer` (check for a caller identity, structured rejection on
//! failure) but the scope-classification rules themselves have no teacher
//! precedent and are designed from the spec text directly.

use std::collections::HashSet;

use fsx_core::config::AuthConfig;

use crate::error::McpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    ReadOnly,
    Write,
    Admin,
}

/// Classifies a tool by name. The three builtins are fixed; unknown tool
/// names (e.g. user-registered extensions) default to `Admin`, the most
/// restrictive class, per spec §4.9 ("Unknown tools require `admin`").
pub fn classify(tool_name: &str) -> ToolClass {
    match tool_name {
        "search" | "fetch" => ToolClass::ReadOnly,
        "do" => ToolClass::Write,
        _ => ToolClass::Admin,
    }
}

/// The caller's declared scopes for one request (e.g. derived from an
/// authenticated API key's grants). `None` means no caller identity was
/// presented at all (anonymous).
#[derive(Debug, Clone, Default)]
pub struct CallerScopes {
    pub authenticated: bool,
    pub scopes: HashSet<String>,
}

impl CallerScopes {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Expands scope synonyms and implications: `admin` implies all scopes;
    /// `write`/`files:write` imply `read`; `files:read`/`files:write` are
    /// synonyms of `read`/`write`.
    fn effective(&self) -> HashSet<String> {
        let mut out = self.scopes.clone();
        for s in &self.scopes {
            match s.as_str() {
                "files:read" => {
                    out.insert("read".to_string());
                }
                "files:write" => {
                    out.insert("write".to_string());
                }
                _ => {}
            }
        }
        if out.contains("write") {
            out.insert("read".to_string());
        }
        if out.contains("admin") {
            out.insert("read".to_string());
            out.insert("write".to_string());
        }
        out
    }

    fn has(&self, scope: &str) -> bool {
        if scope == "admin" {
            return self.scopes.contains("admin");
        }
        self.effective().contains(scope)
    }
}

/// Checks one tool call against the classification rules, returning an
/// [`McpError`] with code `AUTH_REQUIRED` or `PERMISSION_DENIED` on failure.
pub fn check(tool_name: &str, caller: &CallerScopes, auth: &AuthConfig) -> Result<(), McpError> {
    match classify(tool_name) {
        ToolClass::ReadOnly => {
            if auth.allow_anonymous_read {
                return Ok(());
            }
            if !caller.authenticated {
                return Err(McpError::auth_required("authentication required to call this tool"));
            }
            if !caller.has("read") {
                return Err(McpError::permission_denied("caller lacks the `read` scope"));
            }
            Ok(())
        }
        ToolClass::Write => {
            if !caller.authenticated {
                return Err(McpError::auth_required("authentication required to call this tool"));
            }
            if !caller.has("write") {
                return Err(McpError::permission_denied("caller lacks the `write` scope"));
            }
            Ok(())
        }
        ToolClass::Admin => {
            if !caller.authenticated {
                return Err(McpError::auth_required("authentication required to call this tool"));
            }
            if !caller.has("admin") {
                return Err(McpError::permission_denied("caller lacks the `admin` scope"));
            }
            Ok(())
        }
    }
}
