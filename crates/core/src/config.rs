//! Engine configuration (spec §5 "Resource limits"), deserializable from the
//! server's `fsx.toml`. Defaults mirror the spec's stated defaults exactly so
//! an absent config file still produces a spec-compliant engine.

use serde::{Deserialize, Serialize};

use crate::kernel::KernelLimits;

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_max_path_length() -> usize {
    4096
}

fn default_hot_max_size() -> u64 {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_batch_read_parallelism() -> usize {
    10
}

fn default_batch_write_parallelism() -> usize {
    5
}

fn default_stream_chunk_size_rpc() -> usize {
    64 * 1024
}

fn default_stream_chunk_size_local() -> usize {
    16 * 1024
}

fn default_session_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    pub max_file_size: u64,
    pub max_path_length: usize,
    pub hot_max_size: u64,
    pub warm_enabled: bool,
    pub cold_enabled: bool,
    pub batch_read_parallelism: usize,
    pub batch_write_parallelism: usize,
    pub stream_chunk_size_rpc: usize,
    pub stream_chunk_size_local: usize,
    pub session_ttl_secs: u64,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            max_path_length: default_max_path_length(),
            hot_max_size: default_hot_max_size(),
            warm_enabled: default_true(),
            cold_enabled: default_true(),
            batch_read_parallelism: default_batch_read_parallelism(),
            batch_write_parallelism: default_batch_write_parallelism(),
            stream_chunk_size_rpc: default_stream_chunk_size_rpc(),
            stream_chunk_size_local: default_stream_chunk_size_local(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl ResourceLimitsConfig {
    pub fn to_kernel_limits(&self) -> KernelLimits {
        KernelLimits {
            max_file_size: self.max_file_size,
            max_path_length: self.max_path_length,
            hot_max_size: self.hot_max_size,
            warm_enabled: self.warm_enabled,
            cold_enabled: self.cold_enabled,
        }
    }
}

/// One tenant's namespace declaration. The namespace identifier is applied
/// by prefixing paths before they reach the stores (spec §3 "Namespace").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Auth scopes recognized by the HTTP/RPC/MCP auth middleware (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub allow_anonymous_read: bool,
    pub api_keys: Vec<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { allow_anonymous_read: false, api_keys: Vec::new(), allowed_origins: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: ResourceLimitsConfig,
    pub namespaces: Vec<NamespaceConfig>,
    pub auth: AuthConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.limits.max_file_size, 100 * 1024 * 1024);
        assert_eq!(cfg.limits.hot_max_size, 1024 * 1024);
        assert_eq!(cfg.limits.batch_read_parallelism, 10);
        assert_eq!(cfg.limits.batch_write_parallelism, 5);
        assert!(!cfg.auth.allow_anonymous_read);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [limits]
            hot_max_size = 2048
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.hot_max_size, 2048);
        assert_eq!(cfg.limits.max_file_size, 100 * 1024 * 1024);
    }

    #[test]
    fn namespaces_and_auth_parse() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [[namespaces]]
            id = "tenant-a"

            [auth]
            allow_anonymous_read = true
            api_keys = ["key-1"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.namespaces.len(), 1);
        assert_eq!(cfg.namespaces[0].id, "tenant-a");
        assert!(cfg.auth.allow_anonymous_read);
    }
}
