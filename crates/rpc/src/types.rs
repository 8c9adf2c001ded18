//! Wire types for the RPC transport (spec §6 "Wire protocol — RPC").

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// An opaque token identifying this call for cooperative cancellation
    /// via a subsequent `cancel` method call with the same id.
    #[serde(default)]
    pub cancel_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<fsx_core::FsError> for RpcError {
    fn from(e: fsx_core::FsError) -> Self {
        Self {
            code: e.code.as_str().to_string(),
            message: e.message,
            details: e.path.map(|p| serde_json::json!({ "path": p })),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

impl RpcResponse {
    pub fn ok(id: Value, duration_ms: u64, data: Value) -> Self {
        Self { data: Some(data), error: None, id, duration_ms }
    }

    pub fn err(id: Value, duration_ms: u64, error: RpcError) -> Self {
        Self { data: None, error: Some(error), id, duration_ms }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    pub path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}
