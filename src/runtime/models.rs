use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::spec::models::{ParamSchema, ResponseField};

/// Complete metadata for one compiled API function, as returned by
/// `get_function`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FunctionInfo {
    pub server_name: String,
    pub function_name: String,
    pub summary: String,
    #[serde(default)]
    pub parameters: Vec<ParamSchema>,
    #[serde(default)]
    pub response_fields: Vec<ResponseField>,
    /// Line-accurate source snippet of the generated function.
    pub source_code: String,
    pub method: String,
    pub path: String,
}

/// Summary metadata for a compiled server, as returned by `list_servers`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub function_summaries: BTreeMap<String, String>,
}

/// Result from sandboxed code execution.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Only populated in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
    /// Set iff execution succeeded and caching is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_id: Option<String>,
}

/// A single entry in the code cache.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheEntry {
    /// SHA-256 of the normalized code.
    pub id: String,
    pub description: String,
    pub code: String,
    #[serde(default)]
    pub servers_used: Vec<String>,
    /// Composite hash of the swagger specs the code depends on.
    pub swagger_hash: String,
    pub created_at: f64,
    pub last_used_at: f64,
    pub use_count: i64,
    pub ttl_seconds: i64,
}

/// Compact cache entry for listing. Excludes the full source.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSummary {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub servers_used: Vec<String>,
    pub use_count: i64,
    pub created_at: f64,
}
