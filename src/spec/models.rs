use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for a single swagger/OpenAPI source, as declared in the
/// source list file. Immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SwaggerSource {
    pub name: String,
    pub swagger_url: String,
    pub base_url: String,
    #[serde(default)]
    pub auth_header: String,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

/// A single parameter to an API endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParamSchema {
    pub name: String,
    /// "query" | "path" | "header" | "body"
    pub location: String,
    /// "string" | "integer" | "number" | "boolean" | "object" | "array"
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(
        rename = "enum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub enum_values: Option<Vec<String>>,
}

/// A field in an API response schema. `nested` holds object properties or
/// array item fields, at most one level below the top (the parser enforces
/// the depth cap while walking).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResponseField {
    pub name: String,
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Vec<ResponseField>>,
}

/// Normalized representation of a single API endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointSpec {
    pub path: String,
    pub method: String,
    pub operation_id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub response_schema: Vec<ResponseField>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Normalized representation of a complete API server from a swagger doc.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSpec {
    pub name: String,
    pub description: String,
    pub base_url: String,
    pub is_read_only: bool,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    /// SHA-256 of the raw spec bytes, lowercase hex.
    pub swagger_hash: String,
}

/// Manifest entry for a single compiled endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct EndpointManifest {
    pub function_name: String,
    pub summary: String,
    pub method: String,
    pub path: String,
    pub parameters_summary: String,
    pub response_summary: String,
}

/// Compiled server manifest written to `<out>/<server>/manifest.json`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerManifest {
    pub server_name: String,
    pub description: String,
    pub swagger_hash: String,
    pub compiled_at: String,
    pub base_url: String,
    pub is_read_only: bool,
    #[serde(default)]
    pub endpoints: Vec<EndpointManifest>,
}
