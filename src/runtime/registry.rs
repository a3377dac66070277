//! Runtime registry: loads compiled manifests and answers the discovery
//! and introspection queries behind `list_servers` / `get_function`.
//!
//! The registry is populated once at startup and read-only afterwards; a
//! subsequent explicit `load()` replaces the index wholesale. Source
//! snippets are extracted lazily from the generated modules and memoized.

use crate::constants;
use crate::error::Error;
use crate::runtime::models::{FunctionInfo, ServerInfo};
use crate::spec::models::{EndpointManifest, ParamSchema, ResponseField, ServerManifest};
use indexmap::IndexMap;
use rustpython_parser::{ast, Parse};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Index of compiled server manifests keyed by server name.
pub struct Registry {
    compiled_dir: PathBuf,
    servers: IndexMap<String, ServerManifest>,
    snippet_cache: Mutex<HashMap<(String, String), String>>,
}

impl Registry {
    #[must_use]
    pub fn new(compiled_dir: impl Into<PathBuf>) -> Self {
        Self {
            compiled_dir: compiled_dir.into(),
            servers: IndexMap::new(),
            snippet_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Scan the compiled directory for `*/manifest.json` and index every
    /// parseable manifest. Malformed manifests are logged and skipped.
    pub fn load(&mut self) {
        self.servers.clear();
        if let Ok(mut cache) = self.snippet_cache.lock() {
            cache.clear();
        }

        if !self.compiled_dir.exists() {
            warn!(path = %self.compiled_dir.display(), "compiled dir not found");
            return;
        }

        let Ok(entries) = std::fs::read_dir(&self.compiled_dir) else {
            warn!(path = %self.compiled_dir.display(), "compiled dir not readable");
            return;
        };

        let mut manifest_paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path().join(constants::MANIFEST_FILENAME))
            .filter(|path| path.is_file())
            .collect();
        manifest_paths.sort();

        for manifest_path in manifest_paths {
            match Self::load_manifest(&manifest_path) {
                Ok(manifest) => {
                    debug!(
                        server = %manifest.server_name,
                        endpoints = manifest.endpoints.len(),
                        "manifest loaded"
                    );
                    self.servers.insert(manifest.server_name.clone(), manifest);
                }
                Err(e) => {
                    error!(path = %manifest_path.display(), error = %e, "manifest load failed");
                }
            }
        }

        info!(
            servers = self.servers.len(),
            total_functions = self
                .servers
                .values()
                .map(|s| s.endpoints.len())
                .sum::<usize>(),
            "registry loaded"
        );
    }

    fn load_manifest(path: &PathBuf) -> Result<ServerManifest, Error> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Summary information about every compiled server.
    #[must_use]
    pub fn list_servers(&self) -> Vec<ServerInfo> {
        self.servers
            .iter()
            .map(|(name, manifest)| ServerInfo {
                name: name.clone(),
                description: manifest.description.clone(),
                functions: manifest
                    .endpoints
                    .iter()
                    .map(|ep| ep.function_name.clone())
                    .collect(),
                function_summaries: manifest
                    .endpoints
                    .iter()
                    .map(|ep| (ep.function_name.clone(), ep.summary.clone()))
                    .collect(),
            })
            .collect()
    }

    /// Detailed function information, including a source snippet the LLM can
    /// read before writing code against the function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerNotFound`] / [`Error::FunctionNotFound`].
    pub fn get_function(&self, server_name: &str, function_name: &str) -> Result<FunctionInfo, Error> {
        let manifest = self.manifest(server_name)?;
        let endpoint = Self::find_endpoint(manifest, server_name, function_name)?;

        let source_code = self.function_source(server_name, function_name);
        let parameters = parse_parameters_summary(&endpoint.parameters_summary);
        let response_fields = parse_response_summary(&endpoint.response_summary);

        Ok(FunctionInfo {
            server_name: server_name.to_string(),
            function_name: function_name.to_string(),
            summary: endpoint.summary.clone(),
            parameters,
            response_fields,
            source_code,
            method: endpoint.method.clone(),
            path: endpoint.path.clone(),
        })
    }

    /// The stored swagger hash for a compiled server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerNotFound`] for unknown servers.
    pub fn get_swagger_hash(&self, server_name: &str) -> Result<String, Error> {
        Ok(self.manifest(server_name)?.swagger_hash.clone())
    }

    /// HTTP method of a compiled function together with its server's
    /// read-only flag, for pre-execution policy checks. `None` when the
    /// server or function is not in the registry.
    #[must_use]
    pub fn function_policy(&self, server_name: &str, function_name: &str) -> Option<(String, bool)> {
        let manifest = self.servers.get(server_name)?;
        manifest
            .endpoints
            .iter()
            .find(|ep| ep.function_name == function_name)
            .map(|ep| (ep.method.clone(), manifest.is_read_only))
    }

    fn manifest(&self, server_name: &str) -> Result<&ServerManifest, Error> {
        self.servers.get(server_name).ok_or_else(|| {
            Error::server_not_found(server_name, self.servers.keys().cloned().collect())
        })
    }

    fn find_endpoint<'a>(
        manifest: &'a ServerManifest,
        server_name: &str,
        function_name: &str,
    ) -> Result<&'a EndpointManifest, Error> {
        manifest
            .endpoints
            .iter()
            .find(|ep| ep.function_name == function_name)
            .ok_or_else(|| {
                Error::function_not_found(
                    server_name,
                    function_name,
                    manifest
                        .endpoints
                        .iter()
                        .map(|ep| ep.function_name.clone())
                        .collect(),
                )
            })
    }

    /// Extract (and memoize) the source snippet for one function from the
    /// server's generated module.
    fn function_source(&self, server_name: &str, function_name: &str) -> String {
        let cache_key = (server_name.to_string(), function_name.to_string());
        if let Ok(cache) = self.snippet_cache.lock() {
            if let Some(snippet) = cache.get(&cache_key) {
                return snippet.clone();
            }
        }

        let functions_file = self
            .compiled_dir
            .join(server_name)
            .join(constants::FUNCTIONS_FILENAME);

        let Ok(full_source) = std::fs::read_to_string(&functions_file) else {
            return format!("# Source not found for {server_name}.{function_name}");
        };

        let snippet = extract_function_snippet(&full_source, function_name);
        if let Ok(mut cache) = self.snippet_cache.lock() {
            cache.insert(cache_key, snippet.clone());
        }
        snippet
    }
}

/// Extract a single top-level function definition from Python source,
/// line-accurate. Falls back to the full module when the source does not
/// parse or the function is missing.
fn extract_function_snippet(source: &str, function_name: &str) -> String {
    let Ok(suite) = ast::Suite::parse(source, "<functions>") else {
        return source.to_string();
    };

    for stmt in &suite {
        let range = match stmt {
            ast::Stmt::FunctionDef(node) if node.name.as_str() == function_name => node.range,
            ast::Stmt::AsyncFunctionDef(node) if node.name.as_str() == function_name => node.range,
            _ => continue,
        };

        let start = u32::from(range.start()) as usize;
        let end = (u32::from(range.end()) as usize).min(source.len());

        // Widen the byte span to whole lines.
        let line_start = source[..start].rfind('\n').map_or(0, |pos| pos + 1);
        let line_end = source[end..]
            .find('\n')
            .map_or(source.len(), |pos| end + pos);

        return source[line_start..line_end].to_string();
    }

    source.to_string()
}

/// Parse a manifest `parameters_summary` string like
/// `"city (string, required), units (string, optional)"`.
fn parse_parameters_summary(summary: &str) -> Vec<ParamSchema> {
    if summary.trim().is_empty() {
        return Vec::new();
    }

    let mut params = Vec::new();
    for part in split_top_level(summary) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((name, rest)) = part.split_once('(') {
            let rest = rest.trim_end_matches(')');
            let (type_str, requirement) = rest.split_once(',').unwrap_or((rest, ""));
            params.push(ParamSchema {
                name: name.trim().to_string(),
                location: constants::PARAM_LOCATION_QUERY.to_string(),
                param_type: type_str.trim().to_string(),
                required: requirement.to_lowercase().contains("required"),
                description: String::new(),
                default: None,
                enum_values: None,
            });
        } else {
            params.push(ParamSchema {
                name: part.to_string(),
                location: constants::PARAM_LOCATION_QUERY.to_string(),
                param_type: "string".to_string(),
                required: false,
                description: String::new(),
                default: None,
                enum_values: None,
            });
        }
    }

    params
}

/// Split on commas that are not inside parentheses, so
/// `"a (string, required), b (int, optional)"` yields two parts.
fn split_top_level(summary: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in summary.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&summary[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&summary[start..]);
    parts
}

/// Parse a manifest `response_summary` string like `"id, name, price"`.
fn parse_response_summary(summary: &str) -> Vec<ResponseField> {
    if summary.is_empty() || summary == "response data" {
        return Vec::new();
    }
    summary
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| ResponseField {
            name: field.to_string(),
            field_type: "string".to_string(),
            description: String::new(),
            nested: None,
        })
        .collect()
}
