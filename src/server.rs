//! The four meta-tools exposed to the LLM, plus the thin transports that
//! carry them.
//!
//! Every typed failure is flattened into an in-band `{error, error_type}`
//! response so the LLM can react; only truly unexpected errors are logged
//! with a full trace and reported as `internal`. The transports are
//! deliberately minimal: newline-delimited JSON over stdio, or an HTTP
//! `POST /tools/{name}` endpoint; richer protocol framing lives outside
//! this crate.

use crate::config::MfpConfig;
use crate::error::Error;
use crate::runtime::cache::CacheStore;
use crate::runtime::executor::CodeExecutor;
use crate::runtime::registry::Registry;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

/// Workflow text shown to connecting LLM clients.
pub const INSTRUCTIONS: &str = "MFP exposes API server functions through 4 meta-tools. \
Workflow: 1) list_servers to see what is available, 2) get_function for the \
signature and a usage example, 3) execute_code to run Python code using those \
functions, 4) get_cached_code to find and reuse previously successful code.";

/// The meta-tool surface: stable contract regardless of transport framing.
pub struct MetaTools {
    config: MfpConfig,
    registry: Arc<Registry>,
    cache: CacheStore,
    executor: CodeExecutor,
}

impl MetaTools {
    #[must_use]
    pub const fn new(
        config: MfpConfig,
        registry: Arc<Registry>,
        cache: CacheStore,
        executor: CodeExecutor,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            executor,
        }
    }

    /// `list_servers()`: compact overview of every compiled server.
    #[must_use]
    pub fn list_servers(&self) -> Value {
        let servers = self.registry.list_servers();
        info!(server_count = servers.len(), "tool list_servers called");

        json!({
            "servers": servers
                .iter()
                .map(|s| {
                    json!({
                        "name": s.name,
                        "description": s.description,
                        "functions": s.functions.iter().map(|fn_name| {
                            json!({
                                "name": fn_name,
                                "summary": s.function_summaries.get(fn_name).cloned().unwrap_or_default(),
                            })
                        }).collect::<Vec<_>>(),
                    })
                })
                .collect::<Vec<_>>()
        })
    }

    /// `get_function(server, function)`: signature, schemas, and a source
    /// snippet. Missing server/function comes back in-band, never as a
    /// transport error.
    #[must_use]
    pub fn get_function(&self, server_name: &str, function_name: &str) -> Value {
        match self.registry.get_function(server_name, function_name) {
            Ok(function) => {
                info!(server = %server_name, function = %function_name, "tool get_function called");
                json!({
                    "server": server_name,
                    "function": function.function_name,
                    "summary": function.summary,
                    "method": function.method,
                    "path": function.path,
                    "parameters": function.parameters,
                    "response_fields": function.response_fields,
                    "usage_example": function.source_code,
                    "import_statement": format!("from {server_name}.functions import {function_name}"),
                })
            }
            Err(e @ (Error::ServerNotFound { .. } | Error::FunctionNotFound { .. })) => {
                json!({ "error": e.to_string(), "error_type": e.error_type() })
            }
            Err(e) => {
                error!(error = %e, "get_function unexpected error");
                json!({ "error": "Internal error", "error_type": "internal" })
            }
        }
    }

    /// `execute_code(code, description)`: run a program through the
    /// pipeline and report success or a typed failure.
    pub async fn execute_code(&self, code: &str, description: &str) -> Value {
        match self.executor.execute(code, description).await {
            Ok(result) => {
                info!(success = result.success, "tool execute_code called");
                serde_json::to_value(&result).unwrap_or_else(
                    |_| json!({ "success": false, "error": "Internal error occurred", "error_type": "internal" }),
                )
            }
            Err(e @ Error::Security { .. }) => {
                json!({ "success": false, "error": e.to_string(), "error_type": e.error_type() })
            }
            Err(Error::Lint { message, output }) => {
                json!({
                    "success": false,
                    "error": format!("Code has issues: {message}"),
                    "lint_output": output,
                    "error_type": "lint",
                })
            }
            Err(e @ Error::ExecutionTimeout { .. }) => {
                json!({
                    "success": false,
                    "error": format!(
                        "Execution timed out after {}s",
                        self.config.execution_timeout_seconds
                    ),
                    "error_type": e.error_type(),
                })
            }
            Err(Error::Execution { message, stderr, .. }) => {
                json!({
                    "success": false,
                    "error": message,
                    "stderr": stderr,
                    "error_type": "execution",
                })
            }
            Err(e) => {
                error!(error = %e, "execute_code unexpected error");
                json!({ "success": false, "error": "Internal error occurred", "error_type": "internal" })
            }
        }
    }

    /// `get_cached_code(search?)`: list reusable, previously successful
    /// programs.
    pub async fn get_cached_code(&self, search: Option<&str>) -> Value {
        match self.cache.search(search, 50).await {
            Ok(entries) => {
                info!(search = ?search, results = entries.len(), "tool get_cached_code called");
                json!({
                    "cached_entries": entries
                        .iter()
                        .map(|e| {
                            json!({
                                "id": e.id,
                                "description": e.description,
                                "servers_used": e.servers_used,
                                "use_count": e.use_count,
                                "created_at": e.created_at,
                            })
                        })
                        .collect::<Vec<_>>()
                })
            }
            Err(e @ Error::Cache { .. }) => {
                json!({ "error": format!("Cache unavailable: {e}"), "error_type": "cache" })
            }
            Err(e) => {
                error!(error = %e, "get_cached_code unexpected error");
                json!({ "error": "Internal error", "error_type": "internal" })
            }
        }
    }

    /// Server metadata shown to connecting clients.
    #[must_use]
    pub fn describe(&self) -> Value {
        json!({
            "name": "MFP",
            "instructions": INSTRUCTIONS,
            "tools": ["list_servers", "get_function", "execute_code", "get_cached_code"],
        })
    }

    /// Dispatch one transport-level request to the named tool.
    pub async fn dispatch(&self, tool: &str, arguments: &Value) -> Value {
        match tool {
            "describe" => self.describe(),
            "list_servers" => self.list_servers(),
            "get_function" => {
                let server = arguments.get("server_name").and_then(Value::as_str);
                let function = arguments.get("function_name").and_then(Value::as_str);
                match (server, function) {
                    (Some(server), Some(function)) => self.get_function(server, function),
                    _ => json!({
                        "error": "get_function requires server_name and function_name",
                        "error_type": "internal",
                    }),
                }
            }
            "execute_code" => {
                let code = arguments.get("code").and_then(Value::as_str);
                let description = arguments
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                match code {
                    Some(code) => self.execute_code(code, description).await,
                    None => json!({
                        "success": false,
                        "error": "execute_code requires code",
                        "error_type": "internal",
                    }),
                }
            }
            "get_cached_code" => {
                let search = arguments.get("search").and_then(Value::as_str);
                self.get_cached_code(search).await
            }
            other => json!({
                "error": format!("Unknown tool '{other}'"),
                "error_type": "internal",
            }),
        }
    }
}

/// Serve the meta-tools over newline-delimited JSON on stdio. Each request
/// line is `{"tool": "...", "arguments": {...}}`; each response is one JSON
/// line.
///
/// # Errors
///
/// Returns an error when stdio itself fails.
pub async fn serve_stdio(tools: Arc<MetaTools>) -> Result<(), Error> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!("serving meta-tools on stdio");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => {
                let tool = request
                    .get("tool")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = request.get("arguments").cloned().unwrap_or(json!({}));
                tools.dispatch(&tool, &arguments).await
            }
            Err(e) => json!({
                "error": format!("Invalid request: {e}"),
                "error_type": "internal",
            }),
        };

        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Serve the meta-tools over HTTP: `POST /tools/{name}` with a JSON
/// arguments body.
///
/// # Errors
///
/// Returns an error when the listener cannot bind.
pub async fn serve_http(tools: Arc<MetaTools>, host: &str, port: u16) -> Result<(), Error> {
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::Json;

    async fn call_tool(
        State(tools): State<Arc<MetaTools>>,
        Path(name): Path<String>,
        Json(arguments): Json<Value>,
    ) -> Json<Value> {
        Json(tools.dispatch(&name, &arguments).await)
    }

    async fn describe(State(tools): State<Arc<MetaTools>>) -> Json<Value> {
        Json(tools.describe())
    }

    let app = axum::Router::new()
        .route("/", get(describe))
        .route("/tools/{name}", post(call_tool))
        .with_state(tools);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "serving meta-tools on http");

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::config(format!("HTTP server failed: {e}")))?;

    Ok(())
}
