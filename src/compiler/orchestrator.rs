//! Compile orchestrator: drives parsing and code generation for every
//! configured swagger source.
//!
//! Each source compiles independently: one bad source lands in `failed` and
//! the loop continues. Sources whose swagger hash matches the existing
//! manifest are skipped without touching disk. All writes go through a
//! claimed [`OutputDir`], which serializes concurrent compile invocations
//! and publishes each server's files so readers never see partial output.

use crate::compiler::codegen::CodeGenerator;
use crate::compiler::output::OutputDir;
use crate::config::MfpConfig;
use crate::constants;
use crate::error::Error;
use crate::spec::models::{EndpointManifest, ServerManifest, ServerSpec, SwaggerSource};
use crate::spec::parser::SwaggerParser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

/// Result summary from a compile pass.
#[derive(Debug, Default)]
pub struct CompileResult {
    pub compiled: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub total_endpoints: usize,
}

/// Manages the full compile pipeline for all configured swagger sources.
pub struct Orchestrator {
    config: MfpConfig,
    codegen: CodeGenerator,
    output_dir: PathBuf,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: MfpConfig) -> Self {
        let output_dir = PathBuf::from(&config.compiled_output_dir);
        Self {
            config,
            codegen: CodeGenerator::new(),
            output_dir,
        }
    }

    /// Load swagger source configurations from the YAML/JSON source list.
    ///
    /// A missing file is not an error; it yields an empty source list.
    /// Invalid entries are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`] when the file exists but cannot be read or
    /// parsed.
    pub async fn load_swagger_sources(&self) -> Result<Vec<SwaggerSource>, Error> {
        let config_path = Path::new(&self.config.swagger_config_file);
        if !config_path.exists() {
            warn!(path = %config_path.display(), "swagger config not found");
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            Error::compile(format!(
                "Failed to load swagger config {}: {e}",
                config_path.display()
            ))
        })?;
        let doc: serde_json::Value = serde_yaml::from_str(&raw).map_err(|e| {
            Error::compile(format!(
                "Failed to parse swagger config {}: {e}",
                config_path.display()
            ))
        })?;

        let entries = doc
            .get("servers")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut sources = Vec::new();
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("?")
                .to_string();
            match serde_json::from_value::<SwaggerSource>(entry) {
                Ok(source) => sources.push(source),
                Err(e) => warn!(server = %name, error = %e, "invalid swagger source"),
            }
        }

        info!(count = sources.len(), "swagger sources loaded");
        Ok(sources)
    }

    /// Run the compile pipeline for all configured sources.
    ///
    /// # Errors
    ///
    /// Returns an error only for setup failures (unreadable source list,
    /// output directory, lock). Per-source failures are reported in the
    /// result's `failed` list.
    pub async fn compile_all(&self, dry_run: bool) -> Result<CompileResult, Error> {
        let sources = self.load_swagger_sources().await?;
        let mut result = CompileResult::default();

        if sources.is_empty() {
            warn!("no swagger sources configured");
            return Ok(result);
        }

        let output = if dry_run {
            None
        } else {
            Some(OutputDir::claim(&self.output_dir).await?)
        };

        for source in sources {
            match self.compile_source(&source, output.as_ref()).await {
                Ok(Some(endpoint_count)) => {
                    result.compiled.push(source.name.clone());
                    result.total_endpoints += endpoint_count;
                }
                Ok(None) => result.skipped.push(source.name.clone()),
                Err(e) => {
                    error!(server = %source.name, error = %e, "compile failed");
                    result.failed.push(source.name.clone());
                }
            }
        }

        if !dry_run {
            self.lint_generated_code().await;
        }

        info!(
            compiled = result.compiled.len(),
            skipped = result.skipped.len(),
            failed = result.failed.len(),
            total_endpoints = result.total_endpoints,
            "compile complete"
        );
        Ok(result)
    }

    /// Compile a single source. Returns the endpoint count when (re)compiled,
    /// or `None` when the existing output is already current. `output` is
    /// `None` on dry runs, which parse and count without touching disk.
    async fn compile_source(
        &self,
        source: &SwaggerSource,
        output: Option<&OutputDir>,
    ) -> Result<Option<usize>, Error> {
        let parser = SwaggerParser::new(source.clone());
        let spec = parser.parse().await?;

        let Some(output) = output else {
            info!(server = %source.name, endpoints = spec.endpoints.len(), "dry run parsed");
            return Ok(Some(spec.endpoints.len()));
        };

        let manifest_path = output
            .server_dir(&source.name)
            .join(constants::MANIFEST_FILENAME);
        if Self::is_up_to_date(&manifest_path, &spec.swagger_hash).await {
            info!(server = %source.name, "server up to date");
            return Ok(None);
        }

        let code = self.codegen.generate(&spec)?;
        let init = format!("\"\"\"Auto-generated MFP module for {}.\"\"\"\n", spec.name);
        let manifest = Self::render_manifest(&spec)?;

        output
            .publish(
                &source.name,
                &[
                    (constants::FUNCTIONS_FILENAME, code.as_bytes()),
                    (constants::INIT_FILENAME, init.as_bytes()),
                    (constants::MANIFEST_FILENAME, manifest.as_bytes()),
                ],
            )
            .await?;

        info!(server = %source.name, endpoints = spec.endpoints.len(), "server compiled");
        Ok(Some(spec.endpoints.len()))
    }

    /// Whether the existing manifest's stored hash matches the current spec.
    async fn is_up_to_date(manifest_path: &Path, current_hash: &str) -> bool {
        let Ok(raw) = tokio::fs::read_to_string(manifest_path).await else {
            return false;
        };
        serde_json::from_str::<ServerManifest>(&raw)
            .map(|manifest| manifest.swagger_hash == current_hash)
            .unwrap_or(false)
    }

    /// Render the server manifest as pretty-printed JSON.
    fn render_manifest(spec: &ServerSpec) -> Result<String, Error> {
        let endpoints = spec
            .endpoints
            .iter()
            .map(|ep| {
                let parameters_summary = ep
                    .parameters
                    .iter()
                    .map(|p| {
                        format!(
                            "{} ({}, {})",
                            p.name,
                            p.param_type,
                            if p.required { "required" } else { "optional" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                let response_summary = {
                    let names: Vec<&str> =
                        ep.response_schema.iter().map(|f| f.name.as_str()).collect();
                    if names.is_empty() {
                        "response data".to_string()
                    } else {
                        names.join(", ")
                    }
                };

                EndpointManifest {
                    function_name: ep.operation_id.clone(),
                    summary: ep.summary.clone(),
                    method: ep.method.clone(),
                    path: ep.path.clone(),
                    parameters_summary,
                    response_summary,
                }
            })
            .collect();

        let manifest = ServerManifest {
            server_name: spec.name.clone(),
            description: spec.description.clone(),
            swagger_hash: spec.swagger_hash.clone(),
            compiled_at: chrono::Utc::now().to_rfc3339(),
            base_url: spec.base_url.clone(),
            is_read_only: spec.is_read_only,
            endpoints,
        };

        Ok(serde_json::to_string_pretty(&manifest)?)
    }

    /// Run the configured linter over all generated modules. Lint problems
    /// are warnings, never compile failures.
    async fn lint_generated_code(&self) {
        let mut generated_files = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&self.output_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let candidate = entry.path().join(constants::FUNCTIONS_FILENAME);
                if candidate.is_file() {
                    generated_files.push(candidate);
                }
            }
        }
        if generated_files.is_empty() {
            return;
        }

        let mut command = tokio::process::Command::new(&self.config.lint_command);
        command.arg("check").arg("--quiet").args(&generated_files);
        command.stdout(std::process::Stdio::piped());
        command.stderr(std::process::Stdio::piped());

        let spawned = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(reason = %e, "lint skipped");
                return;
            }
        };

        let deadline = Duration::from_secs(constants::GENERATED_LINT_TIMEOUT_SECS);
        match tokio::time::timeout(deadline, spawned.wait_with_output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    info!(files = generated_files.len(), "generated code lint passed");
                } else {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let preview: String = stdout.chars().take(2000).collect();
                    warn!(output = %preview, "generated code lint warnings");
                }
            }
            Ok(Err(e)) => warn!(reason = %e, "lint skipped"),
            Err(_) => warn!("lint timed out, skipped"),
        }
    }
}
