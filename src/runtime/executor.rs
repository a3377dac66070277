//! Code executor: the full pipeline behind `execute_code`.
//!
//! Strictly sequential per call: size guard → static AST scan → lint →
//! dependency detection → credential materialization → sandbox run → output
//! parse → cache. Each stage either passes the program forward or fails with
//! its typed error; the sandbox backend guarantees container cleanup on
//! every path.

use crate::config::MfpConfig;
use crate::constants;
use crate::error::Error;
use crate::hashing::combine_hashes;
use crate::logging::SecretContext;
use crate::runtime::cache::CacheStore;
use crate::runtime::models::ExecutionResult;
use crate::runtime::registry::Registry;
use crate::runtime::sandbox::Sandbox;
use crate::security::guard::AstGuard;
use crate::security::{policies, vault};
use regex::Regex;
use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Manages the execution pipeline for LLM-submitted programs.
pub struct CodeExecutor {
    config: MfpConfig,
    cache: CacheStore,
    guard: AstGuard,
    registry: Arc<Registry>,
    sandbox: Arc<dyn Sandbox>,
}

impl CodeExecutor {
    #[must_use]
    pub fn new(
        config: MfpConfig,
        cache: CacheStore,
        registry: Arc<Registry>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        Self {
            config,
            cache,
            guard: AstGuard::new(),
            registry,
            sandbox,
        }
    }

    /// Run one program through the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Security`], [`Error::Lint`],
    /// [`Error::ExecutionTimeout`], or [`Error::Execution`] depending on the
    /// failing stage.
    pub async fn execute(&self, code: &str, description: &str) -> Result<ExecutionResult, Error> {
        let started = Instant::now();

        // 1. Size guard.
        if code.len() > self.config.max_code_size_bytes {
            return Err(Error::security(format!(
                "Code size {} bytes exceeds limit of {}",
                code.len(),
                self.config.max_code_size_bytes
            )));
        }

        // 2. Static AST scan.
        let context: String = description.chars().take(100).collect();
        self.guard.validate(code, &context)?;

        // 3. Lint in a bounded subprocess.
        self.lint_code(code).await?;

        // 4. Which servers does the program import?
        let servers_used = detect_servers_used(code);

        // A compiled mutating function can linger on disk after its source
        // flips to read-only; refuse to call it rather than trust the tree.
        for (server, function) in detect_function_imports(code) {
            if let Some((method, read_only)) = self.registry.function_policy(&server, &function) {
                if read_only {
                    policies::enforce_read_only(&method, &server)?;
                }
            }
        }

        // 5. Credentials materialize from the host environment only.
        let env = vault::build_all_server_env_vars(&servers_used);

        // 6–8. Sandbox run with deadline; output capped.
        let payload = self.build_payload(code);
        let output = self
            .sandbox
            .run(
                &payload,
                &env,
                Duration::from_secs(self.config.execution_timeout_seconds),
            )
            .await?;

        let stdout = truncate_lossy(&output.stdout, self.config.max_output_size_bytes);
        let stderr = truncate_lossy(&output.stderr, constants::MAX_STDERR_BYTES);

        if output.exit_code != 0 {
            // Sandbox stderr can echo injected credentials; scrub before it
            // leaves the pipeline.
            let secrets = SecretContext::for_servers(&servers_used);
            return Err(Error::execution(
                format!("Sandbox exited with code {}", output.exit_code),
                secrets.redact(&stderr),
                output.exit_code,
            ));
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        // 9. Parse the JSON envelope.
        let mut result = self.parse_output(&stdout, elapsed_ms);

        // 10. Cache successful programs for reuse.
        if result.success && self.config.cache_enabled {
            let swagger_hash = self.composite_swagger_hash(&servers_used);
            match self
                .cache
                .store(code, description, &servers_used, &swagger_hash)
                .await
            {
                Ok(cache_id) => result.cache_id = Some(cache_id),
                Err(e) => warn!(error = %e, "cache store failed, execution result kept"),
            }
        }

        info!(
            success = result.success,
            elapsed_ms,
            servers = ?servers_used,
            description = %context.chars().take(60).collect::<String>(),
            "code executed"
        );

        Ok(result)
    }

    /// Run the configured linter with the code on stdin. Linter missing or
    /// timing out is logged and skipped; a lint failure is fatal.
    async fn lint_code(&self, code: &str) -> Result<(), Error> {
        let mut command = tokio::process::Command::new(&self.config.lint_command);
        command
            .args(["check", "--select=E,F,W", "--stdin-filename", "code.py", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(reason = %e, "linter not found, lint skipped");
                return Ok(());
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(code.as_bytes()).await.is_err() {
                warn!("failed to feed linter stdin, lint skipped");
                return Ok(());
            }
            drop(stdin);
        }

        let deadline = Duration::from_secs(constants::LINT_TIMEOUT_SECS);
        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if output.status.success() {
                    Ok(())
                } else {
                    let lint_output: String = String::from_utf8_lossy(&output.stdout)
                        .chars()
                        .take(2000)
                        .collect();
                    Err(Error::lint("Code has lint issues", lint_output))
                }
            }
            Ok(Err(e)) => {
                warn!(reason = %e, "lint failed to run, skipped");
                Ok(())
            }
            Err(_) => {
                warn!("lint timed out, skipped");
                Ok(())
            }
        }
    }

    /// Prefix the user program with the in-sandbox path stub pointing at the
    /// compiled-modules directory.
    fn build_payload(&self, code: &str) -> String {
        let compiled = std::path::Path::new(&self.config.compiled_output_dir)
            .canonicalize()
            .unwrap_or_else(|_| std::path::PathBuf::from(&self.config.compiled_output_dir));
        let escaped = compiled
            .display()
            .to_string()
            .replace('\\', "\\\\")
            .replace('"', "\\\"");
        format!("import sys as _sys\n_sys.path.insert(0, \"{escaped}\")\n\n{code}")
    }

    /// Parse sandbox stdout as the JSON envelope. Anything unparseable is
    /// surfaced as raw text with `success=true` so partial output is not
    /// lost.
    fn parse_output(&self, raw_output: &str, elapsed_ms: u64) -> ExecutionResult {
        let raw_output = raw_output.trim();

        if raw_output.is_empty() {
            return ExecutionResult {
                success: false,
                data: None,
                error: Some("No output from execution".to_string()),
                traceback: None,
                execution_time_ms: elapsed_ms,
                cache_id: None,
            };
        }

        match serde_json::from_str::<serde_json::Value>(raw_output) {
            Ok(parsed) if parsed.is_object() => {
                let success = parsed
                    .get("success")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                ExecutionResult {
                    success,
                    data: if success { parsed.get("data").cloned() } else { None },
                    error: if success {
                        None
                    } else {
                        parsed
                            .get("error")
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string)
                    },
                    traceback: if self.config.debug {
                        parsed
                            .get("traceback")
                            .and_then(serde_json::Value::as_str)
                            .map(str::to_string)
                    } else {
                        None
                    },
                    execution_time_ms: elapsed_ms,
                    cache_id: None,
                }
            }
            _ => {
                let truncated: String = raw_output
                    .chars()
                    .take(constants::MAX_FALLBACK_DATA_BYTES)
                    .collect();
                ExecutionResult {
                    success: true,
                    data: Some(serde_json::Value::String(truncated)),
                    error: None,
                    traceback: None,
                    execution_time_ms: elapsed_ms,
                    cache_id: None,
                }
            }
        }
    }

    /// Composite dependency hash over the swagger hashes of every server the
    /// program uses.
    fn composite_swagger_hash(&self, servers_used: &[String]) -> String {
        if servers_used.is_empty() {
            return "no-servers".to_string();
        }

        let mut hashes = Vec::with_capacity(servers_used.len());
        for name in servers_used {
            match self.registry.get_swagger_hash(name) {
                Ok(hash) => hashes.push(hash),
                Err(_) => return "unknown".to_string(),
            }
        }
        combine_hashes(&hashes)
    }
}

/// Detect `from <name>.functions import …` / `import <name>.functions`
/// dependencies. Returns a sorted, de-duplicated server list.
#[must_use]
pub fn detect_servers_used(code: &str) -> Vec<String> {
    let pattern = Regex::new(r"from\s+(\w+)\.functions\s+import|import\s+(\w+)\.functions")
        .expect("hardcoded pattern is valid");

    let mut servers: BTreeSet<String> = BTreeSet::new();
    for captures in pattern.captures_iter(code) {
        if let Some(name) = captures.get(1).or_else(|| captures.get(2)) {
            servers.insert(name.as_str().to_string());
        }
    }
    servers.into_iter().collect()
}

/// Detect the individual functions pulled in through
/// `from <name>.functions import a, b as c, …` statements.
#[must_use]
pub fn detect_function_imports(code: &str) -> Vec<(String, String)> {
    let pattern = Regex::new(r"from\s+(\w+)\.functions\s+import\s+([^\n#]+)")
        .expect("hardcoded pattern is valid");

    let mut imports = Vec::new();
    for captures in pattern.captures_iter(code) {
        let server = captures[1].to_string();
        for item in captures[2].split(',') {
            // `name as alias` binds `alias`, but policy checks care about
            // the imported name itself.
            let name = item.split_whitespace().next().unwrap_or_default();
            if !name.is_empty() && name != "(" {
                imports.push((
                    server.clone(),
                    name.trim_matches(|c| c == '(' || c == ')').to_string(),
                ));
            }
        }
    }
    imports
}

fn truncate_lossy(bytes: &[u8], cap: usize) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(cap)]).into_owned()
}
