mod common;

use async_trait::async_trait;
use common::test_config;
use mfp::error::Error;
use mfp::runtime::{CacheStore, CodeExecutor, Registry, Sandbox, SandboxOutput};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Scripted sandbox backend: no containers, fully deterministic.
struct MockSandbox {
    behavior: Behavior,
    last_payload: Mutex<Option<String>>,
    last_env: Mutex<Option<BTreeMap<String, String>>>,
}

enum Behavior {
    Stdout(String),
    Exit { code: i32, stderr: String },
    Timeout,
}

impl MockSandbox {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            last_payload: Mutex::new(None),
            last_env: Mutex::new(None),
        })
    }

    fn saw_payload(&self) -> Option<String> {
        self.last_payload.lock().unwrap().clone()
    }

    fn saw_env(&self) -> Option<BTreeMap<String, String>> {
        self.last_env.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run(
        &self,
        payload: &str,
        env: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<SandboxOutput, Error> {
        *self.last_payload.lock().unwrap() = Some(payload.to_string());
        *self.last_env.lock().unwrap() = Some(env.clone());

        match &self.behavior {
            Behavior::Stdout(stdout) => Ok(SandboxOutput {
                exit_code: 0,
                stdout: stdout.clone().into_bytes(),
                stderr: Vec::new(),
            }),
            Behavior::Exit { code, stderr } => Ok(SandboxOutput {
                exit_code: *code,
                stdout: Vec::new(),
                stderr: stderr.clone().into_bytes(),
            }),
            Behavior::Timeout => Err(Error::execution_timeout(timeout.as_secs())),
        }
    }
}

fn executor_with(tmp: &TempDir, sandbox: Arc<MockSandbox>) -> (CodeExecutor, CacheStore) {
    let config = test_config(tmp.path());
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let registry = Arc::new(Registry::new(&config.compiled_output_dir));
    (
        CodeExecutor::new(config, cache.clone(), registry, sandbox),
        cache,
    )
}

#[tokio::test]
async fn test_success_envelope_is_parsed_and_cached() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": {"total": 45}}"#.to_string(),
    ));
    let (executor, cache) = executor_with(&tmp, Arc::clone(&sandbox));

    let result = executor
        .execute("result = sum(range(10))", "sum 0..9")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.data, Some(serde_json::json!({"total": 45})));
    assert!(result.error.is_none());

    let cache_id = result.cache_id.expect("successful runs are cached");
    let entry = cache.get(&cache_id).await.unwrap().unwrap();
    assert_eq!(entry.code, "result = sum(range(10))");
    assert_eq!(entry.description, "sum 0..9");
    assert_eq!(entry.swagger_hash, "no-servers");
}

#[tokio::test]
async fn test_failure_envelope_not_cached() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": false, "error": "KeyError: 'city'"}"#.to_string(),
    ));
    let (executor, cache) = executor_with(&tmp, sandbox);

    let result = executor.execute("result = x", "broken").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("KeyError: 'city'"));
    assert!(result.cache_id.is_none());

    assert!(cache.search(None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_json_output_falls_back_to_raw_text() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout("plain text, not json".to_string()));
    let (executor, _cache) = executor_with(&tmp, sandbox);

    let result = executor.execute("result = 1", "raw").await.unwrap();
    assert!(result.success);
    assert_eq!(
        result.data,
        Some(serde_json::Value::String("plain text, not json".to_string()))
    );
}

#[tokio::test]
async fn test_empty_output_reports_failure() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(String::new()));
    let (executor, _cache) = executor_with(&tmp, sandbox);

    let result = executor.execute("result = 1", "silent").await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("No output from execution"));
}

#[tokio::test]
async fn test_nonzero_exit_is_execution_error_with_stderr() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Exit {
        code: 2,
        stderr: "Traceback (most recent call last): boom".to_string(),
    });
    let (executor, _cache) = executor_with(&tmp, sandbox);

    let err = executor.execute("result = 1", "crashes").await.unwrap_err();
    match err {
        Error::Execution {
            message,
            stderr,
            exit_code,
        } => {
            assert!(message.contains("exited with code 2"));
            assert!(stderr.contains("boom"));
            assert_eq!(exit_code, 2);
        }
        other => panic!("expected execution error, got {other}"),
    }
}

#[tokio::test]
async fn test_timeout_propagates() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Timeout);
    let (executor, _cache) = executor_with(&tmp, sandbox);

    let err = executor
        .execute("import time\nwhile True: time.sleep(1)\n", "hang")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExecutionTimeout { seconds: 2 }));
    assert_eq!(err.error_type(), "timeout");
}

#[tokio::test]
async fn test_oversized_code_rejected_before_sandbox() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout("{}".to_string()));
    let mut config = test_config(tmp.path());
    config.max_code_size_bytes = 64;
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let registry = Arc::new(Registry::new(&config.compiled_output_dir));
    let executor = CodeExecutor::new(config, cache, registry, Arc::clone(&sandbox) as Arc<dyn Sandbox>);

    let big_code = format!("result = \"{}\"", "x".repeat(100));
    let err = executor.execute(&big_code, "too big").await.unwrap_err();
    assert_eq!(err.error_type(), "security");
    assert!(err.to_string().contains("exceeds limit"));
    assert!(sandbox.saw_payload().is_none(), "sandbox never launched");
}

#[tokio::test]
async fn test_guard_rejects_before_sandbox() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout("{}".to_string()));
    let (executor, _cache) = executor_with(&tmp, Arc::clone(&sandbox));

    let err = executor
        .execute("import os\nresult = os.listdir('/')", "escape attempt")
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "security");
    assert!(err.to_string().contains("blocked_import"));
    assert!(sandbox.saw_payload().is_none());
}

#[tokio::test]
async fn test_payload_carries_path_stub_and_env_carries_credentials() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": null}"#.to_string(),
    ));
    let (executor, _cache) = executor_with(&tmp, Arc::clone(&sandbox));

    std::env::set_var("MFP_WEATHER_BASE_URL", "https://api.weather.example.com/v1");
    std::env::set_var("MFP_WEATHER_AUTH", "Bearer token-12345");

    executor
        .execute(
            "from weather.functions import getcurrentweather\nresult = getcurrentweather(city='Oslo')",
            "fetch weather",
        )
        .await
        .unwrap();

    let payload = sandbox.saw_payload().unwrap();
    assert!(payload.starts_with("import sys as _sys\n_sys.path.insert(0, "));
    assert!(payload.contains("getcurrentweather(city='Oslo')"));
    // Credentials travel via the environment, never inside the payload.
    assert!(!payload.contains("token-12345"));

    let env = sandbox.saw_env().unwrap();
    assert_eq!(
        env.get("MFP_WEATHER_AUTH").map(String::as_str),
        Some("Bearer token-12345")
    );
    assert_eq!(
        env.get("MFP_WEATHER_BASE_URL").map(String::as_str),
        Some("https://api.weather.example.com/v1")
    );

    std::env::remove_var("MFP_WEATHER_BASE_URL");
    std::env::remove_var("MFP_WEATHER_AUTH");
}

/// Write a manifest by hand so the registry sees a read-only server that
/// still carries a mutating function, as after a source flips to read-only
/// without a recompile.
fn write_stale_read_only_manifest(compiled_dir: &std::path::Path) {
    let server_dir = compiled_dir.join("hotel");
    std::fs::create_dir_all(&server_dir).unwrap();
    std::fs::write(
        server_dir.join("manifest.json"),
        serde_json::json!({
            "server_name": "hotel",
            "description": "Hotel booking API",
            "swagger_hash": "ab".repeat(32),
            "compiled_at": "2026-01-01T00:00:00Z",
            "base_url": "https://api.hotel.example.com/v2",
            "is_read_only": true,
            "endpoints": [
                {
                    "function_name": "listhotels",
                    "summary": "List hotels",
                    "method": "GET",
                    "path": "/hotels",
                    "parameters_summary": "",
                    "response_summary": "id, name"
                },
                {
                    "function_name": "deletehotel",
                    "summary": "Delete a hotel",
                    "method": "DELETE",
                    "path": "/hotels/{id}",
                    "parameters_summary": "id (integer, required)",
                    "response_summary": "response data"
                }
            ]
        })
        .to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_stale_mutating_function_on_read_only_server_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_stale_read_only_manifest(std::path::Path::new(&config.compiled_output_dir));

    let mut registry = Registry::new(&config.compiled_output_dir);
    registry.load();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": 1}"#.to_string(),
    ));
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let executor = CodeExecutor::new(config, cache, Arc::new(registry), Arc::clone(&sandbox) as Arc<dyn Sandbox>);

    let err = executor
        .execute(
            "from hotel.functions import deletehotel\nresult = deletehotel(id=1)",
            "remove a hotel",
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "security");
    assert!(err.to_string().contains("read-only"));
    assert!(sandbox.saw_payload().is_none(), "sandbox never launched");
}

#[tokio::test]
async fn test_read_only_server_get_function_still_runs() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    write_stale_read_only_manifest(std::path::Path::new(&config.compiled_output_dir));

    let mut registry = Registry::new(&config.compiled_output_dir);
    registry.load();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": []}"#.to_string(),
    ));
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let executor = CodeExecutor::new(config, cache, Arc::new(registry), sandbox);

    let result = executor
        .execute(
            "from hotel.functions import listhotels\nresult = listhotels()",
            "list hotels",
        )
        .await
        .unwrap();
    assert!(result.success);
}

#[tokio::test]
async fn test_duplicate_execution_bumps_use_count() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": 45}"#.to_string(),
    ));
    let (executor, cache) = executor_with(&tmp, sandbox);

    let first = executor.execute("result = sum(range(10))", "sum 0..9").await.unwrap();
    let second = executor.execute("result = sum(range(10))", "sum again").await.unwrap();
    assert_eq!(first.cache_id, second.cache_id);

    let entries = cache.search(None, 50).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].use_count >= 2);
    assert_eq!(entries[0].description, "sum 0..9");
}

#[tokio::test]
async fn test_caching_disabled_leaves_no_cache_id() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": 1}"#.to_string(),
    ));
    let mut config = test_config(tmp.path());
    config.cache_enabled = false;
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let registry = Arc::new(Registry::new(&config.compiled_output_dir));
    let executor = CodeExecutor::new(config, cache.clone(), registry, sandbox);

    let result = executor.execute("result = 1", "no cache").await.unwrap();
    assert!(result.success);
    assert!(result.cache_id.is_none());
    assert!(cache.search(None, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_traceback_only_in_debug_mode() {
    let envelope = r#"{"success": false, "error": "boom", "traceback": "Traceback..."}"#;
    let tmp = TempDir::new().unwrap();

    let sandbox = MockSandbox::new(Behavior::Stdout(envelope.to_string()));
    let (executor, _cache) = executor_with(&tmp, sandbox);
    let result = executor.execute("result = 1", "no debug").await.unwrap();
    assert!(result.traceback.is_none());

    let sandbox = MockSandbox::new(Behavior::Stdout(envelope.to_string()));
    let mut config = test_config(tmp.path());
    config.debug = true;
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let registry = Arc::new(Registry::new(&config.compiled_output_dir));
    let executor = CodeExecutor::new(config, cache, registry, sandbox);
    let result = executor.execute("result = 1", "debug").await.unwrap();
    assert_eq!(result.traceback.as_deref(), Some("Traceback..."));
}

#[tokio::test]
async fn test_lint_failure_is_fatal_when_linter_exists() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout("{}".to_string()));
    let mut config = test_config(tmp.path());
    // `false` exits non-zero for any input, standing in for a failing linter.
    config.lint_command = "false".to_string();
    let cache = CacheStore::in_memory(3600, 50).unwrap();
    let registry = Arc::new(Registry::new(&config.compiled_output_dir));
    let executor = CodeExecutor::new(config, cache, registry, Arc::clone(&sandbox) as Arc<dyn Sandbox>);

    let err = executor.execute("result = 1", "linted").await.unwrap_err();
    assert_eq!(err.error_type(), "lint");
    assert!(sandbox.saw_payload().is_none());
}

#[tokio::test]
async fn test_missing_linter_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let sandbox = MockSandbox::new(Behavior::Stdout(
        r#"{"success": true, "data": 1}"#.to_string(),
    ));
    // test_config points lint_command at a binary that does not exist.
    let (executor, _cache) = executor_with(&tmp, sandbox);

    let result = executor.execute("result = 1", "unlinted").await.unwrap();
    assert!(result.success);
}
