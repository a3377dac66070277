mod common;

use common::{test_config, write_spec, write_sources_file, HOTEL_SPEC, WEATHER_SPEC};
use mfp::compiler::Orchestrator;
use mfp::spec::models::ServerManifest;
use std::path::Path;
use tempfile::TempDir;

fn read_manifest(compiled_dir: &Path, server: &str) -> ServerManifest {
    let raw = std::fs::read_to_string(compiled_dir.join(server).join("manifest.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn test_compile_writes_functions_and_manifest() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);
    let config = test_config(tmp.path());

    let result = Orchestrator::new(config.clone()).compile_all(false).await.unwrap();

    assert_eq!(result.compiled, vec!["weather".to_string()]);
    assert!(result.skipped.is_empty());
    assert!(result.failed.is_empty());
    assert_eq!(result.total_endpoints, 2);

    let compiled_dir = Path::new(&config.compiled_output_dir);
    let functions = std::fs::read_to_string(compiled_dir.join("weather/functions.py")).unwrap();
    assert!(functions.contains("def getcurrentweather("));
    assert!(functions.contains("def getforecast("));
    assert!(compiled_dir.join("weather/__init__.py").is_file());

    let manifest = read_manifest(compiled_dir, "weather");
    assert_eq!(manifest.server_name, "weather");
    assert!(manifest.is_read_only);
    assert_eq!(manifest.swagger_hash.len(), 64);
    assert_eq!(manifest.endpoints.len(), 2);
}

#[tokio::test]
async fn test_recompile_unchanged_spec_skips_byte_equal_manifest() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);
    let config = test_config(tmp.path());
    let orchestrator = Orchestrator::new(config.clone());

    let first = orchestrator.compile_all(false).await.unwrap();
    assert_eq!(first.compiled, vec!["weather".to_string()]);

    let manifest_path =
        Path::new(&config.compiled_output_dir).join("weather/manifest.json");
    let manifest_bytes_before = std::fs::read(&manifest_path).unwrap();

    let second = orchestrator.compile_all(false).await.unwrap();
    assert!(second.compiled.is_empty());
    assert_eq!(second.skipped, vec!["weather".to_string()]);

    let manifest_bytes_after = std::fs::read(&manifest_path).unwrap();
    assert_eq!(manifest_bytes_before, manifest_bytes_after);
}

#[tokio::test]
async fn test_changed_spec_byte_triggers_recompile_with_new_hash() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);
    let config = test_config(tmp.path());
    let orchestrator = Orchestrator::new(config.clone());

    orchestrator.compile_all(false).await.unwrap();
    let compiled_dir = Path::new(&config.compiled_output_dir);
    let hash_before = read_manifest(compiled_dir, "weather").swagger_hash;

    // Flip one byte of the spec.
    write_spec(tmp.path(), "weather", &WEATHER_SPEC.replace("City name", "City Name"));

    let second = orchestrator.compile_all(false).await.unwrap();
    assert_eq!(second.compiled, vec!["weather".to_string()]);
    assert!(second.skipped.is_empty());

    let hash_after = read_manifest(compiled_dir, "weather").swagger_hash;
    assert_ne!(hash_before, hash_after);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);
    let config = test_config(tmp.path());

    let result = Orchestrator::new(config.clone()).compile_all(true).await.unwrap();
    assert_eq!(result.compiled, vec!["weather".to_string()]);
    assert_eq!(result.total_endpoints, 2);

    assert!(!Path::new(&config.compiled_output_dir).join("weather").exists());
}

#[tokio::test]
async fn test_one_bad_source_does_not_stop_the_loop() {
    let tmp = TempDir::new().unwrap();
    let good = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    let missing = tmp.path().join("missing.yaml");
    write_sources_file(
        tmp.path(),
        &[("broken", &missing, false), ("weather", &good, true)],
    );
    let config = test_config(tmp.path());

    let result = Orchestrator::new(config).compile_all(false).await.unwrap();
    assert_eq!(result.failed, vec!["broken".to_string()]);
    assert_eq!(result.compiled, vec!["weather".to_string()]);
}

#[tokio::test]
async fn test_read_only_source_compiles_only_get() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "hotel", HOTEL_SPEC);
    write_sources_file(tmp.path(), &[("hotel", &spec_path, true)]);
    let config = test_config(tmp.path());

    Orchestrator::new(config.clone()).compile_all(false).await.unwrap();

    let manifest = read_manifest(Path::new(&config.compiled_output_dir), "hotel");
    let methods: Vec<&str> = manifest.endpoints.iter().map(|e| e.method.as_str()).collect();
    assert_eq!(methods, vec!["GET"]);
}

#[tokio::test]
async fn test_missing_sources_file_yields_empty_result() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let result = Orchestrator::new(config).compile_all(false).await.unwrap();
    assert!(result.compiled.is_empty());
    assert!(result.skipped.is_empty());
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn test_invalid_source_entries_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    let sources = format!(
        "servers:\n  - name: weather\n    swagger_url: {}\n    base_url: https://api.weather.example.com/v1\n  - name: nourl\n",
        spec_path.display()
    );
    std::fs::write(tmp.path().join("swaggers.yaml"), sources).unwrap();
    let config = test_config(tmp.path());

    let orchestrator = Orchestrator::new(config);
    let sources = orchestrator.load_swagger_sources().await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].name, "weather");
}
