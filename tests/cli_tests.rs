mod common;

use common::{write_spec, write_sources_file, WEATHER_SPEC};
use once_cell::sync::Lazy;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Cached binary path to avoid repeated lookup per test.
static MFP_BIN: Lazy<PathBuf> = Lazy::new(|| assert_cmd::cargo::cargo_bin("mfp"));

fn mfp_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(&*MFP_BIN)
}

#[test]
fn test_help_lists_subcommands() {
    mfp_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("compile"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_compile_dry_run_succeeds() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    let sources = write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);

    mfp_cmd()
        .current_dir(tmp.path())
        .env("MFP_SWAGGER_CONFIG_FILE", sources)
        .env("MFP_COMPILED_OUTPUT_DIR", tmp.path().join("compiled"))
        .args(["compile", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("weather"));
}

#[test]
fn test_compile_writes_output() {
    let tmp = TempDir::new().unwrap();
    let spec_path = write_spec(tmp.path(), "weather", WEATHER_SPEC);
    let sources = write_sources_file(tmp.path(), &[("weather", &spec_path, true)]);

    mfp_cmd()
        .current_dir(tmp.path())
        .env("MFP_SWAGGER_CONFIG_FILE", sources)
        .env("MFP_COMPILED_OUTPUT_DIR", tmp.path().join("compiled"))
        .env("MFP_LINT_COMMAND", "mfp-test-no-such-linter")
        .arg("compile")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compiled: weather (2 endpoints)"));

    assert!(tmp.path().join("compiled/weather/functions.py").is_file());
    assert!(tmp.path().join("compiled/weather/manifest.json").is_file());
}

#[test]
fn test_compile_failure_exits_one() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.yaml");
    let sources = write_sources_file(tmp.path(), &[("broken", &missing, false)]);

    mfp_cmd()
        .current_dir(tmp.path())
        .env("MFP_SWAGGER_CONFIG_FILE", sources)
        .env("MFP_COMPILED_OUTPUT_DIR", tmp.path().join("compiled"))
        .arg("compile")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Compile failed for: broken"));
}

#[test]
fn test_invalid_config_value_is_rejected() {
    mfp_cmd()
        .env("MFP_PORT", "not-a-port")
        .arg("compile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
