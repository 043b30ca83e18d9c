//! CLI integration tests for the Torpor command-line interface.
//!
//! Every test runs against a private temporary directory: `--config-dir`
//! isolates the user config and log files, and the working directory is
//! moved so no project-local `torpor.toml` is picked up.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use torpor_session::{FilePersistentStore, encode};

/// Get a command for the torpor binary, isolated to `dir`.
fn torpor(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("torpor").unwrap();
    cmd.current_dir(dir)
        .env_remove("TORPOR_CONFIG")
        .env_remove("TORPOR_CONFIG_DIR")
        .arg("--config-dir")
        .arg(dir.join("config"));
    cmd
}

/// Write a config file pointing the persistent store at `<dir>/records`.
fn config_with_store(dir: &Path) -> PathBuf {
    let path = dir.join("torpor-test.toml");
    let records = dir.join("records");
    std::fs::write(
        &path,
        format!("[persistent_store]\npath = '{}'\n", records.display()),
    )
    .unwrap();
    path
}

fn passivate_record(dir: &Path, key: &str, value: serde_json::Value) {
    let store = FilePersistentStore::open(dir.join("records")).unwrap();
    let bytes = encode(&key.to_string(), &value).unwrap();
    std::fs::write(store.record_path(key), bytes).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Torpor"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("attribute"))
        .stdout(predicate::str::contains("store"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("torpor"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path()).arg("frobnicate").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_defaults_to_user_config() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_then_exists() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dir.path().join("config/config.toml").is_file());

    torpor(dir.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_show_json() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        "default_store = \"passivating\"\n[passivation]\nmax_size = 3\nidle_timeout_secs = 30\n",
    )
    .unwrap();

    let output = torpor(dir.path())
        .args(["--json", "--config"])
        .arg(&config)
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown["max_size"], 3);
    assert_eq!(shown["idle_timeout_secs"], 30);
    assert_eq!(shown["default_store"], "passivating");
    assert_eq!(shown["stores"]["simple"], false);
}

#[test]
fn test_config_show_rejects_unknown_default_store() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "default_store = \"nowhere\"\n").unwrap();

    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Attribute Tests
// ─────────────────────────────────────────────────────────────────────────────

const STORE_ADDRESS: &str = "/subsystem=torpor/passivation-store=file";

#[test]
fn test_attribute_read_default() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "read", STORE_ADDRESS, "max-size"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10000"));
}

#[test]
fn test_attribute_write_persists() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "write", STORE_ADDRESS, "max-size", "5"])
        .assert()
        .success();

    let written = std::fs::read_to_string(dir.path().join("config/config.toml")).unwrap();
    assert!(written.contains("max_size = 5"), "{written}");

    torpor(dir.path())
        .args(["attribute", "read", STORE_ADDRESS, "max-size"])
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));
}

#[test]
fn test_attribute_write_negative_rejected() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "write", STORE_ADDRESS, "idle-timeout", "-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be non-negative"));

    assert!(!dir.path().join("config/config.toml").exists());
}

#[test]
fn test_attribute_write_unknown_store_rejected() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "write", "/subsystem=torpor", "default-store", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_attribute_wrong_address_rejected() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "read", "/subsystem=torpor", "max-size"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not defined at address"));
}

#[test]
fn test_attribute_malformed_address_rejected() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "read", "subsystem", "max-size"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid address"));
}

#[test]
fn test_attribute_undefine_restores_default() {
    let dir = TempDir::new().unwrap();
    torpor(dir.path())
        .args(["attribute", "write", "/subsystem=torpor", "default-store", "passivating"])
        .assert()
        .success();
    torpor(dir.path())
        .args(["attribute", "undefine", "/subsystem=torpor", "default-store"])
        .assert()
        .success();
    torpor(dir.path())
        .args(["attribute", "read", "/subsystem=torpor", "default-store"])
        .assert()
        .success()
        .stdout(predicate::str::diff("simple\n"));
}

#[test]
fn test_attribute_json_response() {
    let dir = TempDir::new().unwrap();
    let output = torpor(dir.path())
        .args(["--json", "attribute", "read", "/subsystem=torpor", "default-store"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["outcome"], "success");
    assert_eq!(response["result"], "simple");
}

#[test]
fn test_attribute_json_failure_response() {
    let dir = TempDir::new().unwrap();
    let output = torpor(dir.path())
        .args(["--json", "attribute", "write", STORE_ADDRESS, "max-size", "lots"])
        .output()
        .unwrap();
    assert!(!output.status.success());

    let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(response["outcome"], "failure");
    assert!(
        response["failure-description"]
            .as_str()
            .unwrap()
            .contains("max-size")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Store Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_store_list_empty() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(dir.path());
    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["store", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No passivated records"));
}

#[test]
fn test_store_list_and_show() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(dir.path());
    passivate_record(
        dir.path(),
        "cart-1",
        serde_json::json!({ "items": ["apple"] }),
    );

    let output = torpor(dir.path())
        .args(["--json", "--config"])
        .arg(&config)
        .args(["store", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed[0]["key"], "cart-1");
    assert!(listed[0]["passivated_at"].is_string());

    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["store", "show", "cart-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("apple"));
}

#[test]
fn test_store_purge() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(dir.path());
    passivate_record(dir.path(), "cart-1", serde_json::json!(1));

    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["store", "purge", "cart-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Purged"));

    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["store", "purge", "cart-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No passivated record"));
}

#[test]
fn test_store_show_missing() {
    let dir = TempDir::new().unwrap();
    let config = config_with_store(dir.path());
    torpor(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["store", "show", "nobody"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No passivated record"));
}
