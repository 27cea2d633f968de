//! CLI integration tests for the `pygmalion` subcommands.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout
//! content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `pygmalion` binary, rooted at workspace.
fn pygmalion() -> Command {
    let mut cmd = cargo_bin_cmd!("pygmalion");
    cmd.current_dir(workspace_root());
    cmd
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("pygmalion.toml");
    fs::write(&path, content).expect("write config");
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    pygmalion()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pygmalion effect survey server"));
}

#[test]
fn version_exits_0() {
    pygmalion()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pygmalion"));
}

#[test]
fn unknown_subcommand_fails() {
    pygmalion().arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. scenarios
// ──────────────────────────────────────────────

#[test]
fn scenarios_lists_builtin_catalog_in_order() {
    let output = pygmalion().arg("scenarios").assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();

    let ids = ["kunstwerk", "aufsatz", "person", "lebenslauf", "produkt"];
    let positions: Vec<usize> = ids
        .iter()
        .map(|id| stdout.find(id).unwrap_or_else(|| panic!("{} missing", id)))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", stdout);
}

#[test]
fn scenarios_json_is_the_full_catalog() {
    let output = pygmalion()
        .args(["scenarios", "--output", "json"])
        .assert()
        .success();
    let json: serde_json::Value =
        serde_json::from_slice(&output.get_output().stdout).expect("stdout is json");

    let scenarios = json.as_array().expect("array");
    assert_eq!(scenarios.len(), 5);
    assert_eq!(scenarios[1]["id"], "aufsatz");
    assert_eq!(scenarios[1]["min_value"], 1);
    assert_eq!(scenarios[1]["max_value"], 6);
    assert!(scenarios[0]["high_label"].is_string());
    assert!(scenarios[0]["low_label"].is_string());
}

#[test]
fn scenarios_respects_config_override() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[scenarios]]
id = "produkt"
title = "Kopfhörer"
question = "Wie hochwertig?"
min_value = 1
max_value = 10
high_label = "Premium"
low_label = "Discount"
"#,
    );

    pygmalion()
        .arg("scenarios")
        .arg("--config")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("produkt"))
        .stdout(predicate::str::contains("Kopfhörer"))
        .stdout(predicate::str::contains("kunstwerk").not());
}

// ──────────────────────────────────────────────
// 3. check
// ──────────────────────────────────────────────

#[test]
fn check_accepts_valid_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server]\nport = 9001\n\n[sink]\nkind = \"memory\"\n");

    pygmalion()
        .arg("check")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"))
        .stdout(predicate::str::contains("5 scenarios"))
        .stdout(predicate::str::contains("sink memory"));
}

#[test]
fn check_json_reports_summary() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let output = pygmalion()
        .args(["--output", "json", "check"])
        .arg(&path)
        .assert()
        .success();
    let json: serde_json::Value =
        serde_json::from_slice(&output.get_output().stdout).expect("stdout is json");
    assert_eq!(json["valid"], true);
    assert_eq!(json["port"], 8080);
    assert_eq!(json["sink"], "supabase");
    assert_eq!(json["scenarios"], 5);
    assert_eq!(json["custom_catalog"], false);
}

#[test]
fn check_rejects_duplicate_scenarios() {
    let dir = TempDir::new().unwrap();
    let scenario = r#"
[[scenarios]]
id = "person"
title = "T"
question = "Q"
min_value = 1
max_value = 10
high_label = "H"
low_label = "L"
"#;
    let path = write_config(&dir, &format!("{}{}", scenario, scenario));

    pygmalion()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("person"));
}

#[test]
fn check_rejects_unknown_keys() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[server]\nportt = 1\n");

    pygmalion()
        .arg("check")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn check_missing_file_fails() {
    pygmalion()
        .args(["check", "does/not/exist.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}

#[test]
fn check_quiet_suppresses_output() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    pygmalion()
        .args(["--quiet", "check"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. serve argument validation
// ──────────────────────────────────────────────

#[test]
fn serve_requires_both_tls_flags() {
    pygmalion()
        .args(["serve", "--memory-sink", "--tls-cert", "cert.pem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tls-cert and --tls-key"));
}

#[test]
fn serve_without_credentials_fails_explicitly() {
    pygmalion()
        .args(["serve", "--port", "1"])
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_ANON_KEY")
        .env_remove("NEXT_PUBLIC_SUPABASE_URL")
        .env_remove("NEXT_PUBLIC_SUPABASE_ANON_KEY")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SUPABASE_URL"));
}
