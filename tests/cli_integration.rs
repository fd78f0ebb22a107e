//! CLI Integration Tests
//!
//! These tests drive the `mkvs` binary end-to-end, one process per command,
//! the way a shell script would.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

use std::process::Command;
use tempfile::tempdir;

/// Run mkvs and return (stdout, stderr, success)
fn run_mkvs(args: &[&str], db_path: &str) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_mkvs"))
        .args(["-d", db_path, "-f", "json"])
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute mkvs");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout.trim()).expect("stdout is not JSON")
}

fn init_db() -> (tempfile::TempDir, String) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.mkvs");
    let db_str = db_path.to_str().unwrap().to_string();
    let (_, stderr, success) = run_mkvs(&["init"], &db_str);
    assert!(success, "init failed: {}", stderr);
    (dir, db_str)
}

// ============================================================================
// Database Initialization Tests
// ============================================================================

#[test]
fn test_cli_init_creates_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state.mkvs");
    let db_str = db_path.to_str().unwrap();

    let (stdout, stderr, success) = run_mkvs(&["init"], db_str);
    assert!(success, "init failed: {}", stderr);
    assert_eq!(json(&stdout)["status"], "ok");
    assert!(db_path.exists());
    assert!(dir.path().join("state.mkvs.config").exists());
}

#[test]
fn test_cli_init_keeps_existing_database() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "kept", "yes"], &db);

    let (stdout, _, success) = run_mkvs(&["init"], &db);
    assert!(!success, "second init must not truncate");
    assert_eq!(json(&stdout)["status"], "error");
    let (stdout, _, success) = run_mkvs(&["get", "kept"], &db);
    assert!(success);
    assert_eq!(json(&stdout)["value"], "yes");

    let (_, stderr, success) = run_mkvs(&["init", "--force"], &db);
    assert!(success, "forced init failed: {}", stderr);
    let (_, _, success) = run_mkvs(&["get", "kept"], &db);
    assert!(!success);
}

#[test]
fn test_cli_init_rejects_bad_compression_level() {
    let dir = tempdir().unwrap();
    let db_str = dir.path().join("state.mkvs").to_str().unwrap().to_string();

    let (_, _, success) = run_mkvs(&["init", "--compression-level", "40"], &db_str);
    assert!(!success);
}

// ============================================================================
// Key-Value Tests
// ============================================================================

#[test]
fn test_cli_insert_and_get() {
    let (_dir, db) = init_db();

    let (stdout, stderr, success) = run_mkvs(&["insert", "key 0", "value 0"], &db);
    assert!(success, "insert failed: {}", stderr);
    let out = json(&stdout);
    assert_eq!(out["status"], "ok");
    assert_eq!(out["version"], 0);

    let (stdout, _, success) = run_mkvs(&["get", "key 0"], &db);
    assert!(success);
    assert_eq!(json(&stdout)["value"], "value 0");
}

#[test]
fn test_cli_get_missing_key() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "present", "yes"], &db);

    let (stdout, _, success) = run_mkvs(&["get", "absent"], &db);
    assert!(!success);
    assert_eq!(json(&stdout)["status"], "error");
}

#[test]
fn test_cli_remove() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "a", "1"], &db);
    run_mkvs(&["insert", "b", "2"], &db);

    let (stdout, _, success) = run_mkvs(&["remove", "a"], &db);
    assert!(success);
    assert_eq!(json(&stdout)["removed"], true);

    let (_, _, success) = run_mkvs(&["get", "a"], &db);
    assert!(!success);
    let (stdout, _, _) = run_mkvs(&["get", "b"], &db);
    assert_eq!(json(&stdout)["value"], "2");

    let (stdout, _, success) = run_mkvs(&["remove", "a"], &db);
    assert!(success);
    let out = json(&stdout);
    assert_eq!(out["removed"], false);
    assert_eq!(out["changed"], false);
    assert_eq!(out["version"], 2);
}

#[test]
fn test_cli_unchanged_write_records_no_version() {
    let (_dir, db) = init_db();

    let (stdout, _, _) = run_mkvs(&["insert", "k", "v"], &db);
    let first = json(&stdout);
    assert_eq!(first["changed"], true);
    assert_eq!(first["version"], 0);

    let (stdout, stderr, success) = run_mkvs(&["insert", "k", "v"], &db);
    assert!(success, "insert failed: {}", stderr);
    let again = json(&stdout);
    assert_eq!(again["changed"], false);
    assert_eq!(again["version"], 0);
    assert_eq!(again["root"], first["root"]);

    let (stdout, _, _) = run_mkvs(&["status"], &db);
    assert_eq!(json(&stdout)["roots"], 1);
}

#[test]
fn test_cli_hex_keys() {
    let (_dir, db) = init_db();

    let (_, stderr, success) = run_mkvs(&["--hex", "insert", "00ff", "deadbeef"], &db);
    assert!(success, "insert failed: {}", stderr);

    let (stdout, _, success) = run_mkvs(&["--hex", "get", "00ff"], &db);
    assert!(success);
    assert_eq!(json(&stdout)["value"], "deadbeef");

    let (_, _, success) = run_mkvs(&["--hex", "get", "not hex"], &db);
    assert!(!success);
}

// ============================================================================
// Versioning Tests
// ============================================================================

#[test]
fn test_cli_each_write_is_a_version() {
    let (_dir, db) = init_db();

    let (_, _, success) = run_mkvs(&["root"], &db);
    assert!(!success, "fresh database has no root");

    for i in 0..3 {
        let key = format!("key {}", i);
        let value = format!("value {}", i);
        run_mkvs(&["insert", &key, &value], &db);
    }

    let (stdout, _, success) = run_mkvs(&["root"], &db);
    assert!(success);
    let latest = json(&stdout);
    assert_eq!(latest["version"], 2);

    let (stdout, _, success) = run_mkvs(&["root", "--version", "0"], &db);
    assert!(success);
    let first = json(&stdout);
    assert_eq!(first["version"], 0);
    assert_ne!(first["root"], latest["root"]);
}

#[test]
fn test_cli_ten_key_root() {
    let (_dir, db) = init_db();
    for i in 0..10 {
        let key = format!("key {}", i);
        let value = format!("value {}", i);
        run_mkvs(&["insert", &key, &value], &db);
    }

    // every key survives the per-command reopen
    for i in 0..10 {
        let key = format!("key {}", i);
        let (stdout, _, success) = run_mkvs(&["get", &key], &db);
        assert!(success, "missing {}", key);
        assert_eq!(json(&stdout)["value"], format!("value {}", i));
    }
}

#[test]
fn test_cli_namespaces_are_separate() {
    let (_dir, db) = init_db();
    let other = "11".repeat(32);

    run_mkvs(&["insert", "shared", "default"], &db);
    run_mkvs(&["-n", &other, "insert", "shared", "other"], &db);

    let (stdout, _, _) = run_mkvs(&["get", "shared"], &db);
    assert_eq!(json(&stdout)["value"], "default");
    let (stdout, _, _) = run_mkvs(&["-n", &other, "get", "shared"], &db);
    assert_eq!(json(&stdout)["value"], "other");

    let (stdout, _, _) = run_mkvs(&["-n", &other, "root"], &db);
    assert_eq!(json(&stdout)["version"], 0);
}

// ============================================================================
// Proof Tests
// ============================================================================

fn prove(db: &str, key: &str) -> (String, String) {
    let (stdout, stderr, success) = run_mkvs(&["prove", key], db);
    assert!(success, "prove failed: {}", stderr);
    let out = json(&stdout);
    (
        out["root"].as_str().unwrap().to_string(),
        out["proof"].as_str().unwrap().to_string(),
    )
}

#[test]
fn test_cli_prove_and_verify() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "alpha", "1"], &db);
    run_mkvs(&["insert", "beta", "2"], &db);

    let (root, proof) = prove(&db, "alpha");
    let (stdout, stderr, success) = run_mkvs(&["verify", "--root", &root, &proof, "alpha"], &db);
    assert!(success, "verify failed: {}", stderr);
    let out = json(&stdout);
    assert_eq!(out["valid"], true);
    assert_eq!(out["present"], true);
    assert_eq!(out["value"], "1");
}

#[test]
fn test_cli_verify_absence() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "alpha", "1"], &db);
    run_mkvs(&["insert", "beta", "2"], &db);

    let (root, proof) = prove(&db, "gamma");
    let (stdout, _, success) = run_mkvs(&["verify", "--root", &root, &proof, "gamma"], &db);
    assert!(success);
    let out = json(&stdout);
    assert_eq!(out["present"], false);
    assert!(out["value"].is_null());
}

#[test]
fn test_cli_verify_rejects_stale_root() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "alpha", "1"], &db);
    let (old_root, _) = prove(&db, "alpha");

    run_mkvs(&["insert", "alpha", "2"], &db);
    let (_, proof) = prove(&db, "alpha");

    let (stdout, _, success) = run_mkvs(&["verify", "--root", &old_root, &proof], &db);
    assert!(!success);
    assert_eq!(json(&stdout)["valid"], false);
}

#[test]
fn test_cli_prove_without_commits() {
    let (_dir, db) = init_db();
    let (_, _, success) = run_mkvs(&["prove", "anything"], &db);
    assert!(!success);
}

// ============================================================================
// Status Tests
// ============================================================================

#[test]
fn test_cli_status() {
    let (_dir, db) = init_db();
    run_mkvs(&["insert", "k", "v"], &db);

    let (stdout, _, success) = run_mkvs(&["status"], &db);
    assert!(success);
    let out = json(&stdout);
    assert_eq!(out["version"], 0);
    assert_eq!(out["nodes"], 1);
    assert_eq!(out["roots"], 1);
    assert_eq!(out["namespace"], "00".repeat(32));
}

#[test]
fn test_cli_text_format() {
    let (_dir, db) = init_db();
    let output = Command::new(env!("CARGO_BIN_EXE_mkvs"))
        .args(["-d", &db, "-f", "text", "status"])
        .output()
        .expect("Failed to execute mkvs");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().count() > 1, "text output is pretty-printed");
}
