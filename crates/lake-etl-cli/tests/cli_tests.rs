//! CLI integration tests for lake-etl.
//!
//! These tests verify argument parsing, help output, and exit codes for
//! error conditions that are reached before any database is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the lake-etl binary with a clean environment.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("lake-etl").unwrap();
    for var in [
        "DUCKDB_PATH",
        "DATABASE_URL",
        "POSTGRES_URL",
        "PG_URL",
        "FLY_ALLOC_ID",
        "FLY_APP_NAME",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lake-etl"));
}

#[test]
fn test_global_flags_listed() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("--verbosity"));
}

#[test]
fn test_run_takes_no_flags() {
    cmd()
        .args(["run", "--batch-size", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected argument"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_duckdb_file_exits_with_code_3() {
    cmd()
        .env("DUCKDB_PATH", "/nonexistent/ecfr_analytics.duckdb")
        .arg("run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("database file not found"));
}

#[test]
fn test_verify_missing_duckdb_file_exits_with_code_3() {
    cmd()
        .env("DUCKDB_PATH", "/nonexistent/ecfr_analytics.duckdb")
        .arg("verify")
        .assert()
        .code(3);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(2);
}

#[test]
fn test_zero_batch_size_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "etl:").unwrap();
    writeln!(file, "  batch_size: 0").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("batch_size"));
}

#[test]
fn test_bad_ssl_mode_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  url: postgresql://u:p@localhost/db").unwrap();
    writeln!(file, "  ssl_mode: sometimes").unwrap();

    cmd()
        .args(["-c", file.path().to_str().unwrap(), "verify"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/lake-etl.yaml", "run"])
        .assert()
        .failure();
}
