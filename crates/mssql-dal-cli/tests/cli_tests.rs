//! CLI integration tests for mssql-dal.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration and connection failures.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the mssql-dal binary, isolated from the caller's environment.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("mssql-dal").unwrap();
    cmd.env_remove("ConnectionString");
    cmd
}

/// A server address nothing listens on, so connecting fails fast.
const UNREACHABLE: &str = "Server=127.0.0.1,1;Database=Shop;User Id=sa;Password=x;Encrypt=false";

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create-database"))
        .stdout(predicate::str::contains("create-table"))
        .stdout(predicate::str::contains("alter-table"))
        .stdout(predicate::str::contains("insert"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("get-table"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_insert_subcommand_help() {
    cmd()
        .args(["insert", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--parent"))
        .stdout(predicate::str::contains("<TABLE>"))
        .stdout(predicate::str::contains("<COLUMNS>"))
        .stdout(predicate::str::contains("<VALUES>"));
}

#[test]
fn test_get_table_subcommand_help() {
    cmd()
        .args(["get-table", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--query"))
        .stdout(predicate::str::contains("--read-only"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mssql-dal"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--connection-string"))
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--propagate-errors"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1) and IO Errors (Exit Code 7)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_required_fields_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "connection:").unwrap();
    writeln!(file, "  host: localhost").unwrap();
    writeln!(file, "  database: \"\"").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_bad_connection_string_exits_with_code_1() {
    cmd()
        .args(["--connection-string", "Server=h,notaport;Database=d", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid port"));
}

#[test]
fn test_env_connection_string_used_when_config_missing() {
    cmd()
        .env("ConnectionString", "Server=h;User Id=u")
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("connection.database is required"));
}

// =============================================================================
// Error Policy Tests
// =============================================================================

#[test]
fn test_health_check_unreachable_exits_with_code_2() {
    cmd()
        .args(["--connection-string", UNREACHABLE, "health-check"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("FAILED"));
}

#[test]
fn test_swallowed_fault_still_succeeds() {
    cmd()
        .args(["--connection-string", UNREACHABLE, "--output-json"])
        .args(["insert", "Customers", "Id, Name", "1, 'Ann'"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""result":0"#))
        .stderr(predicate::str::contains("Connection error"));
}

#[test]
fn test_propagated_fault_exits_with_code_2() {
    cmd()
        .args(["--connection-string", UNREACHABLE, "--propagate-errors"])
        .args(["update", "Customers", "Name = 'x'", "Id = 1"])
        .assert()
        .code(2);
}

// =============================================================================
// No Subcommand Tests
// =============================================================================

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
