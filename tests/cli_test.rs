//! CLI smoke tests. Commands run against a throwaway home directory so no
//! real user state is touched; nothing here reaches the network.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("switchyard").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("XDG_DATA_HOME", home.path().join(".local/share"))
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("SWITCHYARD_CONFIG");
    cmd
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("route"))
        .stdout(predicate::str::contains("audit"))
        .stdout(predicate::str::contains("budget"));
}

#[test]
fn completions_generate() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("switchyard"));
}

#[test]
fn audit_verify_on_empty_chain_succeeds() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["audit", "verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));
}

#[test]
fn audit_list_on_empty_chain_succeeds() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["audit", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("empty"));
}

#[test]
fn budget_reports_untouched_identity() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["budget", "--identity", "u1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("u1"))
        .stdout(predicate::str::contains("$25.00"));
}

#[test]
fn status_runs_without_probe() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("audit chain"));
}

#[test]
fn route_without_keys_fails_with_config_error() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .args(["route", "--identity", "u1", "--input", "hi"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("API key"));
}

#[test]
fn route_rejects_unknown_class() {
    let home = TempDir::new().unwrap();
    cmd(&home)
        .env("ANTHROPIC_API_KEY", "dummy")
        .args([
            "route",
            "--identity",
            "u1",
            "--input",
            "hi",
            "--class",
            "paint",
        ])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("unknown operation class"));
}

#[test]
fn json_status_is_machine_readable() {
    let home = TempDir::new().unwrap();
    let output = cmd(&home).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(parsed["audit_valid"].as_bool().unwrap());
}
