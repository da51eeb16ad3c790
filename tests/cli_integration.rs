//! CLI integration tests for typings
//!
//! These tests drive the binary end to end. None of them lets a package
//! manager run: `check --install` is only exercised on inactive packages.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the typings binary, isolated from the user's global config
fn typings_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("typings"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("TYPINGS_FORMAT");
    cmd
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Create a temporary directory and initialize a typings workspace
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    typings_cmd(dir.path()).arg("init").arg(dir.path()).assert().success();
    dir
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    typings_cmd(dir.path())
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized typings workspace"));

    assert!(dir.path().join(".typings").is_dir());
    assert!(dir.path().join(".typings/config.toml").is_file());
    assert!(dir.path().join(".typings/.gitignore").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    typings_cmd(dir.path()).arg("init").arg(dir.path()).assert().success();
    typings_cmd(dir.path()).arg("init").arg(dir.path()).assert().success();
}

#[test]
fn test_init_json_output() {
    let dir = TempDir::new().unwrap();

    typings_cmd(dir.path())
        .args(["--format", "json", "init"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\":true"));
}

// =============================================================================
// Check Tests
// =============================================================================

#[test]
fn test_check_reports_missing_typings() {
    let dir = setup_workspace();
    write(
        &dir.path().join("package.json"),
        r#"{"dependencies": {"lodash": "^4.17.0", "express": "^4.0.0"},
            "devDependencies": {"@types/express": "^4.0.0"}}"#,
    );
    write(&dir.path().join("yarn.lock"), "");

    let output = typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["--format", "json", "check"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let project = &json["projects"][0];
    assert_eq!(project["manager"], "yarn");
    assert_eq!(project["manager_source"], "inferred");
    assert_eq!(project["active"], false);
    assert_eq!(project["dev_default"], true);
    assert_eq!(project["missing"], serde_json::json!(["@types/lodash"]));
    assert_eq!(json["missing"], 1);
}

#[test]
fn test_check_text_lists_packages() {
    let dir = setup_workspace();
    write(&dir.path().join("package.json"), r#"{"dependencies": {"lodash": "4"}}"#);
    write(
        &dir.path().join("packages/web/package.json"),
        r#"{"engines": {"pnpm": "8"}}"#,
    );
    write(&dir.path().join("node_modules/lodash/package.json"), "{}");

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("@types/lodash"))
        .stdout(predicate::str::contains("packages/web"))
        .stdout(predicate::str::contains("pnpm (inferred)"))
        .stdout(predicate::str::contains("node_modules").not());
}

#[test]
fn test_check_install_skips_inactive_packages() {
    let dir = setup_workspace();
    write(&dir.path().join("package.json"), r#"{"dependencies": {"lodash": "4"}}"#);

    let output = typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["--format", "json", "check", "--install"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["installed"], 0);
}

#[test]
fn test_check_empty_workspace() {
    let dir = setup_workspace();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages found"));
}

#[test]
fn test_check_rejects_invalid_config() {
    let dir = setup_workspace();
    fs::write(dir.path().join(".typings/config.toml"), "bin = \"bun\"\n").unwrap();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse workspace config"));
}

// =============================================================================
// Daemon Tests
// =============================================================================

#[test]
fn test_daemon_status_stopped() {
    let dir = setup_workspace();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon status: STOPPED"))
        .stdout(predicate::str::contains("Default manager: npm"));
}

#[test]
fn test_daemon_status_json() {
    let dir = setup_workspace();

    let output = typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["--format", "json", "daemon", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["running"], false);
    assert_eq!(json["config"]["debounce_ms"], 500);
}

#[test]
fn test_daemon_stop_when_not_running() {
    let dir = setup_workspace();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[cfg(unix)]
#[test]
fn test_daemon_stop_cleans_stale_pid() {
    let dir = setup_workspace();
    let pid_path = dir.path().join(".typings/daemon.pid");
    fs::write(&pid_path, "99999999").unwrap();

    let output = typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["--format", "json", "daemon", "stop"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "not_running");
    assert_eq!(json["stale_pid"], 99999999);
    assert!(!pid_path.exists());
}

#[test]
fn test_daemon_start_when_disabled() {
    let dir = setup_workspace();
    fs::write(
        dir.path().join(".typings/config.toml"),
        "[daemon]\nenabled = false\n",
    )
    .unwrap();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["daemon", "start", "--foreground"])
        .assert()
        .success()
        .stderr(predicate::str::contains("disabled"));
}

#[test]
fn test_daemon_logs_empty() {
    let dir = setup_workspace();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["daemon", "logs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No daemon logs found"));
}

#[test]
fn test_daemon_logs_tail() {
    let dir = setup_workspace();
    let lines: Vec<String> = (1..=5).map(|i| format!("[2026-01-01 00:00:0{}] INFO line {}", i, i)).collect();
    fs::write(dir.path().join(".typings/daemon.log"), lines.join("\n")).unwrap();

    typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["daemon", "logs", "-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("line 4"))
        .stdout(predicate::str::contains("line 5"))
        .stdout(predicate::str::contains("line 3").not());
}

#[test]
fn test_daemon_logs_tail_json() {
    let dir = setup_workspace();
    fs::write(dir.path().join(".typings/daemon.log"), "one\ntwo\nthree\n").unwrap();

    let output = typings_cmd(dir.path())
        .current_dir(dir.path())
        .args(["--format", "json", "daemon", "logs", "-n", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["logs"], serde_json::json!(["two", "three"]));
    assert_eq!(json["total_lines"], 3);
    assert_eq!(json["showing"], 2);
}
