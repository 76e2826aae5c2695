#[path = "common.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

/// Run `bspb` with a config file whose daemon directory lives in `dir`.
fn bspb(dir: &Path, config: &serde_json::Value) -> assert_cmd::Command {
    let mut config = config.clone();
    config["daemonDir"] = json!(dir);
    let path = common::write_config(dir, &config);

    let mut cmd = cargo_bin_cmd!("bspb");
    cmd.arg("--config").arg(path).arg("--workspace").arg(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    cargo_bin_cmd!("bspb")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("connect"))
        .stdout(predicate::str::contains("reconcile"));
}

#[test]
fn test_yes_and_no_are_exclusive() {
    cargo_bin_cmd!("bspb").args(["--yes", "--no", "status"]).assert().failure();
}

#[test]
fn test_config_prints_socket_for_this_process() {
    let tmp = TempDir::new().unwrap();
    bspb(tmp.path(), &json!({ "daemonVersion": "1.5.0" }))
        .args(["--format", "json", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("proc-"))
        .stdout(predicate::str::contains("\"version\": \"1.5.0\""));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    cargo_bin_cmd!("bspb")
        .arg("--config")
        .arg(&path)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[cfg(unix)]
#[test]
fn test_status_without_daemon() {
    let tmp = TempDir::new().unwrap();
    let address = format!("unix:{}", tmp.path().join("nobody.sock").display());
    bspb(tmp.path(), &json!({ "daemonAddress": address }))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[cfg(unix)]
mod with_daemon {
    use super::*;
    use common::FakeDaemon;

    /// Run a blocking command while the fake daemon serves on the runtime.
    async fn run(cmd: assert_cmd::Command) -> std::process::Output {
        let mut cmd = cmd;
        tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_version() {
        let tmp = TempDir::new().unwrap();
        let daemon = FakeDaemon::spawn(tmp.path(), "2.0.0");
        let mut cmd = bspb(tmp.path(), &json!({ "daemonAddress": daemon.address() }));
        cmd.args(["--format", "json", "status"]);

        let output = run(cmd).await;
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success(), "status failed: {stdout}");

        let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
        assert_eq!(value["state"], "running");
        assert_eq!(value["daemon"]["version"], "2.0.0");
    }

    #[tokio::test]
    async fn test_shutdown_stops_daemon() {
        let tmp = TempDir::new().unwrap();
        let daemon = FakeDaemon::spawn(tmp.path(), "2.0.0");
        let mut cmd = bspb(tmp.path(), &json!({ "daemonAddress": daemon.address() }));
        cmd.arg("shutdown");

        let output = run(cmd).await;
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("Build server stopped"));
    }

    #[tokio::test]
    async fn test_reconcile_declined() {
        let tmp = TempDir::new().unwrap();
        let daemon = FakeDaemon::spawn(tmp.path(), "1.3.0");
        let previous = tmp.path().join("previous.json");
        std::fs::write(&previous, "{}").unwrap();

        let mut cmd = bspb(
            tmp.path(),
            &json!({ "daemonAddress": daemon.address(), "daemonVersion": "1.4.0" }),
        );
        cmd.arg("--no").arg("reconcile").arg("--previous").arg(&previous);

        let output = run(cmd).await;
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("Restart skipped"));
    }
}
