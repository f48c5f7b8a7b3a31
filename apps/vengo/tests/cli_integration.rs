#![warn(clippy::pedantic)]

//! Integration tests for the vengo binary.
//!
//! Each test spawns the compiled executable against a temporary cache root
//! and checks stdout, stderr and the exit code. None of them needs network
//! access: every path exercised here fails or succeeds before a request is
//! made.

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn vengo(root: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vengo"));
    cmd.env_remove("VENGO_HOME")
        .env_remove("VENGO_TAGS_URL")
        .env_remove("VENGO_ARCHIVE_HOST")
        .env_remove("RUST_LOG")
        .arg("--cache-dir")
        .arg(root.path());
    cmd
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vengo"));
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("tags"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("VENGO_HOME"));
}

#[test]
fn install_help_shows_sources() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vengo"));
    cmd.args(["install", "--help"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("archive"))
        .stdout(predicate::str::contains("mercurial"))
        .stdout(predicate::str::contains("--no-build"));
}

#[test]
fn install_requires_version() {
    let temp = assert_fs::TempDir::new().unwrap();
    vengo(&temp).arg("install").assert().failure();
}

#[test]
fn list_on_empty_cache() {
    let temp = assert_fs::TempDir::new().unwrap();

    vengo(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No Go versions installed"));
}

#[test]
fn list_shows_entries_and_compiled_flag() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("go1.3/go/src").create_dir_all().unwrap();
    temp.child(format!("go1.4/go/bin/go{}", std::env::consts::EXE_SUFFIX))
        .touch()
        .unwrap();
    temp.child("mercurial/.hg").create_dir_all().unwrap();
    temp.child("logs/build-go.log").touch().unwrap();

    vengo(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("go1.3"))
        .stdout(predicate::str::is_match(r"go1\.4\s+\(compiled\)").unwrap())
        .stdout(predicate::str::contains("mercurial").not())
        .stdout(predicate::str::contains("logs").not());
}

#[test]
fn list_as_json() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("go1.2/go/src").create_dir_all().unwrap();

    let output = vengo(&temp).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let installed = value["installed"].as_array().unwrap();
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0]["version"], "go1.2");
    assert_eq!(installed[0]["compiled"], false);
    assert!(value.get("available").is_none());
}

#[test]
fn list_installed_flag_is_accepted() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("go1.3/go/src").create_dir_all().unwrap();

    for flag in ["-i", "--installed", "--installed=true"] {
        vengo(&temp)
            .args(["list", flag])
            .assert()
            .success()
            .stdout(predicate::str::contains("go1.3"));
    }
}

#[test]
fn list_installed_can_be_turned_off() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("go1.3/go/src").create_dir_all().unwrap();

    let output = vengo(&temp)
        .args(["list", "--installed=false", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value.get("installed").is_none());
    assert!(value.get("available").is_none());
}

#[test]
fn install_rejects_path_like_version() {
    let temp = assert_fs::TempDir::new().unwrap();

    vengo(&temp)
        .args(["install", "../escape"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a recognised Go version"));
}

#[test]
fn archive_install_without_checksum_is_refused() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("config.toml")
        .write_str("checksum_index_url = \"\"\n")
        .unwrap();

    vengo(&temp)
        .args(["install", "1.4"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no checksum registered for go1.4"));

    temp.child("go1.4").assert(predicate::path::missing());
}

#[test]
fn archive_install_of_tip_is_invalid() {
    let temp = assert_fs::TempDir::new().unwrap();

    vengo(&temp)
        .args(["install", "tip", "--source", "archive"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not a recognised Go version"));
}

#[test]
fn missing_mercurial_is_fatal() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("config.toml")
        .write_str("vcs_binary = \"vengo-test-no-such-hg\"\n")
        .unwrap();

    vengo(&temp)
        .args(["install", "tip", "--source", "mercurial"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "vengo-test-no-such-hg is not installed",
        ));
}

#[test]
fn malformed_config_is_reported() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("config.toml")
        .write_str("unknown_key = 1\n")
        .unwrap();

    vengo(&temp)
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn cache_root_from_environment() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("go1.3/go/src").create_dir_all().unwrap();

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vengo"));
    cmd.env("VENGO_HOME", temp.path()).arg("list");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("go1.3"));
}
