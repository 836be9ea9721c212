//! Integration tests for CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn texrun() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("texrun"))
}

fn write_blocks(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.join("blocks.jsonl");
    fs::write(&path, lines.join("\n")).expect("write blocks");
    path
}

const HELLO: &str =
    r#"{"family":"sh","session":"main","instance":"0","command":"code","code":"echo hello"}"#;
const FAIL: &str =
    r#"{"family":"sh","session":"broken","instance":"0","command":"code","code":"exit 2"}"#;

#[test]
fn test_cli_version() {
    let mut cmd = texrun();
    cmd.arg("--version");
    cmd.assert().success().stdout(predicate::str::contains("texrun"));
}

#[test]
fn test_cli_help() {
    let mut cmd = texrun();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Incremental execution cache"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("clean"));
}

#[test]
fn test_run_requires_blocks() {
    let mut cmd = texrun();
    cmd.arg("run");
    cmd.assert().failure().stderr(predicate::str::contains("--blocks"));
}

#[test]
fn test_run_rejects_invalid_policy() {
    let tmp = TempDir::new().expect("tmp");
    let blocks = write_blocks(tmp.path(), &[HELLO]);
    let mut cmd = texrun();
    cmd.args(["run", "--rerun", "sometimes", "--blocks"]).arg(&blocks);
    cmd.assert().failure().stderr(predicate::str::contains("Invalid rerun policy"));
}

#[test]
fn test_run_reports_malformed_blocks() {
    let tmp = TempDir::new().expect("tmp");
    let blocks = write_blocks(tmp.path(), &["{\"family\":\"sh\"}"]);
    let mut cmd = texrun();
    cmd.args(["run", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    cmd.assert().failure().stderr(predicate::str::contains("input line 1"));
}

#[cfg(unix)]
#[test]
fn test_run_then_rerun_uses_cache() {
    let tmp = TempDir::new().expect("tmp");
    let blocks = write_blocks(tmp.path(), &[HELLO]);

    let mut first = texrun();
    first.args(["run", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    first
        .assert()
        .success()
        .stdout(predicate::str::contains("Build complete"))
        .stdout(predicate::str::contains("1 executed"));
    let output = tmp.path().join("texrun-files").join("sh_main_default_0.stdout");
    assert_eq!(fs::read_to_string(output).expect("output"), "hello\n");

    let mut second = texrun();
    second.args(["run", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    second
        .assert()
        .success()
        .stdout(predicate::str::contains("0 executed, 1 cached"))
        .stdout(predicate::str::contains("(unchanged)"));
}

#[cfg(unix)]
#[test]
fn test_error_exit_code() {
    let tmp = TempDir::new().expect("tmp");
    let blocks = write_blocks(tmp.path(), &[HELLO, FAIL]);

    let mut lenient = texrun();
    lenient.args(["run", "--json", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    lenient.assert().success().stdout(predicate::str::contains("\"executed\": 2"));

    let mut strict = texrun();
    strict
        .args(["run", "--error-exit-code", "--root"])
        .arg(tmp.path())
        .arg("--blocks")
        .arg(&blocks);
    strict.assert().failure().stderr(predicate::str::contains("error(s) remain"));
}

#[cfg(unix)]
#[test]
fn test_config_file_sets_output_dir() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(tmp.path().join("texrun.toml"), "[texrun]\noutput_dir = 'build'\njobname = 'paper'\n")
        .expect("config");
    let blocks = write_blocks(tmp.path(), &[HELLO]);

    let mut cmd = texrun();
    cmd.args(["run", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    cmd.assert().success();
    assert!(tmp.path().join("build").join("paper.store.json").exists());
    assert!(tmp.path().join("build").join("paper.macros").exists());
}

#[cfg(unix)]
#[test]
fn test_info_and_clean() {
    let tmp = TempDir::new().expect("tmp");
    let blocks = write_blocks(tmp.path(), &[HELLO]);

    let mut missing = texrun();
    missing.args(["info", "--root"]).arg(tmp.path());
    missing.assert().success().stdout(predicate::str::contains("No store"));

    let mut run = texrun();
    run.args(["run", "--root"]).arg(tmp.path()).arg("--blocks").arg(&blocks);
    run.assert().success();

    let mut info = texrun();
    info.args(["info", "--sessions", "--root"]).arg(tmp.path());
    info.assert()
        .success()
        .stdout(predicate::str::contains("Sessions:         1"))
        .stdout(predicate::str::contains("sh#main#default"));

    let mut clean = texrun();
    clean.args(["clean", "--root"]).arg(tmp.path());
    clean.assert().success().stdout(predicate::str::contains("Removed"));

    let out_dir = tmp.path().join("texrun-files");
    assert!(!out_dir.join("texrun.store.json").exists());
    assert!(!out_dir.join("sh_main_default_0.stdout").exists());
}
