//! CLI tests for `podrunner run` and `podrunner validate`.
//!
//! Spawns the binary with the local transport and verifies exit codes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use podrunner::exit_codes;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn podrunner(workdir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_podrunner"))
        .current_dir(workdir)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .args(args)
        .output()
        .expect("spawn podrunner")
}

fn run_fixture(workdir: &Path, name: &str) -> Output {
    let path = fixture(name);
    let path = path.to_str().expect("utf-8 fixture path");
    podrunner(workdir, &["run", path, "--local"])
}

#[test]
fn met_expectations_exit_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_fixture(temp.path(), "local_threading.yaml");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{stdout}");
    assert!(stdout.contains("Expectations were met"));
    assert!(stdout.contains("== Successes: 4/0 (success/failure)"));

    let raw = fs::read_to_string(temp.path().join("cat-output.txt")).expect("raw output");
    assert_eq!(raw.lines().count(), 4);
}

#[test]
fn unmet_expectations_exit_non_zero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_fixture(temp.path(), "local_unmet.yaml");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::EXPECTATIONS_NOT_MET),
        "{stdout}"
    );
    assert!(stdout.contains("Expectations were not met"));
    assert!(stdout.contains("Actual value=two"));
}

#[test]
fn invalid_definition_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_fixture(temp.path(), "invalid_range.yaml");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exceeds config.nodes"), "{stderr}");
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("podrunner.toml"), "transport = \"carrier-pigeon\"\n")
        .expect("write config");
    let output = run_fixture(temp.path(), "local_threading.yaml");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn missing_explicit_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let definition = fixture("local_threading.yaml");
    let output = podrunner(
        temp.path(),
        &[
            "run",
            definition.to_str().expect("utf-8"),
            "--local",
            "--config",
            "does-not-exist.toml",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist.toml"), "{stderr}");
    assert!(!temp.path().join("cat-output.txt").exists());
}

#[test]
fn config_file_selects_local_transport() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("runner.toml");
    fs::write(&config, "transport = \"local\"\n[execution]\nmax_parallel_nodes = 1\n")
        .expect("write config");
    let definition = fixture("local_threading.yaml");
    let output = podrunner(
        temp.path(),
        &[
            "run",
            definition.to_str().expect("utf-8"),
            "--config",
            config.to_str().expect("utf-8"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}

#[test]
fn validate_prints_plan() {
    let temp = tempfile::tempdir().expect("tempdir");
    let definition = fixture("local_threading.yaml");
    let output = podrunner(
        temp.path(),
        &["validate", definition.to_str().expect("utf-8")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("test: local-threading"));
    assert!(stdout.contains("invocations per repetition: 3"));
}

#[test]
fn bundled_definitions_validate() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("definitions");
    for entry in fs::read_dir(&dir).expect("definitions dir") {
        let path = entry.expect("entry").path();
        let output = podrunner(
            temp.path(),
            &["validate", path.to_str().expect("utf-8")],
        );
        assert_eq!(
            output.status.code(),
            Some(exit_codes::OK),
            "{}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}
