//! CLI help output specs

use crate::prelude::*;

#[test]
fn help_shows_usage_and_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path())
        .args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("run")
        .stdout_has("validate")
        .stdout_has("resume");
}

#[test]
fn run_help_shows_flags() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path())
        .args(&["run", "--help"])
        .passes()
        .stdout_has("--plan")
        .stdout_has("--base")
        .stdout_has("--concurrency")
        .stdout_has("--dry-run");
}

#[test]
fn version_prints_version() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path()).args(&["--version"]).passes().stdout_has("0.1");
}
