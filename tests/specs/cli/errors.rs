//! CLI error reporting specs

use crate::prelude::*;

#[test]
fn missing_plan_file_is_a_clean_error() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path())
        .args(&["validate", "--plan", "does-not-exist.toml"])
        .fails()
        .stderr_has("does-not-exist.toml");
}

#[test]
fn malformed_plan_reports_the_parse_error() {
    let (dir, plan) = plan_fixture("[[task]\nbroken");
    gaffer(dir.path())
        .args(&["validate", "--plan", &plan.to_string_lossy()])
        .fails()
        .stderr_has("malformed plan");
}

#[test]
fn empty_plan_is_rejected() {
    let (dir, plan) = plan_fixture("# nothing here\n");
    gaffer(dir.path())
        .args(&["validate", "--plan", &plan.to_string_lossy()])
        .fails()
        .stderr_has("no tasks");
}

#[test]
fn unknown_subcommand_fails() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path()).args(&["frobnicate"]).fails();
}

#[test]
fn run_requires_a_plan_flag() {
    let dir = tempfile::tempdir().unwrap();
    gaffer(dir.path()).args(&["run"]).fails().stderr_has("--plan");
}
