// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gf_core::TaskId;

const PLAN: &str = r#"
[[task]]
id = "api"
role = "coder"
prompt = "Implement the endpoint"
writes_files = ["src/api.rs"]

[[task]]
id = "api-tests"
name = "Test the endpoint"
role = "tester"
prompt = "Write tests"
depends_on = ["api"]
failure_mode = "soft"
"#;

#[test]
fn parses_tasks_with_defaults() {
    let tasks = parse_plan(PLAN).unwrap();
    assert_eq!(tasks.len(), 2);

    let api = &tasks[0];
    assert_eq!(api.id, "api");
    assert_eq!(api.name, "api", "name defaults to id");
    assert_eq!(api.failure_mode, FailureMode::Hard);
    assert_eq!(api.writes_files, vec![PathBuf::from("src/api.rs")]);

    let tests = &tasks[1];
    assert_eq!(tests.name, "Test the endpoint");
    assert_eq!(tests.depends_on, vec![TaskId::new("api")]);
    assert_eq!(tests.failure_mode, FailureMode::Soft);
}

#[test]
fn empty_plan_is_an_error() {
    assert!(matches!(parse_plan(""), Err(PlanError::Empty)));
}

#[test]
fn unknown_fields_are_rejected() {
    let err = parse_plan(
        r#"
[[task]]
id = "a"
role = "coder"
prompt = "p"
retires = 3
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PlanError::Parse(_)));
    assert!(err.to_string().contains("retires"));
}

#[test]
fn missing_required_field_is_descriptive() {
    let err = parse_plan(
        r#"
[[task]]
id = "a"
prompt = "p"
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("role"));
}

#[test]
fn load_plan_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_plan(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, PlanError::Read { .. }));
}
