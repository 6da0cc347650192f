//! Plan validation specs

use crate::prelude::*;

#[test]
fn valid_plan_prints_execution_order() {
    let (dir, plan) = plan_fixture(VALID_PLAN);
    gaffer(dir.path())
        .args(&["validate", "--plan", &plan.to_string_lossy()])
        .passes()
        .stdout_has("plan is valid")
        .stdout_has("build")
        .stdout_has("verify");
}

#[test]
fn dependencies_come_first_in_the_order() {
    let (dir, plan) = plan_fixture(VALID_PLAN);
    let output = gaffer(dir.path())
        .args(&["run", "--plan", &plan.to_string_lossy(), "--dry-run"])
        .passes();
    // Dry run prints one id per line in execution order.
    output.stdout_has("build\nverify");
}

#[test]
fn cyclic_plan_is_rejected_with_participants() {
    let (dir, plan) = plan_fixture(CYCLIC_PLAN);
    gaffer(dir.path())
        .args(&["validate", "--plan", &plan.to_string_lossy()])
        .fails()
        .stderr_has("cycle")
        .stderr_has("a")
        .stderr_has("b");
}

#[test]
fn missing_dependency_is_rejected() {
    let (dir, plan) = plan_fixture(
        r#"
[[task]]
id = "a"
role = "general"
prompt = "p"
depends_on = ["ghost"]
"#,
    );
    gaffer(dir.path())
        .args(&["validate", "--plan", &plan.to_string_lossy()])
        .fails()
        .stderr_has("ghost");
}
