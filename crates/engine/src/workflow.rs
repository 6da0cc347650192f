// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow follow-ups: role chains spawn successor tasks on completion.
//!
//! A workflow is an ordered list of roles (`coder -> reviewer ->
//! tester`). When a task completes and its role is a non-terminal step
//! of a workflow, a follow-up task for the next role is spawned,
//! depending on the completed task. Cycle checking happens at spawn
//! time, when the runner adds the follow-up to the DAG.

use gf_core::{Config, FailureMode, Task, TaskId};

/// One role chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<String>,
}

/// Spawns follow-up tasks from workflow definitions.
#[derive(Debug, Clone, Default)]
pub struct WorkflowManager {
    workflows: Vec<Workflow>,
}

impl WorkflowManager {
    pub fn new(workflows: Vec<Workflow>) -> Self {
        Self { workflows }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut workflows: Vec<Workflow> = config
            .workflows
            .iter()
            .map(|(name, wf)| Workflow {
                name: name.clone(),
                steps: wf.steps.iter().map(|s| s.agent.clone()).collect(),
            })
            .collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        Self { workflows }
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// Follow-up tasks for a completed parent. Every workflow in which
    /// the parent's role appears as a non-terminal step contributes its
    /// next role; duplicates (same follow-up id) collapse into one.
    pub fn follow_ups(&self, parent: &Task) -> Vec<Task> {
        let mut spawned: Vec<Task> = Vec::new();
        for workflow in &self.workflows {
            for window in workflow.steps.windows(2) {
                let [step, next] = window else { continue };
                if *step != parent.role {
                    continue;
                }
                let id = TaskId::new(format!("{}-{}", parent.id, next));
                if spawned.iter().any(|t| t.id == id) {
                    continue;
                }
                spawned.push(build_follow_up(parent, next, id));
            }
        }
        spawned
    }
}

fn build_follow_up(parent: &Task, role: &str, id: TaskId) -> Task {
    let mut task = Task::new(
        id,
        format!("{} ({role})", parent.name),
        role,
        follow_up_prompt(parent, role),
    )
    .with_deps([parent.id.clone()])
    .with_failure_mode(default_failure_mode(role));
    // Conservative default: inherit the parent's write set so the
    // follow-up excludes concurrent writers of the same files.
    task.writes_files = parent.writes_files.clone();
    task
}

/// Reviewers advise; testers gate.
fn default_failure_mode(role: &str) -> FailureMode {
    match role {
        "reviewer" => FailureMode::Soft,
        "tester" => FailureMode::Hard,
        _ => FailureMode::Hard,
    }
}

fn follow_up_prompt(parent: &Task, role: &str) -> String {
    format!(
        "You are the {role} for the task \"{name}\".\n\n\
         The previous agent ({parent_role}) reported:\n\n{result}\n\n\
         Continue from that work in this repository.",
        name = parent.name,
        parent_role = parent.role,
        result = parent.result,
    )
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
