// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task: the unit of work in a plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

crate::define_id! {
    /// Unique identifier for a task within a plan.
    ///
    /// Task IDs double as worktree directory names and branch suffixes,
    /// so they should be short and filesystem-safe.
    pub struct TaskId;
}

/// Per-task policy governing whether its failure blocks dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Failure blocks every dependent forever.
    #[default]
    Hard,
    /// Dependents may run even if this task failed.
    Soft,
    /// Failure is recorded but treated as resolved for dependents.
    Skip,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Hard => write!(f, "hard"),
            FailureMode::Soft => write!(f, "soft"),
            FailureMode::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(FailureMode::Hard),
            "soft" => Ok(FailureMode::Soft),
            "skip" => Ok(FailureMode::Skip),
            other => Err(format!("unknown failure mode: {other}")),
        }
    }
}

/// Stored status of a task.
///
/// Eligibility is never stored; it is derived from dependency statuses
/// by the DAG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies (or for a worker slot).
    #[default]
    Pending,
    /// An agent is executing this task.
    Running,
    /// Finished successfully; result holds the agent's reply.
    Completed,
    /// Finished unsuccessfully; error holds the cause.
    Failed,
    /// Deliberately not executed; resolved for dependents.
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A single unit of work: one prompt delivered to one role-configured
/// agent, executed in its own worktree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Human-readable name shown in events and logs.
    pub name: String,
    /// Agent role; keys into the `agents` section of the config.
    pub role: String,
    /// Prompt text sent to the backend.
    pub prompt: String,
    /// Files this task may write; used for cross-task lock exclusion.
    #[serde(default)]
    pub writes_files: Vec<PathBuf>,
    #[serde(default)]
    pub failure_mode: FailureMode,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Agent reply on completion; conflict summary stays in the runner's
    /// per-task result, not here.
    #[serde(default)]
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        role: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
            prompt: prompt.into(),
            writes_files: Vec::new(),
            failure_mode: FailureMode::default(),
            depends_on: Vec::new(),
            status: TaskStatus::default(),
            result: String::new(),
            error: None,
        }
    }

    pub fn with_deps(mut self, deps: impl IntoIterator<Item = impl Into<TaskId>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_writes(mut self, files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.writes_files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
