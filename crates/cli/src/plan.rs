// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan files: a TOML list of tasks that becomes the DAG.
//!
//! ```toml
//! [[task]]
//! id = "api"
//! role = "coder"
//! prompt = "Implement the /health endpoint"
//! writes_files = ["src/api.rs"]
//!
//! [[task]]
//! id = "api-tests"
//! role = "tester"
//! prompt = "Write tests for /health"
//! depends_on = ["api"]
//! failure_mode = "soft"
//! ```

use gf_core::{FailureMode, Task};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed plan: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("plan contains no tasks")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    task: Vec<PlanTask>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanTask {
    id: String,
    /// Defaults to the id.
    name: Option<String>,
    role: String,
    prompt: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    writes_files: Vec<PathBuf>,
    #[serde(default)]
    failure_mode: Option<FailureMode>,
}

impl From<PlanTask> for Task {
    fn from(plan: PlanTask) -> Self {
        let name = plan.name.unwrap_or_else(|| plan.id.clone());
        let mut task = Task::new(plan.id, name, plan.role, plan.prompt)
            .with_deps(plan.depends_on)
            .with_failure_mode(plan.failure_mode.unwrap_or_default());
        task.writes_files = plan.writes_files;
        task
    }
}

pub fn load_plan(path: &Path) -> Result<Vec<Task>, PlanError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_plan(&text)
}

pub fn parse_plan(text: &str) -> Result<Vec<Task>, PlanError> {
    let plan: PlanFile = toml::from_str(text)?;
    if plan.task.is_empty() {
        return Err(PlanError::Empty);
    }
    Ok(plan.task.into_iter().map(Task::from).collect())
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
