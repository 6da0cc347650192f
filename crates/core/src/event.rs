// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events published on the bus.

use crate::task::{Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress snapshot across the whole DAG.
///
/// Published once per completed wave; these are snapshots, not deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagCounts {
    pub total: usize,
    pub completed: usize,
    pub running: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Events that observers (the TUI, the CLI printer) consume.
///
/// Serializes with `{"type": "task:started", ...fields}` format. Along a
/// single subscriber channel, one task's events arrive in lifecycle order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "task:started")]
    TaskStarted {
        id: TaskId,
        name: String,
        role: String,
        ts: DateTime<Utc>,
    },

    /// A raw line of agent output, streamed while the task runs.
    #[serde(rename = "task:output")]
    TaskOutput {
        id: TaskId,
        line: String,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "task:completed")]
    TaskCompleted {
        id: TaskId,
        result: String,
        duration_ms: u64,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "task:failed")]
    TaskFailed {
        id: TaskId,
        error: String,
        duration_ms: u64,
        ts: DateTime<Utc>,
    },

    /// Merge outcome; `merged: false` with conflict files is not a task
    /// failure, the branch is preserved for inspection.
    #[serde(rename = "task:merged")]
    TaskMerged {
        id: TaskId,
        merged: bool,
        #[serde(default)]
        conflict_files: Vec<String>,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "dag:progress")]
    DagProgress {
        #[serde(flatten)]
        counts: DagCounts,
        ts: DateTime<Utc>,
    },
}

impl Event {
    /// Topic string used for bus routing; equals the serde tag.
    pub fn topic(&self) -> &'static str {
        match self {
            Event::TaskStarted { .. } => "task:started",
            Event::TaskOutput { .. } => "task:output",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskMerged { .. } => "task:merged",
            Event::DagProgress { .. } => "dag:progress",
        }
    }

    /// The task this event concerns; `None` for DAG-scoped events.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskStarted { id, .. }
            | Event::TaskOutput { id, .. }
            | Event::TaskCompleted { id, .. }
            | Event::TaskFailed { id, .. }
            | Event::TaskMerged { id, .. } => Some(id),
            Event::DagProgress { .. } => None,
        }
    }

    pub fn task_started(task: &Task) -> Self {
        Event::TaskStarted {
            id: task.id.clone(),
            name: task.name.clone(),
            role: task.role.clone(),
            ts: Utc::now(),
        }
    }

    pub fn task_output(id: TaskId, line: impl Into<String>) -> Self {
        Event::TaskOutput {
            id,
            line: line.into(),
            ts: Utc::now(),
        }
    }

    pub fn task_completed(id: TaskId, result: impl Into<String>, duration: Duration) -> Self {
        Event::TaskCompleted {
            id,
            result: result.into(),
            duration_ms: duration.as_millis() as u64,
            ts: Utc::now(),
        }
    }

    pub fn task_failed(id: TaskId, error: impl Into<String>, duration: Duration) -> Self {
        Event::TaskFailed {
            id,
            error: error.into(),
            duration_ms: duration.as_millis() as u64,
            ts: Utc::now(),
        }
    }

    pub fn task_merged(id: TaskId, merged: bool, conflict_files: Vec<String>) -> Self {
        Event::TaskMerged {
            id,
            merged,
            conflict_files,
            ts: Utc::now(),
        }
    }

    pub fn dag_progress(counts: DagCounts) -> Self {
        Event::DagProgress {
            counts,
            ts: Utc::now(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
