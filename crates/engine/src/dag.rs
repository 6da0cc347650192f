// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task graph: cycle detection, eligibility, status transitions.
//!
//! Eligibility is derived, never stored: a task is eligible when it is
//! pending and every dependency is resolved under the failure-mode
//! rules. Hard failures block dependents forever; soft and skip
//! failures resolve them.

use gf_core::{DagCounts, FailureMode, Task, TaskId, TaskStatus};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors from DAG construction and validation.
#[derive(Debug, Error)]
pub enum DagError {
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("task {task} depends on unknown task {dep}")]
    MissingDependency { task: TaskId, dep: TaskId },
    #[error("dependency cycle among tasks: {}", join_ids(.participants))]
    Cycle { participants: Vec<TaskId> },
    #[error("task {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Directed acyclic graph of tasks.
///
/// The runner wraps a `Dag` in a mutex, so status transitions are atomic
/// with respect to eligibility queries.
#[derive(Debug, Default)]
pub struct Dag {
    tasks: HashMap<TaskId, Task>,
    /// Reverse index: dependency -> tasks that depend on it.
    dependents: HashMap<TaskId, Vec<TaskId>>,
    /// Topological order computed by the last successful `validate`.
    order: Vec<TaskId>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a DAG from tasks and validate it in one step.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, DagError> {
        let mut dag = Self::new();
        for task in tasks {
            dag.add_task(task)?;
        }
        dag.validate()?;
        Ok(dag)
    }

    /// Add a task; duplicate ids are rejected. Dependency references are
    /// checked later, at [`validate`](Self::validate).
    pub fn add_task(&mut self, task: Task) -> Result<(), DagError> {
        if self.tasks.contains_key(&task.id) {
            return Err(DagError::DuplicateTask(task.id));
        }
        for dep in &task.depends_on {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(task.id.clone());
        }
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Remove a task again; used to back out a follow-up whose addition
    /// introduced a cycle.
    pub fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        let task = self.tasks.remove(id)?;
        for dep in &task.depends_on {
            if let Some(dependents) = self.dependents.get_mut(dep) {
                dependents.retain(|d| d != id);
            }
        }
        Some(task)
    }

    /// Check every edge and compute a deterministic topological order
    /// (Kahn's algorithm, ready set ordered by id). Detects self-loops,
    /// two-cycles, and transitive cycles; disconnected tasks are kept.
    pub fn validate(&mut self) -> Result<Vec<TaskId>, DagError> {
        for task in self.tasks.values() {
            for dep in &task.depends_on {
                if !self.tasks.contains_key(dep) {
                    return Err(DagError::MissingDependency {
                        task: task.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        let mut in_degree: HashMap<&TaskId, usize> = self
            .tasks
            .values()
            .map(|t| (&t.id, t.depends_on.len()))
            .collect();
        let mut ready: BTreeSet<&TaskId> = in_degree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.tasks.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in self.dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.tasks.len() {
            let mut participants: Vec<TaskId> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.clone())
                .collect();
            participants.sort();
            return Err(DagError::Cycle { participants });
        }

        self.order = order.clone();
        Ok(order)
    }

    /// A dependency is resolved when it completed, was skipped, or
    /// failed with a non-blocking failure mode.
    fn resolved(dep: &Task) -> bool {
        match dep.status {
            TaskStatus::Completed | TaskStatus::Skipped => true,
            TaskStatus::Failed => {
                matches!(dep.failure_mode, FailureMode::Soft | FailureMode::Skip)
            }
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }

    /// Pending tasks whose dependencies are all resolved, ordered by id.
    pub fn eligible(&self) -> Vec<&Task> {
        let mut eligible: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.depends_on
                    .iter()
                    .all(|dep| self.tasks.get(dep).is_some_and(Self::resolved))
            })
            .collect();
        eligible.sort_by(|a, b| a.id.cmp(&b.id));
        eligible
    }

    pub fn mark_running(&mut self, id: &TaskId) -> Result<(), DagError> {
        self.transition(id, TaskStatus::Running, |from| {
            from == TaskStatus::Pending
        })
    }

    pub fn mark_completed(&mut self, id: &TaskId, result: String) -> Result<(), DagError> {
        self.transition(id, TaskStatus::Completed, |from| {
            from == TaskStatus::Running
        })?;
        if let Some(task) = self.tasks.get_mut(id) {
            task.result = result;
            task.error = None;
        }
        Ok(())
    }

    /// Failure is legal from `Pending` too: a task can fail before it
    /// starts (cancellation, worktree setup).
    pub fn mark_failed(&mut self, id: &TaskId, error: String) -> Result<(), DagError> {
        self.transition(id, TaskStatus::Failed, |from| {
            matches!(from, TaskStatus::Pending | TaskStatus::Running)
        })?;
        if let Some(task) = self.tasks.get_mut(id) {
            task.error = Some(error);
        }
        Ok(())
    }

    fn transition(
        &mut self,
        id: &TaskId,
        to: TaskStatus,
        allowed: impl Fn(TaskStatus) -> bool,
    ) -> Result<(), DagError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| DagError::TaskNotFound(id.clone()))?;
        if !allowed(task.status) {
            return Err(DagError::InvalidTransition {
                id: id.clone(),
                from: task.status,
                to,
            });
        }
        task.status = to;
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks, ordered by id for determinism.
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    /// Topological order from the last successful `validate`.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Progress snapshot; skipped tasks count as completed.
    pub fn counts(&self) -> DagCounts {
        let mut counts = DagCounts {
            total: self.tasks.len(),
            ..DagCounts::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed | TaskStatus::Skipped => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;
