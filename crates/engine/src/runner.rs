// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wave-based parallel runner.
//!
//! Repeatedly asks the DAG for eligible tasks and launches each wave
//! into a plain bounded pool. The pool deliberately does not cancel
//! siblings on first error: one task's failure must never abort its
//! peers. Only root cancellation surfaces as the runner's own error;
//! task failures are recorded in the DAG and the results list.
//!
//! Per task: create a worktree, build a backend rooted in it, take the
//! file locks, send through retry + circuit breaker, checkpoint every
//! transition, merge serially, publish lifecycle events throughout.

use crate::bus::EventBus;
use crate::dag::{Dag, DagError};
use crate::locks::PathLocks;
use crate::qa::QaChannel;
use crate::resilience::{send_with_retry, BreakerRegistry, RetryConfig};
use crate::workflow::WorkflowManager;
use crate::worktree::{MergeStrategy, WorktreeInfo, WorktreeManager};
use gf_adapters::backend::{Backend, BackendError, Message, Response};
use gf_adapters::process::ProcessManager;
use gf_core::{BackendType, Event, Task, TaskId, TaskStatus};
use gf_storage::{Store, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Idle poll interval while a wave's stragglers finish.
const WAVE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that abort the whole run (task failures do not).
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("dag error: {0}")]
    Dag(#[from] DagError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("no store configured for resume")]
    NoStore,
    #[error("cancelled")]
    Cancelled,
}

/// Builds one backend per task execution, rooted in the task's worktree.
pub type BackendFactory = Arc<
    dyn Fn(&Task, &Path, Option<String>) -> Result<Box<dyn Backend>, BackendError> + Send + Sync,
>;

/// Final record of one task's execution.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub result: String,
    pub error: Option<String>,
    /// False both for conflicts and for merge infrastructure errors.
    pub merged: bool,
    pub conflict_files: Vec<String>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub concurrency: usize,
    pub merge_strategy: MergeStrategy,
    pub retry: RetryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            merge_strategy: MergeStrategy::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// The composition core. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Runner {
    config: Arc<RunnerConfig>,
    dag: Arc<Mutex<Dag>>,
    worktrees: Arc<WorktreeManager>,
    factory: BackendFactory,
    bus: EventBus,
    store: Option<Arc<Store>>,
    qa: Option<Arc<QaChannel>>,
    pm: ProcessManager,
    breakers: Arc<BreakerRegistry>,
    locks: PathLocks,
    workflows: Arc<WorkflowManager>,
    /// Worktrees currently owned by in-flight tasks.
    active: Arc<Mutex<HashMap<TaskId, WorktreeInfo>>>,
    /// Session per task, loaded by resume and refreshed on completion.
    sessions: Arc<Mutex<HashMap<TaskId, String>>>,
    results: Arc<Mutex<Vec<TaskResult>>>,
}

impl Runner {
    pub fn new(
        dag: Dag,
        worktrees: WorktreeManager,
        factory: BackendFactory,
        config: RunnerConfig,
    ) -> Self {
        Self {
            config: Arc::new(config),
            dag: Arc::new(Mutex::new(dag)),
            worktrees: Arc::new(worktrees),
            factory,
            bus: EventBus::new(),
            store: None,
            qa: None,
            pm: ProcessManager::new(),
            breakers: Arc::new(BreakerRegistry::new()),
            locks: PathLocks::new(),
            workflows: Arc::new(WorkflowManager::default()),
            active: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_qa(mut self, qa: Arc<QaChannel>) -> Self {
        self.qa = Some(qa);
        self
    }

    pub fn with_workflows(mut self, workflows: WorkflowManager) -> Self {
        self.workflows = Arc::new(workflows);
        self
    }

    pub fn with_process_manager(mut self, pm: ProcessManager) -> Self {
        self.pm = pm;
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    /// The bus observers subscribe to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn process_manager(&self) -> &ProcessManager {
        &self.pm
    }

    /// Worktrees owned by in-flight tasks; empty once `run` returns.
    pub fn active_worktree_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Execute the DAG to completion (or cancellation).
    pub async fn run(&self, token: &CancellationToken) -> Result<Vec<TaskResult>, RunnerError> {
        self.dag.lock().validate()?;
        self.run_to_completion(token).await
    }

    /// Rebuild the DAG from the store and continue at the frontier:
    /// completed and failed tasks are never eligible again, interrupted
    /// ones re-run with their persisted sessions.
    pub async fn resume(&self, token: &CancellationToken) -> Result<Vec<TaskResult>, RunnerError> {
        let store = self.store.clone().ok_or(RunnerError::NoStore)?;
        let stored = store.list_tasks()?;

        {
            let mut dag = self.dag.lock();
            *dag = Dag::new();
            for mut task in stored.iter().cloned() {
                // A crash can leave tasks marked running; they re-run.
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Pending;
                }
                dag.add_task(task)?;
            }
            dag.validate()?;
        }
        {
            let mut sessions = self.sessions.lock();
            for task in &stored {
                if let Ok(record) = store.get_session(&task.id) {
                    sessions.insert(task.id.clone(), record.session_id);
                }
            }
        }

        self.run_to_completion(token).await
    }

    async fn run_to_completion(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<TaskResult>, RunnerError> {
        if let Err(e) = self.worktrees.prune().await {
            tracing::warn!(error = %e, "worktree prune failed");
        }
        self.checkpoint_dag();
        if let Some(qa) = &self.qa {
            qa.start(token);
        }

        let outcome = self.run_loop(token).await;

        // Cleanup runs on every exit path, cancellation included.
        self.cleanup_leftovers().await;
        if let Some(qa) = &self.qa {
            qa.stop().await;
        }

        outcome.map(|_| self.results.lock().clone())
    }

    async fn run_loop(&self, token: &CancellationToken) -> Result<(), RunnerError> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        loop {
            if token.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }

            let (eligible, running) = {
                let dag = self.dag.lock();
                let eligible: Vec<Task> = dag.eligible().into_iter().cloned().collect();
                (eligible, dag.counts().running)
            };

            if eligible.is_empty() {
                if running == 0 {
                    return Ok(());
                }
                tokio::time::sleep(WAVE_POLL_INTERVAL).await;
                continue;
            }

            let mut wave = JoinSet::new();
            for task in eligible {
                let runner = self.clone();
                let token = token.clone();
                let semaphore = Arc::clone(&semaphore);
                wave.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    runner.execute_task(&token, task).await;
                });
            }
            // Failure isolation: peers run to completion whatever
            // happens to their siblings; a join error is a panic in
            // task code and is logged, never propagated.
            while let Some(joined) = wave.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "task worker panicked");
                }
            }

            self.publish_progress();
        }
    }

    async fn execute_task(&self, token: &CancellationToken, task: Task) {
        let started = Instant::now();
        let id = task.id.clone();

        if token.is_cancelled() {
            self.finish_failed(&id, "cancelled before start".to_string(), started);
            return;
        }

        if let Err(e) = self.dag.lock().mark_running(&id) {
            tracing::warn!(task = %id, error = %e, "cannot mark running");
            return;
        }
        self.checkpoint_status(&id, TaskStatus::Running, "", None);
        self.bus.publish(Event::task_started(&task));
        tracing::info!(task = %id, role = %task.role, "task started");

        let info = match self.worktrees.create(&id).await {
            Ok(info) => info,
            Err(e) => {
                self.finish_failed(&id, format!("worktree create failed: {e}"), started);
                return;
            }
        };
        self.active.lock().insert(id.clone(), info.clone());
        let _active = ActiveGuard {
            map: Arc::clone(&self.active),
            id: id.clone(),
        };

        let session = self.sessions.lock().get(&id).cloned();
        let mut backend = match (self.factory)(&task, &info.path, session) {
            Ok(backend) => backend,
            Err(e) => {
                self.force_clean(&info).await;
                self.finish_failed(&id, format!("backend construction failed: {e}"), started);
                return;
            }
        };

        // Held across send and merge; sorted acquisition, so writers of
        // overlapping file sets serialize instead of deadlocking.
        let _locks = self.locks.lock_all(&task.writes_files).await;

        let backend_type = backend.backend_type();
        let breaker = self.breakers.breaker(backend_type);
        let message = Message::user(task.prompt.clone());
        let sent = send_with_retry(
            token,
            &breaker,
            &self.config.retry,
            backend.as_mut(),
            &message,
        )
        .await;
        if let Err(e) = backend.close().await {
            tracing::debug!(task = %id, error = %e, "backend close failed");
        }

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                self.force_clean(&info).await;
                self.finish_failed(&id, e.to_string(), started);
                return;
            }
        };

        self.sessions
            .lock()
            .insert(id.clone(), response.session_id.clone());
        if let Err(e) = self
            .dag
            .lock()
            .mark_completed(&id, response.content.clone())
        {
            tracing::warn!(task = %id, error = %e, "cannot mark completed");
        }
        self.checkpoint_completed(&id, &message.content, &response, backend_type);
        for line in response.content.lines() {
            self.bus.publish(Event::task_output(id.clone(), line));
        }
        self.bus.publish(Event::task_completed(
            id.clone(),
            response.content.clone(),
            started.elapsed(),
        ));
        tracing::info!(task = %id, "task completed");

        self.spawn_follow_ups(&id);

        let (merged, conflict_files) = self.merge_and_clean(&info).await;

        self.results.lock().push(TaskResult {
            task_id: id,
            status: TaskStatus::Completed,
            result: response.content,
            error: None,
            merged,
            conflict_files,
            duration: started.elapsed(),
        });
    }

    /// Merge serially, publish the outcome, and clean up according to
    /// it. A conflict is not a failure: the branch survives, only the
    /// directory goes.
    async fn merge_and_clean(&self, info: &WorktreeInfo) -> (bool, Vec<String>) {
        match self
            .worktrees
            .merge(info, self.config.merge_strategy)
            .await
        {
            Ok(result) if result.merged => {
                self.bus
                    .publish(Event::task_merged(info.task_id.clone(), true, Vec::new()));
                if let Err(e) = self.worktrees.cleanup(info).await {
                    tracing::warn!(task = %info.task_id, error = %e, "cleanup after merge failed");
                    self.force_clean(info).await;
                }
                (true, Vec::new())
            }
            Ok(result) => {
                tracing::warn!(
                    task = %info.task_id,
                    files = ?result.conflict_files,
                    "merge conflict; branch preserved for inspection"
                );
                self.bus.publish(Event::task_merged(
                    info.task_id.clone(),
                    false,
                    result.conflict_files.clone(),
                ));
                if let Err(e) = self.worktrees.cleanup_dir_only(info).await {
                    tracing::warn!(task = %info.task_id, error = %e, "conflict cleanup failed");
                }
                (false, result.conflict_files)
            }
            Err(e) => {
                tracing::warn!(task = %info.task_id, error = %e, "merge failed");
                self.bus
                    .publish(Event::task_merged(info.task_id.clone(), false, Vec::new()));
                if let Err(e) = self.worktrees.cleanup_dir_only(info).await {
                    tracing::warn!(task = %info.task_id, error = %e, "post-merge-failure cleanup failed");
                }
                (false, Vec::new())
            }
        }
    }

    /// Add workflow follow-ups to the DAG; an addition that would form
    /// a cycle is rejected here, at spawn time.
    fn spawn_follow_ups(&self, parent_id: &TaskId) {
        if self.workflows.is_empty() {
            return;
        }
        let mut dag = self.dag.lock();
        let Some(parent) = dag.get(parent_id).cloned() else {
            return;
        };
        for follow_up in self.workflows.follow_ups(&parent) {
            if dag.get(&follow_up.id).is_some() {
                continue;
            }
            let follow_id = follow_up.id.clone();
            if let Err(e) = dag.add_task(follow_up.clone()) {
                tracing::warn!(task = %follow_id, error = %e, "follow-up not added");
                continue;
            }
            if let Err(e) = dag.validate() {
                tracing::warn!(task = %follow_id, error = %e, "follow-up rejected: would corrupt the dag");
                dag.remove_task(&follow_id);
                continue;
            }
            self.checkpoint_task(&follow_up);
            tracing::info!(parent = %parent_id, follow_up = %follow_id, "workflow follow-up spawned");
        }
    }

    fn finish_failed(&self, id: &TaskId, error: String, started: Instant) {
        if let Err(e) = self.dag.lock().mark_failed(id, error.clone()) {
            tracing::warn!(task = %id, error = %e, "cannot mark failed");
        }
        self.checkpoint_status(id, TaskStatus::Failed, "", Some(&error));
        self.bus
            .publish(Event::task_failed(id.clone(), error.clone(), started.elapsed()));
        tracing::warn!(task = %id, error = %error, "task failed");
        self.results.lock().push(TaskResult {
            task_id: id.clone(),
            status: TaskStatus::Failed,
            result: String::new(),
            error: Some(error),
            merged: false,
            conflict_files: Vec::new(),
            duration: started.elapsed(),
        });
    }

    async fn force_clean(&self, info: &WorktreeInfo) {
        if let Err(e) = self.worktrees.force_cleanup(info).await {
            tracing::warn!(task = %info.task_id, error = %e, "force cleanup failed");
        }
    }

    /// Force-clean anything still in the active set; after this the set
    /// is empty whatever path brought us here.
    async fn cleanup_leftovers(&self) {
        let leftover: Vec<WorktreeInfo> = {
            let mut active = self.active.lock();
            active.drain().map(|(_, info)| info).collect()
        };
        for info in leftover {
            tracing::debug!(task = %info.task_id, "cleaning leftover worktree");
            self.force_clean(&info).await;
        }
    }

    fn publish_progress(&self) {
        let counts = self.dag.lock().counts();
        self.bus.publish(Event::dag_progress(counts));
    }

    // Checkpoints are best-effort by contract: losing one is better
    // than halting progress, so store errors are logged and swallowed.

    fn checkpoint_dag(&self) {
        let Some(store) = &self.store else { return };
        let tasks: Vec<Task> = self.dag.lock().tasks().into_iter().cloned().collect();
        if let Err(e) = store.save_dag(tasks.iter()) {
            tracing::warn!(error = %e, "checkpoint failed: dag snapshot");
        }
    }

    fn checkpoint_task(&self, task: &Task) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save_task(task) {
            tracing::warn!(task = %task.id, error = %e, "checkpoint failed: task");
        }
    }

    fn checkpoint_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        result: &str,
        error: Option<&str>,
    ) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.update_task_status(id, status, result, error) {
            tracing::warn!(task = %id, error = %e, "checkpoint failed: status");
        }
    }

    fn checkpoint_completed(
        &self,
        id: &TaskId,
        prompt: &str,
        response: &Response,
        backend_type: BackendType,
    ) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save_message(id, "user", prompt) {
            tracing::warn!(task = %id, error = %e, "checkpoint failed: user turn");
        }
        if let Err(e) = store.save_message(id, "assistant", &response.content) {
            tracing::warn!(task = %id, error = %e, "checkpoint failed: assistant turn");
        }
        if let Err(e) = store.save_session(id, &response.session_id, backend_type) {
            tracing::warn!(task = %id, error = %e, "checkpoint failed: session");
        }
        if let Err(e) =
            store.update_task_status(id, TaskStatus::Completed, &response.content, None)
        {
            tracing::warn!(task = %id, error = %e, "checkpoint failed: status");
        }
    }
}

/// Removes the task from the active-worktree set on drop, covering
/// every exit path of `execute_task`.
struct ActiveGuard {
    map: Arc<Mutex<HashMap<TaskId, WorktreeInfo>>>,
    id: TaskId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.map.lock().remove(&self.id);
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
