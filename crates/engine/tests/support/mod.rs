// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for runner scenarios: scratch git repos and backends
//! that actually commit files inside their worktrees.

use gf_adapters::backend::{Backend, BackendError, Message, Response};
use gf_adapters::FakeBackend;
use gf_core::Task;
use gf_engine::BackendFactory;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run git synchronously, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Fresh repository with one commit on `main`.
pub fn init_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "-b", "main"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    std::fs::write(dir.path().join("README.md"), "# scenario repo\n").unwrap();
    git(dir.path(), &["add", "-A"]);
    git(dir.path(), &["commit", "-m", "initial"]);
    dir
}

pub fn commit_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", &format!("write {name}")]);
}

pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    std::process::Command::new("git")
        .args(["rev-parse", "--verify", branch])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Entries left under `.worktrees`; zero after a clean run.
pub fn leftover_worktrees(repo: &Path) -> usize {
    match std::fs::read_dir(repo.join(".worktrees")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

/// Factory whose backends interpret prompts of the form
/// `write <file>=<content>`: the file is written and committed inside
/// the task's worktree, and the reply names the file.
pub fn committing_factory(sends: Arc<AtomicUsize>) -> BackendFactory {
    Arc::new(move |_task: &Task, work_dir: &Path, _session| {
        let backend = FakeBackend::new(work_dir)
            .with_send_counter(Arc::clone(&sends))
            .with_on_send(Arc::new(|dir, msg| {
                let Some((file, content)) = msg
                    .content
                    .strip_prefix("write ")
                    .and_then(|rest| rest.split_once('='))
                else {
                    return Ok("nothing to write".to_string());
                };
                std::fs::write(dir.join(file), format!("{content}\n"))
                    .map_err(|e| e.to_string())?;
                run_git(dir, &["add", "-A"])?;
                run_git(dir, &["commit", "-m", &format!("agent: {file}")])?;
                Ok(format!("wrote {file}"))
            }));
        Ok(Box::new(backend) as Box<dyn Backend>)
    })
}

fn run_git(dir: &Path, args: &[&str]) -> Result<(), String> {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| e.to_string())?;
    if output.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&output.stderr).into_owned())
    }
}

/// Backend that tracks how many sends are in flight at once.
pub struct GaugeBackend {
    pub current: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub delay: Duration,
}

#[async_trait::async_trait]
impl Backend for GaugeBackend {
    async fn send(
        &mut self,
        token: &CancellationToken,
        _msg: Message,
    ) -> Result<Response, BackendError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let outcome = tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(Response {
                content: "done".to_string(),
                session_id: "gauge".to_string(),
            }),
            _ = token.cancelled() => Err(BackendError::Cancelled),
        };

        self.current.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn session_id(&self) -> &str {
        "gauge"
    }

    fn backend_type(&self) -> gf_core::BackendType {
        gf_core::BackendType::Claude
    }
}
