// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolated git worktrees, one per task, merged back to a base branch.
//!
//! Worktrees live under `<repo>/.worktrees/<task-id>` on branches named
//! `task/<task-id>`. Merges run in the primary worktree and are
//! globally serialized: the base branch index lock is process-wide, so
//! two merges can never make progress concurrently anyway.

use gf_adapters::process::{new_command, run_with_timeout, ProcessError};
use gf_core::TaskId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from worktree operations.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("worktree already exists for task: {0}")]
    Duplicate(TaskId),
    #[error("{command} failed: {stderr}")]
    Git { command: String, stderr: String },
    #[error("process error: {0}")]
    Process(#[from] ProcessError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cleanup of {task_id} left residue: {failures}")]
    Cleanup { task_id: TaskId, failures: String },
}

/// A created worktree: where it is and what it branches from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub task_id: TaskId,
    /// Absolute path of the checkout.
    pub path: PathBuf,
    pub branch: String,
    /// Base commit the branch was cut from. Empty for entries
    /// reconstructed by [`WorktreeManager::list`].
    pub base_commit: String,
}

/// Outcome of a merge attempt. A conflict is reported, never applied:
/// the repo stays clean and the task branch survives for inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: bool,
    pub conflict_files: Vec<String>,
}

/// Merge strategy passed through to git.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// The default content merge (`ort`).
    #[default]
    Ort,
    /// Keep our side wholesale (`-s ours`).
    Ours,
    /// Favor their side on conflicting hunks (`-X theirs`).
    Theirs,
}

impl MergeStrategy {
    fn git_args(&self) -> &'static [&'static str] {
        match self {
            MergeStrategy::Ort => &[],
            MergeStrategy::Ours => &["-s", "ours"],
            MergeStrategy::Theirs => &["-X", "theirs"],
        }
    }
}

/// Creates, merges, and cleans per-task worktrees.
pub struct WorktreeManager {
    repo_root: PathBuf,
    base_branch: String,
    /// Serializes every merge across the process.
    merge_lock: AsyncMutex<()>,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>, base_branch: impl Into<String>) -> Self {
        let repo_root: PathBuf = repo_root.into();
        // Canonicalize so list() can match porcelain output by prefix.
        let repo_root = std::fs::canonicalize(&repo_root).unwrap_or(repo_root);
        Self {
            repo_root,
            base_branch: base_branch.into(),
            merge_lock: AsyncMutex::new(()),
        }
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    fn worktrees_dir(&self) -> PathBuf {
        self.repo_root.join(".worktrees")
    }

    /// Create a worktree for `task_id` on a fresh `task/<id>` branch cut
    /// from the base branch. Rejects duplicates.
    pub async fn create(&self, task_id: &TaskId) -> Result<WorktreeInfo, WorktreeError> {
        let path = self.worktrees_dir().join(task_id.as_str());
        if path.exists() {
            return Err(WorktreeError::Duplicate(task_id.clone()));
        }
        tokio::fs::create_dir_all(self.worktrees_dir()).await?;

        let base_commit = self
            .git(&["rev-parse", &self.base_branch])
            .await?
            .trim()
            .to_string();
        let branch = format!("task/{task_id}");
        let path_arg = path.to_string_lossy().into_owned();
        self.git(&[
            "worktree",
            "add",
            "-b",
            &branch,
            &path_arg,
            &self.base_branch,
        ])
        .await?;

        Ok(WorktreeInfo {
            task_id: task_id.clone(),
            path,
            branch,
            base_commit,
        })
    }

    /// Merge a task branch into the base branch.
    ///
    /// Protocol: serialize, checkout base in the primary worktree, dry
    /// run at tree level to detect conflicts without mutating anything,
    /// then a real `--no-ff` merge only when clean.
    pub async fn merge(
        &self,
        info: &WorktreeInfo,
        strategy: MergeStrategy,
    ) -> Result<MergeResult, WorktreeError> {
        let _serialized = self.merge_lock.lock().await;

        self.git(&["checkout", &self.base_branch]).await?;

        let dry_run = self
            .git_raw(&[
                "merge-tree",
                "--write-tree",
                "--name-only",
                &self.base_branch,
                &info.branch,
            ])
            .await?;
        if !dry_run.status.success() {
            if dry_run.status.code() == Some(1) {
                let stdout = String::from_utf8_lossy(&dry_run.stdout);
                return Ok(MergeResult {
                    merged: false,
                    conflict_files: parse_merge_tree_conflicts(&stdout),
                });
            }
            return Err(WorktreeError::Git {
                command: "git merge-tree".to_string(),
                stderr: String::from_utf8_lossy(&dry_run.stderr).trim().to_string(),
            });
        }

        let message = format!("Merge {}", info.branch);
        let mut args = vec!["merge", "--no-ff"];
        args.extend_from_slice(strategy.git_args());
        args.extend(["-m", &message, &info.branch]);
        if let Err(e) = self.git(&args).await {
            // The dry run said clean, so this is unexpected; leave the
            // repo usable before surfacing it.
            let _ = self.git(&["merge", "--abort"]).await;
            return Err(e);
        }

        Ok(MergeResult {
            merged: true,
            conflict_files: Vec::new(),
        })
    }

    /// Graceful removal of worktree and branch, retrying with force.
    pub async fn cleanup(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        let path = info.path.to_string_lossy().into_owned();
        if let Err(e) = self.git(&["worktree", "remove", &path]).await {
            tracing::debug!(task_id = %info.task_id, error = %e, "retrying worktree removal with force");
            self.git(&["worktree", "remove", "--force", &path]).await?;
        }
        if let Err(e) = self.git(&["branch", "-d", &info.branch]).await {
            tracing::debug!(task_id = %info.task_id, error = %e, "retrying branch deletion with force");
            self.git(&["branch", "-D", &info.branch]).await?;
        }
        Ok(())
    }

    /// Forced removal that tolerates dirty state. Runs every step and
    /// aggregates sub-errors instead of failing fast.
    pub async fn force_cleanup(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        let path = info.path.to_string_lossy().into_owned();
        let mut failures = Vec::new();
        if let Err(e) = self.git(&["worktree", "remove", "--force", &path]).await {
            failures.push(e.to_string());
        }
        if let Err(e) = self.git(&["branch", "-D", &info.branch]).await {
            failures.push(e.to_string());
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorktreeError::Cleanup {
                task_id: info.task_id.clone(),
                failures: failures.join("; "),
            })
        }
    }

    /// Remove the worktree directory but keep the branch; the
    /// merge-conflict path, where the branch is the surviving artifact.
    pub async fn cleanup_dir_only(&self, info: &WorktreeInfo) -> Result<(), WorktreeError> {
        let path = info.path.to_string_lossy().into_owned();
        self.git(&["worktree", "remove", "--force", &path]).await?;
        Ok(())
    }

    /// Task worktrees currently registered with git.
    pub async fn list(&self) -> Result<Vec<WorktreeInfo>, WorktreeError> {
        let stdout = self.git(&["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&stdout, &self.worktrees_dir()))
    }

    /// Drop stale metadata for worktrees whose directory is gone.
    pub async fn prune(&self) -> Result<(), WorktreeError> {
        self.git(&["worktree", "prune"]).await?;
        Ok(())
    }

    async fn git(&self, args: &[&str]) -> Result<String, WorktreeError> {
        let output = self.git_raw(args).await?;
        if !output.status.success() {
            return Err(WorktreeError::Git {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn git_raw(&self, args: &[&str]) -> Result<std::process::Output, WorktreeError> {
        let mut cmd = new_command("git", args);
        cmd.current_dir(&self.repo_root);
        let description = format!("git {}", args.join(" "));
        Ok(run_with_timeout(cmd, GIT_TIMEOUT, &description).await?)
    }
}

/// Conflicted paths from `merge-tree --write-tree --name-only` output:
/// the tree OID on the first line, then one path per line until the
/// blank line that starts the informational section.
fn parse_merge_tree_conflicts(stdout: &str) -> Vec<String> {
    let mut files: Vec<String> = stdout
        .lines()
        .skip(1)
        .take_while(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .collect();
    files.sort();
    files.dedup();
    files
}

/// Parse `git worktree list --porcelain`, keeping entries under our
/// worktrees directory.
fn parse_worktree_list(stdout: &str, worktrees_dir: &Path) -> Vec<WorktreeInfo> {
    let mut found = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>| {
        if let (Some(p), Some(b)) = (path.take(), branch.take()) {
            if p.starts_with(worktrees_dir) {
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    found.push(WorktreeInfo {
                        task_id: TaskId::new(name),
                        path: p,
                        branch: b,
                        base_commit: String::new(),
                    });
                }
            }
        }
    };

    for line in stdout.lines() {
        if line.trim().is_empty() {
            flush(&mut path, &mut branch);
        } else if let Some(p) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(b.trim_start_matches("refs/heads/").to_string());
        }
    }
    flush(&mut path, &mut branch);
    found
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
