// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend adapters over heterogeneous agent CLIs.
//!
//! A [`Backend`] turns a uniform `send(message)` into one non-interactive
//! CLI invocation: build argv, run the subprocess through the process
//! supervisor, parse the structured reply. Each adapter owns the session
//! bookkeeping of its CLI (explicit session IDs for claude, thread IDs
//! for codex, named sessions for goose), so swapping a CLI's flags
//! touches only its adapter.

mod claude;
mod codex;
mod goose;

pub use claude::ClaudeBackend;
pub use codex::CodexBackend;
pub use goose::GooseBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use crate::process::{ProcessError, ProcessManager};
use async_trait::async_trait;
use gf_core::BackendType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("process error: {0}")]
    Process(ProcessError),
    #[error("{backend} exited with {status}: {stderr}")]
    CliFailed {
        backend: BackendType,
        status: String,
        stderr: String,
    },
    #[error("unparseable {backend} output: {reason}")]
    BadOutput {
        backend: BackendType,
        reason: String,
    },
    #[error("invalid backend config: {0}")]
    InvalidConfig(String),
    #[error("cancelled")]
    Cancelled,
}

impl From<ProcessError> for BackendError {
    fn from(e: ProcessError) -> Self {
        match e {
            ProcessError::Cancelled => BackendError::Cancelled,
            other => BackendError::Process(other),
        }
    }
}

impl BackendError {
    /// User cancellation is an outcome, not a failure; the resilience
    /// layer neither retries it nor counts it against the breaker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A prompt delivered to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub content: String,
    pub role: Role,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: Role::User,
        }
    }
}

/// A completed reply from a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub content: String,
    /// Session identifier to persist for later resume.
    pub session_id: String,
}

/// Configuration for constructing one backend instance.
///
/// `work_dir` is the task's worktree; the CLI runs with it as cwd so all
/// file edits land in isolation.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub backend_type: BackendType,
    /// CLI binary; defaults to the canonical name for the type.
    pub command: Option<String>,
    /// Provider-level args prepended to every invocation.
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    /// Existing session to resume, if any.
    pub session_id: Option<String>,
    pub model: Option<String>,
    /// Local-LLM provider, honored by backends that support it.
    pub provider: Option<String>,
    pub system_prompt: Option<String>,
}

impl BackendConfig {
    pub fn new(backend_type: BackendType, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend_type,
            command: None,
            args: Vec::new(),
            work_dir: work_dir.into(),
            session_id: None,
            model: None,
            provider: None,
            system_prompt: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Uniform contract over agent CLIs.
///
/// One instance is owned by a single task execution and closed when the
/// task finishes. `send` blocks for the full CLI run; cancellation is
/// observed via the token (the subprocess group is killed).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Deliver one message and wait for the full reply.
    async fn send(
        &mut self,
        token: &CancellationToken,
        msg: Message,
    ) -> Result<Response, BackendError>;

    /// Release any resources. Idempotent; a no-op for per-invocation
    /// adapters, which hold no long-lived process.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Session identifier for resume; stable after the first send.
    fn session_id(&self) -> &str;

    /// Which breaker bucket this backend belongs to.
    fn backend_type(&self) -> BackendType;
}

/// Construct a backend for the configured CLI type.
///
/// Unknown type *strings* are rejected earlier, when configuration is
/// parsed into [`BackendType`].
pub fn new_backend(cfg: BackendConfig, pm: ProcessManager) -> Box<dyn Backend> {
    match cfg.backend_type {
        BackendType::Claude => Box::new(ClaudeBackend::new(cfg, pm)),
        BackendType::Codex => Box::new(CodexBackend::new(cfg, pm)),
        BackendType::Goose => Box::new(GooseBackend::new(cfg, pm)),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
