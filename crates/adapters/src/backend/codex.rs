// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex-style backend adapter.
//!
//! The CLI emits newline-delimited JSON events. The adapter walks the
//! stream, remembers the thread id it announces, and returns the
//! concluding assistant message. Resume is `exec resume <thread-id>`.

use super::{Backend, BackendConfig, BackendError, Message, Response};
use crate::process::{execute_command, new_command, ProcessManager};
use async_trait::async_trait;
use gf_core::BackendType;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub struct CodexBackend {
    command: String,
    extra_args: Vec<String>,
    work_dir: PathBuf,
    model: Option<String>,
    /// Thread id reported by the CLI; empty until the first reply.
    thread_id: String,
    pm: ProcessManager,
}

impl CodexBackend {
    pub fn new(cfg: BackendConfig, pm: ProcessManager) -> Self {
        Self {
            command: cfg.command.unwrap_or_else(|| "codex".to_string()),
            extra_args: cfg.args,
            work_dir: cfg.work_dir,
            model: cfg.model,
            thread_id: cfg.session_id.unwrap_or_default(),
            pm,
        }
    }

    /// Pure argv construction; the only place codex flags are spelled.
    fn build_args(&self, msg: &Message, is_resume: bool) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("exec".to_string());
        if is_resume {
            args.extend(["resume".to_string(), self.thread_id.clone()]);
        }
        args.push("--json".to_string());
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        args.push(msg.content.clone());
        args
    }
}

#[async_trait]
impl Backend for CodexBackend {
    async fn send(
        &mut self,
        token: &CancellationToken,
        msg: Message,
    ) -> Result<Response, BackendError> {
        let is_resume = !self.thread_id.is_empty();
        let args = self.build_args(&msg, is_resume);
        let mut cmd = new_command(&self.command, &args);
        cmd.current_dir(&self.work_dir);

        tracing::debug!(thread_id = %self.thread_id, resume = is_resume, "invoking codex CLI");
        let output = execute_command(token, cmd, Some(&self.pm)).await?;
        if !output.success() {
            return Err(BackendError::CliFailed {
                backend: BackendType::Codex,
                status: output.status.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let walk = walk_events(&output.stdout);
        if let Some(id) = walk.thread_id {
            self.thread_id = id;
        }
        let content = walk.last_message.ok_or_else(|| BackendError::BadOutput {
            backend: BackendType::Codex,
            reason: "no assistant message in event stream".to_string(),
        })?;

        Ok(Response {
            content,
            session_id: self.thread_id.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn session_id(&self) -> &str {
        &self.thread_id
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Codex
    }
}

#[derive(Debug, Default)]
struct EventWalk {
    thread_id: Option<String>,
    last_message: Option<String>,
}

/// Walk newline-delimited events, tolerating unparseable lines.
///
/// Two shapes carry the assistant text across CLI versions:
/// `{"type":"item.completed","item":{"type":"agent_message","text":..}}`
/// and `{"type":"agent_message","message":..}`. Thread ids appear as a
/// top-level `thread_id`.
fn walk_events(stdout: &str) -> EventWalk {
    let mut walk = EventWalk::default();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if let Some(id) = event.get("thread_id").and_then(|v| v.as_str()) {
            walk.thread_id = Some(id.to_string());
        }
        if let Some(text) = assistant_text(&event) {
            walk.last_message = Some(text);
        }
    }
    walk
}

fn assistant_text(event: &serde_json::Value) -> Option<String> {
    let kind = event.get("type").and_then(|t| t.as_str())?;
    match kind {
        "item.completed" => {
            let item = event.get("item")?;
            if item.get("type").and_then(|t| t.as_str()) == Some("agent_message") {
                return item
                    .get("text")
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
            }
            None
        }
        "agent_message" => event
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
