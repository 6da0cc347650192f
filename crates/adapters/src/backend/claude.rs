// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude-style backend adapter.
//!
//! Each `send` is one non-interactive CLI run. The first invocation
//! passes `--session-id <uuid>`; later ones pass `--resume <uuid>`, so a
//! crashed orchestrator can reattach the same conversation after
//! restart. Output is requested as a single JSON object.

use super::{Backend, BackendConfig, BackendError, Message, Response};
use crate::process::{execute_command, new_command, ProcessManager};
use async_trait::async_trait;
use gf_core::BackendType;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct ClaudeBackend {
    command: String,
    extra_args: Vec<String>,
    work_dir: PathBuf,
    model: Option<String>,
    system_prompt: Option<String>,
    session_id: String,
    /// True once there is a conversation to resume.
    resumes: bool,
    pm: ProcessManager,
}

impl ClaudeBackend {
    pub fn new(cfg: BackendConfig, pm: ProcessManager) -> Self {
        // A supplied session means a prior conversation exists; otherwise
        // mint a fresh v4 UUID (the CLI requires RFC 4122 session ids).
        let (session_id, resumes) = match cfg.session_id {
            Some(id) => (id, true),
            None => (Uuid::new_v4().to_string(), false),
        };
        Self {
            command: cfg.command.unwrap_or_else(|| "claude".to_string()),
            extra_args: cfg.args,
            work_dir: cfg.work_dir,
            model: cfg.model,
            system_prompt: cfg.system_prompt,
            session_id,
            resumes,
            pm,
        }
    }

    /// Pure argv construction; the only place claude flags are spelled.
    fn build_args(&self, msg: &Message, is_resume: bool) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend(["-p".to_string(), msg.content.clone()]);
        args.extend(["--output-format".to_string(), "json".to_string()]);
        if is_resume {
            args.extend(["--resume".to_string(), self.session_id.clone()]);
        } else {
            args.extend(["--session-id".to_string(), self.session_id.clone()]);
        }
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        if let Some(prompt) = &self.system_prompt {
            args.extend(["--system-prompt".to_string(), prompt.clone()]);
        }
        args
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    async fn send(
        &mut self,
        token: &CancellationToken,
        msg: Message,
    ) -> Result<Response, BackendError> {
        let args = self.build_args(&msg, self.resumes);
        let mut cmd = new_command(&self.command, &args);
        cmd.current_dir(&self.work_dir);

        tracing::debug!(
            session_id = %self.session_id,
            resume = self.resumes,
            "invoking claude CLI"
        );
        let output = execute_command(token, cmd, Some(&self.pm)).await?;
        if !output.success() {
            return Err(BackendError::CliFailed {
                backend: BackendType::Claude,
                status: output.status.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        let (content, session_id) =
            parse_response(&output.stdout).map_err(|reason| BackendError::BadOutput {
                backend: BackendType::Claude,
                reason,
            })?;
        if let Some(id) = session_id {
            self.session_id = id;
        }
        self.resumes = true;

        Ok(Response {
            content,
            session_id: self.session_id.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        // Per-invocation adapter: nothing is held open between sends.
        Ok(())
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Claude
    }
}

/// Parse the CLI's JSON object: a `session_id` plus a result that is
/// either a plain string or a `content` array whose text items are
/// concatenated.
fn parse_response(stdout: &str) -> Result<(String, Option<String>), String> {
    let value: serde_json::Value = serde_json::from_str(stdout.trim())
        .map_err(|e| format!("expected a JSON object: {e}"))?;

    let session_id = value
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    if let Some(text) = value.get("result").and_then(|v| v.as_str()) {
        return Ok((text.to_string(), session_id));
    }
    if let Some(items) = value
        .get("result")
        .and_then(|r| r.get("content"))
        .and_then(|c| c.as_array())
        .or_else(|| value.get("content").and_then(|c| c.as_array()))
    {
        return Ok((concat_text_items(items), session_id));
    }

    Err("no result or content field in output".to_string())
}

/// Concatenate every item whose type is `text`.
fn concat_text_items(items: &[serde_json::Value]) -> String {
    items
        .iter()
        .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
