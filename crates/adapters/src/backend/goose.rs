// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Goose-style backend adapter.
//!
//! Sessions are named rather than UUID-keyed: the first run passes
//! `--name <session>`, later runs `--resume`. Local-LLM selection
//! (`--provider`, `--model`) passes through unchanged. Output formats
//! drift across versions, so parsing is layered: one JSON object, then
//! an NDJSON stream, then raw stdout.

use super::{Backend, BackendConfig, BackendError, Message, Response};
use crate::process::{execute_command, new_command, ProcessManager};
use async_trait::async_trait;
use gf_core::BackendType;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct GooseBackend {
    command: String,
    extra_args: Vec<String>,
    work_dir: PathBuf,
    model: Option<String>,
    provider: Option<String>,
    system_prompt: Option<String>,
    session_name: String,
    resumes: bool,
    pm: ProcessManager,
}

impl GooseBackend {
    pub fn new(cfg: BackendConfig, pm: ProcessManager) -> Self {
        let (session_name, resumes) = match cfg.session_id {
            Some(name) => (name, true),
            None => (generate_session_name(), false),
        };
        Self {
            command: cfg.command.unwrap_or_else(|| "goose".to_string()),
            extra_args: cfg.args,
            work_dir: cfg.work_dir,
            model: cfg.model,
            provider: cfg.provider,
            system_prompt: cfg.system_prompt,
            session_name,
            resumes,
            pm,
        }
    }

    /// Pure argv construction; the only place goose flags are spelled.
    fn build_args(&self, msg: &Message, is_resume: bool) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("run".to_string());
        if is_resume {
            args.push("--resume".to_string());
        }
        args.extend(["--name".to_string(), self.session_name.clone()]);
        if let Some(provider) = &self.provider {
            args.extend(["--provider".to_string(), provider.clone()]);
        }
        if let Some(model) = &self.model {
            args.extend(["--model".to_string(), model.clone()]);
        }
        if let Some(prompt) = &self.system_prompt {
            args.extend(["--system".to_string(), prompt.clone()]);
        }
        args.extend(["--text".to_string(), msg.content.clone()]);
        args
    }
}

#[async_trait]
impl Backend for GooseBackend {
    async fn send(
        &mut self,
        token: &CancellationToken,
        msg: Message,
    ) -> Result<Response, BackendError> {
        let args = self.build_args(&msg, self.resumes);
        let mut cmd = new_command(&self.command, &args);
        cmd.current_dir(&self.work_dir);

        tracing::debug!(session = %self.session_name, resume = self.resumes, "invoking goose CLI");
        let output = execute_command(token, cmd, Some(&self.pm)).await?;
        if !output.success() {
            return Err(BackendError::CliFailed {
                backend: BackendType::Goose,
                status: output.status.to_string(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        self.resumes = true;
        Ok(Response {
            content: parse_response(&output.stdout),
            session_id: self.session_name.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn session_id(&self) -> &str {
        &self.session_name
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Goose
    }
}

/// Layered parse: single object, NDJSON stream, then plain text.
fn parse_response(stdout: &str) -> String {
    let trimmed = stdout.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(text) = object_text(&value) {
            return text;
        }
    }

    let mut last = None;
    for line in trimmed.lines() {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line.trim()) {
            if let Some(text) = object_text(&value) {
                last = Some(text);
            }
        }
    }
    if let Some(text) = last {
        return text;
    }

    trimmed.to_string()
}

/// Pull reply text out of one parsed object, whatever key this CLI
/// version uses.
fn object_text(value: &serde_json::Value) -> Option<String> {
    for key in ["result", "response", "message", "text"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }
    None
}

/// Human-readable session name with a short random suffix.
fn generate_session_name() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("gaffer-{}", gf_core::ShortId::short(hex.as_str(), 8))
}

#[cfg(test)]
#[path = "goose_tests.rs"]
mod tests;
