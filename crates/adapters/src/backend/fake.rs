// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backend for deterministic testing

use super::{Backend, BackendError, Message, Response};
use async_trait::async_trait;
use gf_core::BackendType;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Recorded call to a [`FakeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Send { content: String },
    Close,
}

/// Hook invoked on send, e.g. to write and commit files inside the
/// task's worktree. Returns the reply content or an error message.
pub type OnSend = Arc<dyn Fn(&Path, &Message) -> Result<String, String> + Send + Sync>;

/// Scripted backend: replies and failures are queued up front, calls are
/// recorded, and an optional hook can touch the work dir per send.
#[derive(Clone)]
pub struct FakeBackend {
    session_id: String,
    backend_type: BackendType,
    work_dir: PathBuf,
    delay: Option<Duration>,
    default_reply: String,
    script: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<Mutex<Vec<FakeCall>>>,
    sends: Arc<AtomicUsize>,
    on_send: Option<OnSend>,
}

impl FakeBackend {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: "fake-session".to_string(),
            backend_type: BackendType::Claude,
            work_dir: work_dir.into(),
            delay: None,
            default_reply: "ok".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            sends: Arc::new(AtomicUsize::new(0)),
            on_send: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_type(mut self, backend_type: BackendType) -> Self {
        self.backend_type = backend_type;
        self
    }

    /// Queue a successful reply for one future send.
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.script.lock().push_back(Ok(content.into()));
        self
    }

    /// Queue a failure for one future send.
    pub fn with_failure(self, error: impl Into<String>) -> Self {
        self.script.lock().push_back(Err(error.into()));
        self
    }

    /// Sleep this long inside every send (cancellation-aware).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_on_send(mut self, hook: OnSend) -> Self {
        self.on_send = Some(hook);
        self
    }

    /// Share an external send counter, e.g. across every backend a
    /// factory hands out.
    pub fn with_send_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.sends = counter;
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn send(
        &mut self,
        token: &CancellationToken,
        msg: Message,
    ) -> Result<Response, BackendError> {
        self.calls.lock().push(FakeCall::Send {
            content: msg.content.clone(),
        });
        self.sends.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return Err(BackendError::Cancelled),
            }
        }
        if token.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let scripted = self.script.lock().pop_front();
        let reply = match scripted {
            Some(step) => step,
            None => match &self.on_send {
                Some(hook) => hook(&self.work_dir, &msg),
                None => Ok(self.default_reply.clone()),
            },
        };

        match reply {
            Ok(content) => Ok(Response {
                content,
                session_id: self.session_id.clone(),
            }),
            Err(error) => Err(BackendError::CliFailed {
                backend: self.backend_type,
                status: "exit status: 1".to_string(),
                stderr: error,
            }),
        }
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.calls.lock().push(FakeCall::Close);
        Ok(())
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
