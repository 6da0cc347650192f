// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Q&A channel: agents ask, the orchestrator answers.
//!
//! One handler task drains a bounded inbox and invokes the supplied
//! answer function serially. Every question carries its own oneshot
//! reply channel, so concurrent askers can never receive each other's
//! answers. A slow answer does not block new `ask` sends up to the
//! inbox capacity (recommended: twice the runner concurrency).

use gf_core::TaskId;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors from asking a question.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QaError {
    #[error("cancelled")]
    Cancelled,
    #[error("question channel closed")]
    Closed,
}

/// Future returned by an [`AnswerFn`].
pub type AnswerFuture = Pin<Box<dyn Future<Output = String> + Send>>;

/// User-supplied answering logic, invoked serially by the handler.
pub type AnswerFn = Arc<dyn Fn(TaskId, String) -> AnswerFuture + Send + Sync>;

struct Question {
    task_id: TaskId,
    text: String,
    /// Dedicated reply channel; no shared reply map, no cross-talk.
    reply: oneshot::Sender<String>,
}

/// Routes agent questions to an answer function.
pub struct QaChannel {
    tx: mpsc::Sender<Question>,
    rx: Mutex<Option<mpsc::Receiver<Question>>>,
    answer: AnswerFn,
    handler: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl QaChannel {
    pub fn new(capacity: usize, answer: AnswerFn) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            answer,
            handler: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Launch the handler on a child of `token`. Idempotent.
    pub fn start(&self, token: &CancellationToken) {
        let Some(mut rx) = self.rx.lock().take() else {
            return;
        };
        let shutdown = token.child_token();
        let answer = Arc::clone(&self.answer);
        let handler_token = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let question = tokio::select! {
                    _ = handler_token.cancelled() => break,
                    q = rx.recv() => match q {
                        Some(q) => q,
                        None => break,
                    },
                };
                // Serial by construction: the next recv waits for this
                // answer to finish. Cancellation mid-answer drops the
                // reply sender, failing the current asker only.
                let answered = tokio::select! {
                    _ = handler_token.cancelled() => break,
                    a = (answer)(question.task_id.clone(), question.text.clone()) => a,
                };
                let _ = question.reply.send(answered);
            }
        });

        *self.shutdown.lock() = Some(shutdown);
        *self.handler.lock() = Some(handle);
    }

    /// Stop the handler and wait for it to exit.
    pub async fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
        }
        let handle = self.handler.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Ask a question and wait for its answer. Cancellation is honored
    /// on both the send and the receive side.
    pub async fn ask(
        &self,
        token: &CancellationToken,
        task_id: TaskId,
        text: impl Into<String>,
    ) -> Result<String, QaError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let question = Question {
            task_id,
            text: text.into(),
            reply: reply_tx,
        };

        tokio::select! {
            _ = token.cancelled() => return Err(QaError::Cancelled),
            sent = self.tx.send(question) => sent.map_err(|_| QaError::Closed)?,
        }

        tokio::select! {
            _ = token.cancelled() => Err(QaError::Cancelled),
            reply = reply_rx => reply.map_err(|_| QaError::Closed),
        }
    }
}

#[cfg(test)]
#[path = "qa_tests.rs"]
mod tests;
