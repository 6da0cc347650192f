// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O: subprocess supervision and agent CLI backends

pub mod backend;
pub mod process;

pub use backend::{
    new_backend, Backend, BackendConfig, BackendError, ClaudeBackend, CodexBackend, GooseBackend,
    Message, Response, Role,
};
pub use process::{
    execute_command, new_command, run_with_timeout, CommandOutput, ProcessError, ProcessManager,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use backend::fake::{FakeBackend, FakeCall};
