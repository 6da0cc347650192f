// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    claude = { BackendType::Claude },
    codex = { BackendType::Codex },
    goose = { BackendType::Goose },
)]
fn factory_dispatches_on_type(backend_type: BackendType) {
    let cfg = BackendConfig::new(backend_type, "/tmp");
    let backend = new_backend(cfg, ProcessManager::new());
    assert_eq!(backend.backend_type(), backend_type);
}

#[test]
fn factory_threads_session_through() {
    let cfg = BackendConfig::new(BackendType::Claude, "/tmp").with_session("sess-1");
    let backend = new_backend(cfg, ProcessManager::new());
    assert_eq!(backend.session_id(), "sess-1");
}

#[test]
fn cancelled_process_error_maps_to_cancelled() {
    let err: BackendError = ProcessError::Cancelled.into();
    assert!(err.is_cancelled());

    let err: BackendError = ProcessError::Timeout {
        description: "x".to_string(),
        timeout: std::time::Duration::from_secs(1),
    }
    .into();
    assert!(!err.is_cancelled());
}

#[test]
fn message_user_constructor() {
    let msg = Message::user("hello");
    assert_eq!(msg.role, Role::User);
    assert_eq!(msg.role.as_str(), "user");
    assert_eq!(msg.content, "hello");
}
