// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn backend(cfg: BackendConfig) -> GooseBackend {
    GooseBackend::new(cfg, ProcessManager::new())
}

fn config() -> BackendConfig {
    BackendConfig::new(BackendType::Goose, "/tmp")
}

#[test]
fn first_invocation_names_the_session() {
    let adapter = backend(config());
    let args = adapter.build_args(&Message::user("hi"), false);
    assert_eq!(args[0], "run");
    let pos = args.iter().position(|a| a == "--name").unwrap();
    assert!(args[pos + 1].starts_with("gaffer-"));
    assert!(!args.contains(&"--resume".to_string()));
}

#[test]
fn resume_invocation_uses_resume_flag() {
    let adapter = backend(config().with_session("gaffer-abc123"));
    let args = adapter.build_args(&Message::user("hi"), true);
    assert!(args.contains(&"--resume".to_string()));
    let pos = args.iter().position(|a| a == "--name").unwrap();
    assert_eq!(args[pos + 1], "gaffer-abc123");
}

#[test]
fn local_llm_flags_pass_through_unchanged() {
    let mut cfg = config().with_model("qwen2.5");
    cfg.provider = Some("ollama".to_string());
    let adapter = backend(cfg);
    let args = adapter.build_args(&Message::user("x"), false);

    let provider = args.iter().position(|a| a == "--provider").unwrap();
    assert_eq!(args[provider + 1], "ollama");
    let model = args.iter().position(|a| a == "--model").unwrap();
    assert_eq!(args[model + 1], "qwen2.5");
}

#[parameterized(
    result_key = { r#"{"result":"object reply"}"#, "object reply" },
    response_key = { r#"{"response":"other key"}"#, "other key" },
    message_key = { r#"{"message":"third key"}"#, "third key" },
)]
fn parse_single_object(stdout: &str, expected: &str) {
    assert_eq!(parse_response(stdout), expected);
}

#[test]
fn parse_ndjson_takes_last_reply() {
    let stdout = "{\"message\":\"working\"}\n{\"message\":\"done\"}";
    assert_eq!(parse_response(stdout), "done");
}

#[test]
fn parse_falls_back_to_plain_text() {
    assert_eq!(parse_response("  just words\n"), "just words");
}

#[test]
fn generated_names_are_unique() {
    let a = backend(config());
    let b = backend(config());
    assert_ne!(a.session_id(), b.session_id());
}
