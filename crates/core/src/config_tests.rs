// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn provider(command: &str, backend_type: BackendType) -> ProviderConfig {
    ProviderConfig {
        command: command.to_string(),
        args: Vec::new(),
        backend_type,
    }
}

#[test]
fn builtin_has_claude_provider() {
    let config = Config::builtin();
    let claude = config.providers.get("claude").unwrap();
    assert_eq!(claude.backend_type, BackendType::Claude);
    assert_eq!(claude.command, "claude");
    assert!(config.agents.contains_key("general"));
}

#[test]
fn merge_is_map_level_later_wins() {
    let mut base = Config::builtin();
    let mut overlay = Config::default();
    overlay
        .providers
        .insert("claude".to_string(), provider("claude-next", BackendType::Claude));
    overlay
        .providers
        .insert("goose".to_string(), provider("goose", BackendType::Goose));

    base.merge(overlay);

    // Overridden key replaced wholesale, new key added, untouched keys kept.
    assert_eq!(base.providers.get("claude").unwrap().command, "claude-next");
    assert!(base.providers.contains_key("goose"));
    assert!(base.agents.contains_key("general"));
}

#[test]
fn load_file_absent_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = Config::load_file(&dir.path().join("nope.json")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn load_file_malformed_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();
    let err = Config::load_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deep/nested/config.json");

    let mut config = Config::default();
    config
        .providers
        .insert("codex".to_string(), provider("codex", BackendType::Codex));
    config.agents.insert(
        "reviewer".to_string(),
        AgentConfig {
            provider: "codex".to_string(),
            model: Some("o4".to_string()),
            system_prompt: Some("you review".to_string()),
            llm_provider: None,
            tools: vec!["read".to_string()],
        },
    );
    config.workflows.insert(
        "ship".to_string(),
        WorkflowConfig {
            steps: vec![
                WorkflowStep {
                    agent: "coder".to_string(),
                },
                WorkflowStep {
                    agent: "reviewer".to_string(),
                },
            ],
        },
    );

    config.save(&path).unwrap();
    let loaded = Config::load_file(&path).unwrap().unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn saved_config_is_indented() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    Config::builtin().save(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\n  "), "expected pretty-printed output");
}

#[test]
fn backend_type_parse_rejects_unknown() {
    let err = "gemini".parse::<BackendType>().unwrap_err();
    assert!(err.contains("gemini"));
    assert!(err.contains("claude"));
}

#[test]
fn provider_type_field_uses_type_key() {
    let json = r#"{"command":"claude","type":"claude"}"#;
    let parsed: ProviderConfig = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.backend_type, BackendType::Claude);
}
