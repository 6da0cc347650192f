// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator configuration: providers, agents, workflows.
//!
//! Configuration merges three layers with map-level override semantics,
//! later layers winning per key: built-in defaults, the global user file
//! (`<config dir>/gaffer/config.json`), then the project file
//! (`.gaffer/config.json`). A missing file is not an error; a malformed
//! one is.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Kind of agent CLI a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    Claude,
    Codex,
    Goose,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Claude => write!(f, "claude"),
            BackendType::Codex => write!(f, "codex"),
            BackendType::Goose => write!(f, "goose"),
        }
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(BackendType::Claude),
            "codex" => Ok(BackendType::Codex),
            "goose" => Ok(BackendType::Goose),
            other => Err(format!(
                "unknown backend type {other:?} (expected claude, codex, or goose)"
            )),
        }
    }
}

/// An agent CLI definition: the command to run and how to talk to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Binary to invoke, e.g. `claude` or `/usr/local/bin/goose`.
    pub command: String,
    /// Extra args prepended to every invocation.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "type")]
    pub backend_type: BackendType,
}

/// A role an agent can play, bound to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Keys into [`Config::providers`].
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Local-LLM provider passed through to backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
}

/// One step of a workflow; names an agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub agent: String,
}

/// An ordered chain of roles, e.g. coder -> reviewer -> tester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub steps: Vec<WorkflowStep>,
}

/// Top-level configuration consumed by the runner and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub workflows: HashMap<String, WorkflowConfig>,
}

impl Config {
    /// Built-in defaults: a `claude` provider and a general-purpose agent,
    /// so a bare install can run a plan without any config file.
    pub fn builtin() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "claude".to_string(),
            ProviderConfig {
                command: "claude".to_string(),
                args: Vec::new(),
                backend_type: BackendType::Claude,
            },
        );

        let mut agents = HashMap::new();
        agents.insert(
            "general".to_string(),
            AgentConfig {
                provider: "claude".to_string(),
                model: None,
                system_prompt: None,
                llm_provider: None,
                tools: Vec::new(),
            },
        );

        Self {
            providers,
            agents,
            workflows: HashMap::new(),
        }
    }

    /// Overlay `other` on top of `self`, later wins per map key.
    pub fn merge(&mut self, other: Config) {
        self.providers.extend(other.providers);
        self.agents.extend(other.agents);
        self.workflows.extend(other.workflows);
    }

    /// Load a single config file. `Ok(None)` when the file is absent.
    pub fn load_file(path: &Path) -> Result<Option<Config>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Some(config))
    }

    /// Resolve the effective config: builtin <- global user file <- project file.
    pub fn load(project_root: &Path) -> Result<Config, ConfigError> {
        let mut config = Config::builtin();
        if let Some(path) = Self::user_config_path() {
            if let Some(layer) = Self::load_file(&path)? {
                config.merge(layer);
            }
        }
        if let Some(layer) = Self::load_file(&project_root.join(".gaffer/config.json"))? {
            config.merge(layer);
        }
        Ok(config)
    }

    /// Write the config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        std::fs::write(path, json).map_err(write_err)
    }

    /// Global user config path, `None` when no config dir exists (rare).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gaffer/config.json"))
    }

    /// Default location of the persistent state database.
    pub fn default_state_db_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("gaffer/state.db"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
