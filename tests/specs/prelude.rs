//! Test helpers for behavioral specifications.
//!
//! Provides a small DSL for asserting on gaffer CLI runs:
//! `gaffer(dir).args(..).passes().stdout_has("..")`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;

/// A gaffer invocation under construction.
pub struct Spec {
    cmd: assert_cmd::Command,
}

/// The gaffer binary, rooted in an isolated working directory.
///
/// XDG dirs point into the scratch directory so user config and state
/// never leak into specs.
pub fn gaffer(dir: &Path) -> Spec {
    let mut cmd = assert_cmd::Command::cargo_bin("gaffer").unwrap();
    cmd.current_dir(dir);
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg-config"));
    cmd.env("XDG_DATA_HOME", dir.join("xdg-data"));
    cmd.env("HOME", dir.join("home"));
    Spec { cmd }
}

impl Spec {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn passes(mut self) -> SpecOutput {
        let output = self.cmd.output().unwrap();
        assert!(
            output.status.success(),
            "expected success, got {:?}\nstdout: {}\nstderr: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
        SpecOutput { output }
    }

    pub fn fails(mut self) -> SpecOutput {
        let output = self.cmd.output().unwrap();
        assert!(
            !output.status.success(),
            "expected failure, but it passed\nstdout: {}",
            String::from_utf8_lossy(&output.stdout),
        );
        SpecOutput { output }
    }
}

/// Finished invocation with content assertions.
pub struct SpecOutput {
    output: Output,
}

impl SpecOutput {
    pub fn stdout_has(self, needle: &str) -> Self {
        let stdout = String::from_utf8_lossy(&self.output.stdout).into_owned();
        assert!(
            stdout.contains(needle),
            "stdout missing {needle:?}:\n{stdout}"
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        let stderr = String::from_utf8_lossy(&self.output.stderr).into_owned();
        assert!(
            stderr.contains(needle),
            "stderr missing {needle:?}:\n{stderr}"
        );
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        let stdout = String::from_utf8_lossy(&self.output.stdout).into_owned();
        assert!(
            !stdout.contains(needle),
            "stdout unexpectedly contains {needle:?}:\n{stdout}"
        );
        self
    }
}

/// Scratch directory holding a plan file; returns (dir, plan path).
pub fn plan_fixture(plan: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plan.toml");
    std::fs::write(&path, plan).unwrap();
    (dir, path)
}

pub const VALID_PLAN: &str = r#"
[[task]]
id = "build"
role = "general"
prompt = "Build the thing"

[[task]]
id = "verify"
role = "general"
prompt = "Verify the thing"
depends_on = ["build"]
"#;

pub const CYCLIC_PLAN: &str = r#"
[[task]]
id = "a"
role = "general"
prompt = "p"
depends_on = ["b"]

[[task]]
id = "b"
role = "general"
prompt = "p"
depends_on = ["a"]
"#;
