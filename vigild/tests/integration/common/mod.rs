//! Shared fixtures for the CLI tests.

use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub fn init_test_logging() {
    vigil_common::testing::init_global_test_logging();
}

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        tracing::info!(target: "test", $($arg)*);
    };
}

/// A scratch directory with a config file and a sessions file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.path().join("sessions.json")
    }

    /// A worktree directory that exists.
    pub fn worktree(&self, name: &str) -> PathBuf {
        let path = self.path().join("worktrees").join(name);
        std::fs::create_dir_all(&path).expect("create worktree");
        path
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.config_path(), contents).expect("write config");
    }

    pub fn write_sessions(&self, sessions: &[Value]) {
        std::fs::write(
            self.sessions_path(),
            serde_json::to_string_pretty(sessions).expect("encode sessions"),
        )
        .expect("write sessions");
    }

    /// Run `vigild` against this workspace with a clean `VIGIL_*` environment.
    pub fn run(&self, args: &[&str]) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_vigild"));
        for (key, _) in std::env::vars() {
            if key.starts_with("VIGIL_") {
                command.env_remove(key);
            }
        }
        command
            .arg("--config")
            .arg(self.config_path())
            .arg("--sessions")
            .arg(self.sessions_path())
            .args(args)
            .output()
            .expect("run vigild")
    }
}

pub fn session(id: &str, backend: &str, worktree: &Path) -> Value {
    json!({
        "id": id,
        "name": id,
        "backend": backend,
        "worktree_path": worktree,
        "created_at": "2026-01-05T10:00:00Z",
    })
}

pub fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "vigild failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}
