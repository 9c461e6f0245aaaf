//! Common test utilities for bearing integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never touch the
//! user's `~/.local/share/bearing/` or `~/.config/bearing/`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with an isolated database and config location.
///
/// The `bearing()` method sets `BEARING_DB` and `BEARING_CONFIG` per
/// invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new environment and run `bearing init`.
    pub fn init() -> Self {
        let env = Self::new();
        env.bearing().arg("init").assert().success();
        env
    }

    /// Initialized environment with org `acme`, a corporate team and an
    /// admin `admin@acme.test`. Returns the corporate team id.
    pub fn with_org() -> (Self, String) {
        let env = Self::init();
        env.bearing()
            .args(["org", "create", "Acme", "--slug", "acme"])
            .assert()
            .success();
        let team = env.json(&["team", "create", "HQ", "--org", "acme", "--level", "corporate"]);
        let team_id = team["id"].as_str().unwrap().to_string();
        env.bearing()
            .args([
                "user", "create", "--org", "acme", "--email", "admin@acme.test",
                "--first-name", "Ada", "--last-name", "Admin", "--role", "admin", "--team",
                &team_id,
            ])
            .assert()
            .success();
        (env, team_id)
    }

    /// Get a Command for the bearing binary with isolated paths.
    pub fn bearing(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bearing"));
        cmd.env("BEARING_DB", self.db_path());
        cmd.env("BEARING_CONFIG", self.config_path());
        cmd.env("BEARING_LOG", "warn");
        cmd.env_remove("BEARING_HOST");
        cmd.env_remove("BEARING_PORT");
        cmd.env_remove("ANTHROPIC_API_KEY");
        cmd.env_remove("ANTHROPIC_MODEL");
        cmd
    }

    /// Run a command that must succeed and parse its JSON stdout.
    pub fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.bearing().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "bearing {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.path().join("bearing.db")
    }

    /// Location of config.kdl; the file only exists once written.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("config.kdl")
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.config_path(), contents).unwrap();
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
