#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// A throwaway data directory for one test.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// `tm` pointed at this directory with ambient overrides cleared.
    pub fn tm(&self) -> Command {
        let mut cmd = tm_cmd();
        cmd.arg("--dir").arg(self.path());
        cmd
    }

    /// Run `tm <args> --json`, assert success and return the `data` object.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self
            .tm()
            .args(args)
            .arg("--json")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let value: Value = serde_json::from_slice(&output).expect("json envelope");
        assert_eq!(value["status"], "success");
        value["data"].clone()
    }

    /// Add a task and return its id.
    pub fn add(&self, args: &[&str]) -> String {
        let mut full = vec!["add"];
        full.extend_from_slice(args);
        let data = self.json(&full);
        data["task"]["id"].as_str().expect("task id").to_string()
    }
}

pub fn tm_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tm").expect("binary");
    cmd.env_remove("TASKMASTER_DIR")
        .env_remove("TASKMASTER_OWNER")
        .env_remove("TASKMASTER_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

pub fn titles(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|task| task["title"].as_str().expect("title").to_string())
        .collect()
}
