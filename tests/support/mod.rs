#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use chrono::{Local, NaiveDate};
use tempfile::TempDir;

/// A throwaway tasks root directory
pub struct TestHome {
    dir: TempDir,
}

impl TestHome {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn org_dir(&self, org: &str) -> PathBuf {
        self.root().join(org)
    }

    pub fn log_path(&self, org: &str, log: &str) -> PathBuf {
        self.org_dir(org).join(format!("{log}.log"))
    }

    /// Lines of one log, empty if the file does not exist
    pub fn log_lines(&self, org: &str, log: &str) -> Vec<String> {
        fs::read_to_string(self.log_path(org, log))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn counter(&self, org: &str) -> String {
        fs::read_to_string(self.org_dir(org).join("taskid")).unwrap_or_default()
    }

    pub fn write_log(&self, org: &str, log: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.log_path(org, log);
        fs::create_dir_all(self.org_dir(org))?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_config(&self, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.root().join("config.toml");
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// `tasks` bound to this root, with ambient overrides cleared
    pub fn cmd(&self) -> Command {
        let mut cmd = tasks_cmd();
        cmd.env("TASKS_DIRECTORY", self.root());
        cmd
    }
}

pub fn tasks_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tasks").expect("binary");
    cmd.env_remove("TASKS_ORG");
    cmd.env_remove("TASKS_DIRECTORY");
    cmd.env_remove("RUST_LOG");
    cmd
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn today_str() -> String {
    today().format("%Y-%m-%d").to_string()
}
