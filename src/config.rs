//! Configuration loading
//!
//! Handles parsing of `<root>/config.toml`. Every field has a default, so a
//! missing file or an empty one behaves the same.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::org::{self, DEFAULT_ORGANIZATION};
use crate::query::{GroupBy, Period, SummaryOptions};

/// File name of the configuration inside the root directory
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Organization used when no `org` pointer exists
    #[serde(default = "default_organization")]
    pub default_organization: String,

    /// How long to wait for a file lock before giving up
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub summary: SummaryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_organization: default_organization(),
            lock_timeout_ms: default_lock_timeout_ms(),
            archive: ArchiveConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

fn default_organization() -> String {
    DEFAULT_ORGANIZATION.to_string()
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

/// Archive configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Minimum age in days of a finished task before `archive` moves it
    #[serde(default)]
    pub after_days: u32,
}

/// Summary configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Bucket by ISO week instead of by day
    #[serde(default)]
    pub weekly: bool,

    #[serde(default)]
    pub group_by: GroupBy,
}

impl SummaryConfig {
    pub fn options(&self) -> SummaryOptions {
        SummaryOptions {
            period: if self.weekly { Period::Week } else { Period::Day },
            group_by: self.group_by,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/config.toml`, or defaults when it does not exist
    pub fn load_from_root(root: &Path) -> crate::error::Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> crate::error::Result<()> {
        org::validate_name(&self.default_organization).map_err(|err| {
            crate::error::Error::InvalidConfig(format!("default_organization: {err}"))
        })?;

        if self.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "lock_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_are_expected() {
        let cfg = Config::default();
        assert_eq!(cfg.default_organization, "default");
        assert_eq!(cfg.lock_timeout_ms, 5000);
        assert_eq!(cfg.archive.after_days, 0);
        assert!(!cfg.summary.weekly);
        assert_eq!(cfg.summary.group_by, GroupBy::Project);
        assert_eq!(cfg.summary.options().period, Period::Day);
    }

    #[test]
    fn load_parses_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
default_organization = "work"
lock_timeout_ms = 250

[archive]
after_days = 14

[summary]
weekly = true
group_by = "tag"
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.default_organization, "work");
        assert_eq!(cfg.lock_timeout_ms, 250);
        assert_eq!(cfg.archive.after_days, 14);
        assert_eq!(
            cfg.summary.options(),
            SummaryOptions {
                period: Period::Week,
                group_by: GroupBy::Tag,
            }
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);

        for content in [
            "default_organization = \"../escape\"",
            "lock_timeout_ms = 0",
        ] {
            fs::write(&path, content).expect("write config");
            let err = Config::load(&path).expect_err("invalid config");
            match err {
                crate::error::Error::InvalidConfig(_) => {}
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_grouping_is_a_toml_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[summary]\ngroup_by = \"owner\"").expect("write config");

        let err = Config::load(&path).expect_err("invalid config");
        assert!(matches!(err, crate::error::Error::TomlParse(_)));
        assert_eq!(err.exit_code(), crate::error::exit_codes::USER_ERROR);
    }

    #[test]
    fn load_from_root_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config::load_from_root(dir.path()).expect("defaults");
        assert_eq!(cfg.default_organization, "default");
    }

    #[test]
    fn load_from_root_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(CONFIG_FILE), "default_organization = \"home\"")
            .expect("write config");

        let cfg = Config::load_from_root(dir.path()).expect("load");
        assert_eq!(cfg.default_organization, "home");
    }
}
