//! Configuration loading and management
//!
//! Handles parsing of `taskmaster.toml` in the data directory.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::due_soon::{DEFAULT_INTERVAL_SECS, DEFAULT_WINDOW_HOURS};
use crate::error::{Error, Result};
use crate::storage::CONFIG_FILE;

pub const MAX_PAGE_SIZE: usize = 500;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub due_soon: DueSoonConfig,

    #[serde(default)]
    pub view: ViewConfig,

    #[serde(default)]
    pub owner: OwnerConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Event log + snapshot under the data directory.
    #[default]
    File,
    /// Process-local; nothing survives exit.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "memory" => Ok(BackendKind::Memory),
            other => Err(Error::InvalidConfig(format!(
                "unknown backend kind '{other}' (expected file|memory)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DueSoonConfig {
    /// Forward window in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,

    /// Recheck interval in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_window_hours() -> i64 {
    DEFAULT_WINDOW_HOURS
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for DueSoonConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl DueSoonConfig {
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours)
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    10
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerConfig {
    /// Owner id used when nobody is signed in
    #[serde(default = "default_owner")]
    pub default: String,
}

fn default_owner() -> String {
    "local".to_string()
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            default: default_owner(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `taskmaster.toml` from the data directory, or return defaults
    pub fn load_from_dir(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        crate::lock::write_atomic(path, content.as_bytes())
    }

    pub fn validate(&self) -> Result<()> {
        if self.due_soon.window_hours <= 0 {
            return Err(Error::InvalidConfig(
                "due_soon.window_hours must be > 0".to_string(),
            ));
        }
        if self.due_soon.interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "due_soon.interval_secs must be > 0".to_string(),
            ));
        }
        if self.view.page_size == 0 || self.view.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidConfig(format!(
                "view.page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        if self.owner.default.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "owner.default cannot be empty".to_string(),
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
        assert_eq!(cfg.backend.kind, BackendKind::File);
        assert_eq!(cfg.due_soon.window_hours, 24);
        assert_eq!(cfg.due_soon.interval_secs, 60);
        assert_eq!(cfg.view.page_size, 10);
        assert_eq!(cfg.owner.default, "local");
        assert_eq!(cfg.due_soon.window(), Duration::hours(24));
        cfg.validate().expect("defaults validate");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        let content = r#"
[backend]
kind = "memory"

[view]
page_size = 25
"#;
        fs::write(&path, content.trim()).expect("write config");

        let cfg = Config::load(&path).expect("load config");
        assert_eq!(cfg.backend.kind, BackendKind::Memory);
        assert_eq!(cfg.view.page_size, 25);
        assert_eq!(cfg.due_soon.interval_secs, 60);
        assert_eq!(cfg.owner.default, "local");
    }

    #[test]
    fn invalid_values_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        for content in [
            "[view]\npage_size = 0",
            "[view]\npage_size = 501",
            "[due_soon]\nwindow_hours = 0",
            "[due_soon]\ninterval_secs = 0",
            "[owner]\ndefault = \"  \"",
        ] {
            fs::write(&path, content).expect("write config");
            let err = Config::load(&path).expect_err("invalid config");
            assert!(matches!(err, Error::InvalidConfig(_)), "{content}: {err:?}");
        }
    }

    #[test]
    fn unknown_backend_kind_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[backend]\nkind = \"firestore\"").expect("write config");
        assert!(matches!(Config::load(&path), Err(Error::TomlParse(_))));
    }

    #[test]
    fn load_from_dir_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(Config::load_from_dir(dir.path()), Config::default());

        fs::write(dir.path().join(CONFIG_FILE), "[view]\npage_size = 0").expect("write config");
        assert_eq!(Config::load_from_dir(dir.path()), Config::default());

        fs::write(dir.path().join(CONFIG_FILE), "[view]\npage_size = 3").expect("write config");
        assert_eq!(Config::load_from_dir(dir.path()).view.page_size, 3);
    }

    #[test]
    fn save_writes_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.toml");
        Config::default().save(&path).expect("save config");

        let written = fs::read_to_string(&path).expect("read config");
        assert!(written.contains("kind = \"file\""));
        assert!(written.contains("page_size = 10"));
        assert_eq!(Config::load(&path).expect("reload"), Config::default());
    }

    #[test]
    fn backend_kind_parses() {
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("sql".parse::<BackendKind>().is_err());
    }
}
