//! Data directory layout and file helpers.
//!
//! # Directory Structure
//!
//! ```text
//! <data dir>/
//!   taskmaster.toml          # Configuration
//!   taskmaster.lock          # Writer lock
//!   tasks.jsonl              # Task event log (file backend)
//!   tasks.snapshot.json      # Materialized task list (file backend)
//!   accounts.json            # Local identity accounts
//!   session.json             # Signed-in user, if any
//!   password_resets.jsonl    # Requested password resets
//!   objects/                 # Uploaded objects (profile photos)
//! ```
//!
//! The data directory is `--dir`, else `$TASKMASTER_DIR`, else the platform
//! data directory.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::lock::{self, FileLock, DEFAULT_LOCK_TIMEOUT_MS};

pub const DIR_ENV: &str = "TASKMASTER_DIR";
pub const CONFIG_FILE: &str = "taskmaster.toml";
pub const LOCK_FILE: &str = "taskmaster.lock";
pub const TASKS_LOG_FILE: &str = "tasks.jsonl";
pub const TASKS_SNAPSHOT_FILE: &str = "tasks.snapshot.json";

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory from an explicit path, the environment,
    /// or the platform default.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        if let Some(path) = std::env::var_os(DIR_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::new(PathBuf::from(path)));
        }
        let dirs = ProjectDirs::from("dev", "taskmaster", "taskmaster").ok_or_else(|| {
            Error::InvalidConfig(format!(
                "cannot determine a data directory; pass --dir or set {DIR_ENV}"
            ))
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn tasks_log(&self) -> PathBuf {
        self.root.join(TASKS_LOG_FILE)
    }

    pub fn tasks_snapshot(&self) -> PathBuf {
        self.root.join(TASKS_SNAPSHOT_FILE)
    }

    pub fn accounts_file(&self) -> PathBuf {
        self.root.join("accounts.json")
    }

    pub fn session_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn password_resets_file(&self) -> PathBuf {
        self.root.join("password_resets.jsonl")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Create the directory tree and empty task files. Existing files are kept.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.objects_dir())?;

        let log = self.tasks_log();
        if !log.exists() {
            File::create(&log)?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file().exists() || self.tasks_log().exists()
    }

    /// Take the data-directory writer lock.
    pub fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(self.lock_file(), DEFAULT_LOCK_TIMEOUT_MS)
    }

    // =========================================================================
    // File I/O helpers
    // =========================================================================

    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        lock::write_atomic(path, json.as_bytes())
    }

    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Like [`Storage::read_json`], but a missing file yields `T::default()`.
    pub fn read_json_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        self.read_json(path)
    }

    /// Append one record. Callers hold the writer lock.
    pub fn append_jsonl<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{json}")?;
        file.sync_all()?;
        Ok(())
    }

    /// Read every record of a JSONL file.
    ///
    /// A torn final line (a writer interrupted mid-append) is skipped with a
    /// warning; malformed lines elsewhere are an error.
    pub fn read_jsonl<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
        let last = lines.iter().rposition(|line| !line.trim().is_empty());

        let mut records = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(err) if Some(index) == last => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %err,
                        "skipping torn trailing record"
                    );
                }
                Err(err) => return Err(Error::Json(err)),
            }
        }
        Ok(records)
    }
}
