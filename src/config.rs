//! Configuration file
//!
//! JSON settings shared by every command. Command-line flags override the
//! values loaded here.

use crate::error::{Result, RustMtapeError};
use crate::tape_ops::WriteOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_DIR_NAME: &str = "rust-mtape";
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtapeConfig {
    /// Drive name (`TAPE0`), device path or `virtual`
    pub device: String,
    /// Lifecycle hook run at backup events
    pub script: Option<PathBuf>,
    pub catalog_path: PathBuf,
    /// Where the intended/completed journals live
    pub journal_dir: PathBuf,
    pub log_file: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
    /// Local mail submission program, e.g. `["sendmail", "-t"]`
    pub mail_command: Vec<String>,
    pub poll_interval_ms: u64,
    pub lock_attempts: u32,
    /// Tape-ready polls before giving up; unbounded when absent
    pub detect_attempts: Option<u32>,
    pub hash_on_write: bool,
    pub block_size: Option<u32>,
}

impl Default for MtapeConfig {
    fn default() -> Self {
        Self {
            device: "TAPE0".to_string(),
            script: None,
            catalog_path: PathBuf::from("tapeLibrary.db"),
            journal_dir: PathBuf::from("."),
            log_file: None,
            error_log: None,
            mail_command: Vec::new(),
            poll_interval_ms: 500,
            lock_attempts: 10,
            detect_attempts: None,
            hash_on_write: true,
            block_size: None,
        }
    }
}

impl MtapeConfig {
    /// `<config_dir>/rust-mtape/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load `explicit` (which must exist), else the default file if present,
    /// else built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(RustMtapeError::config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            RustMtapeError::config(format!("{}: {}", path.display(), e))
        })?;
        debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn write_options(&self, show_progress: bool) -> WriteOptions {
        WriteOptions {
            hash_on_write: self.hash_on_write,
            block_size: self.block_size,
            show_progress,
        }
    }
}
