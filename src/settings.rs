use crate::backup::engine::{DEFAULT_WORKERS, MAX_WORKERS};
use crate::backup::retention::{DEFAULT_BACKUPS_TO_KEEP, MAX_BACKUPS_TO_KEEP};
use crate::error::{Error, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".noitabackup.yaml";

/// Contents of `~/.noitabackup.yaml`. Every key is optional; unset paths fall back to
/// the platform defaults in [`crate::paths`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub source_path: Option<PathBuf>,
    pub destination_path: Option<PathBuf>,
    pub steam_path: Option<PathBuf>,
    pub num_backups: i32,
    pub num_workers: usize,
    pub auto_launch: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_path: None,
            destination_path: None,
            steam_path: None,
            num_backups: DEFAULT_BACKUPS_TO_KEEP,
            num_workers: DEFAULT_WORKERS,
            auto_launch: false,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path).context("failed to read config file", path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BACKUPS_TO_KEEP).contains(&self.num_backups) {
            return Err(Error::Config(format!(
                "num-backups must be between 1 and {}, got {}",
                MAX_BACKUPS_TO_KEEP, self.num_backups
            )));
        }
        if !(1..=MAX_WORKERS).contains(&self.num_workers) {
            return Err(Error::InvalidWorkerCount {
                requested: self.num_workers,
                max: MAX_WORKERS,
            });
        }
        Ok(())
    }
}
