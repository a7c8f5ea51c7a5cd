use crate::error::{Error, Result};
use crate::settings::Settings;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const SOURCE_OVERRIDE_ENV: &str = "CONFIG_NOITA_SRC_PATH";
pub const DESTINATION_OVERRIDE_ENV: &str = "CONFIG_NOITA_DST_PATH";

const NOITA_SAVE_DIR: &str = "Nolla_Games_Noita/save00";
const BACKUP_DIR_NAME: &str = "NoitaBackups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub launcher: PathBuf,
}

impl ResolvedPaths {
    /// Resolves every path from `settings`, letting the environment override the save
    /// and backup directories.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            source: resolve(
                "source path",
                std::env::var_os(SOURCE_OVERRIDE_ENV),
                settings.source_path.as_deref(),
                default_source(),
            )?,
            destination: resolve(
                "destination path",
                std::env::var_os(DESTINATION_OVERRIDE_ENV),
                settings.destination_path.as_deref(),
                default_destination(),
            )?,
            launcher: settings
                .steam_path
                .clone()
                .unwrap_or_else(default_launcher),
        })
    }

    pub fn require_source(&self) -> Result<()> {
        require_exists("source path", &self.source)
    }

    pub fn require_destination(&self) -> Result<()> {
        require_exists("destination path", &self.destination)
    }

    /// The launcher must be an executable path or a program found on `PATH`.
    pub fn require_launcher(&self) -> Result<()> {
        which::which(&self.launcher)
            .map(|found| log::debug!("launcher resolved to {}", found.display()))
            .map_err(|_| Error::PathNotFound {
                what: "steam path",
                path: self.launcher.clone(),
            })
    }
}

/// Picks the first of: a non-empty override, the configured value, the default.
pub fn resolve(
    what: &'static str,
    env_override: Option<OsString>,
    configured: Option<&Path>,
    default: Option<PathBuf>,
) -> Result<PathBuf> {
    env_override
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| configured.map(Path::to_path_buf))
        .or(default)
        .ok_or_else(|| Error::Config(format!("cannot determine a default {}", what)))
}

pub fn require_exists(what: &'static str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::PathNotFound {
            what,
            path: path.to_path_buf(),
        })
    }
}

/// `<home>/AppData/LocalLow/Nolla_Games_Noita/save00`
pub fn default_source() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("AppData").join("LocalLow").join(NOITA_SAVE_DIR))
}

pub fn default_destination() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(BACKUP_DIR_NAME))
}

pub fn default_launcher() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\Program Files (x86)\Steam\steam.exe")
    } else {
        PathBuf::from("steam")
    }
}
