use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use sysinfo::{ProcessesToUpdate, System};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

pub const NOITA_PROCESS_NAME: &str = "noita.exe";
pub const STEAM_NOITA_URL: &str = "steam://rungameid/881100";

#[cfg(target_os = "windows")]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// The game whose saves are being managed.
pub trait GameProcess: Send + Sync {
    fn is_running(&self) -> bool;

    /// Starts the game. With `detached` the call returns as soon as the launcher is
    /// spawned, otherwise it waits for the launcher to exit.
    fn launch(&self, detached: bool) -> Result<()>;
}

/// A game started through the Steam launcher and detected by its process name.
#[derive(Debug, Clone)]
pub struct SteamGame {
    process_name: String,
    launcher: PathBuf,
    launch_args: Vec<String>,
}

impl SteamGame {
    pub fn new(process_name: impl Into<String>, launcher: impl Into<PathBuf>) -> Self {
        Self {
            process_name: process_name.into(),
            launcher: launcher.into(),
            launch_args: Vec::new(),
        }
    }

    pub fn noita(steam: impl Into<PathBuf>) -> Self {
        Self::new(NOITA_PROCESS_NAME, steam).with_args([STEAM_NOITA_URL])
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.launcher);
        command.args(&self.launch_args);
        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NEW_PROCESS_GROUP | DETACHED_PROCESS);
        command
    }
}

impl GameProcess for SteamGame {
    fn is_running(&self) -> bool {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        sys.processes().values().any(|process| {
            process
                .name()
                .to_string_lossy()
                .eq_ignore_ascii_case(&self.process_name)
        })
    }

    fn launch(&self, detached: bool) -> Result<()> {
        if self.is_running() {
            return Err(Error::GameRunning("at launch"));
        }

        let mut command = self.command();
        if detached {
            command
                .spawn()
                .map(|_| ())
                .map_err(|e| Error::Launch(format!("{}: {}", self.launcher.display(), e)))
        } else {
            let status = command
                .status()
                .map_err(|e| Error::Launch(format!("{}: {}", self.launcher.display(), e)))?;
            if status.success() {
                Ok(())
            } else {
                Err(Error::Launch(format!(
                    "{} exited with {}",
                    self.launcher.display(),
                    status
                )))
            }
        }
    }
}

/// Opens `path` in the platform file manager. Best effort: callers only log failures.
pub fn open_in_file_manager(path: &Path) -> Result<()> {
    opener::open(path).map_err(|e| Error::Launch(format!("{}: {}", path.display(), e)))
}
