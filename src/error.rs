//! Error types shared by the backup and restore engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid settings, rejected before the filesystem is touched
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("max backups must be greater than zero, got {0}")]
    InvalidKeepCount(i32),

    #[error("number of workers must be between 1 and {max}, got {requested}")]
    InvalidWorkerCount { requested: usize, max: usize },

    #[error("{what} does not exist: {}", path.display())]
    PathNotFound { what: &'static str, path: PathBuf },

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error walking {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Anything other than a directory, regular file or symlink
    #[error("unsupported file type: {}", path.display())]
    UnsupportedFileType { path: PathBuf },

    #[error("invalid backup directory name '{name}'")]
    InvalidBackupName { name: String },

    /// One or more copy workers failed; every message is kept
    #[error("{count} worker errors occurred: {messages}")]
    Workers { count: usize, messages: String },

    #[error("game cannot be running {0}")]
    GameRunning(&'static str),

    #[error("operation already in progress")]
    OperationInProgress,

    #[error("backup {} already exists", .0.display())]
    BackupExists(PathBuf),

    #[error("no backup dirs found, cannot restore")]
    NoBackups,

    #[error("backup {0} not found in backup directory")]
    BackupNotFound(String),

    #[error("{error}; removing partial backup also failed: {cleanup}")]
    Cleanup {
        error: Box<Error>,
        #[source]
        cleanup: Box<Error>,
    },

    #[error("rollback failed: {rollback}; restore error was: {restore}")]
    RollbackFailed {
        rollback: Box<Error>,
        restore: Box<Error>,
    },

    #[error("failed to launch game: {0}")]
    Launch(String),

    #[error("background operation panicked")]
    Panicked,

    #[error("config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            context,
            path: path.into(),
            source,
        }
    }
}

/// Shorthand for `map_err(|e| Error::io(..))` on io results.
pub(crate) trait IoContext<T> {
    fn context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| Error::io(context, path, e))
    }
}
