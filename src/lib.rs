//! Snapshot and restore engine for the Noita save directory.

pub mod backup;
pub mod cli;
pub mod error;
pub mod logring;
pub mod operation;
pub mod paths;
pub mod phase;
pub mod restore;
pub mod services;
pub mod settings;

pub use backup::{Backup, BackupConfig};
pub use cli::{run, Cli, Command};
pub use error::{Error, Result};
pub use logring::{LogRing, StatusSink};
pub use operation::{Completion, OperationContext, OperationSummary, RunMode};
pub use phase::{Phase, PhaseGuard};
pub use restore::{Restore, RestoreTarget};
pub use settings::Settings;
