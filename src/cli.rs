use crate::backup::{Backup, BackupConfig};
use crate::error::{Error, Result};
use crate::logring::{LogRing, StatusSink};
use crate::operation::{OperationContext, OperationSummary, RunMode};
use crate::paths::ResolvedPaths;
use crate::phase::Phase;
use crate::restore::{backup_names, Restore, RestoreTarget};
use crate::services::clock::SystemClock;
use crate::services::fs::StdFileSystem;
use crate::services::process::{open_in_file_manager, GameProcess, SteamGame};
use crate::settings::{default_config_path, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

const STATUS_LINES: usize = 64;

#[derive(Parser, Debug)]
#[command(
    name = "noitabackup",
    version,
    about = "A Noita backup and restore manager",
    long_about = "A configurable Noita backup and restore manager and launcher. Automates \
                  the tedious task of starting, backing up, restoring and restarting Noita."
)]
pub struct Cli {
    /// Config file (default is $HOME/.noitabackup.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Noita save00 directory
    #[arg(long, global = true)]
    pub source_path: Option<PathBuf>,

    /// Directory holding the backups
    #[arg(long, global = true)]
    pub destination_path: Option<PathBuf>,

    /// Steam executable used to launch the game
    #[arg(long, global = true)]
    pub steam_path: Option<PathBuf>,

    /// Maximum number of backups to keep (1-64)
    #[arg(long, global = true)]
    pub num_backups: Option<i32>,

    /// Number of copy workers (1-32, advanced usage)
    #[arg(long, global = true)]
    pub num_workers: Option<usize>,

    /// Launch Noita after a successful backup or restore
    #[arg(long, global = true)]
    pub auto_launch: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Back up the Noita save directory
    Backup,
    /// Restore a backup over the Noita save directory
    Restore {
        /// Backup to restore, a timestamp such as 2024-03-09-18-05-42 or "latest"
        #[arg(short, long, default_value = "latest")]
        file: RestoreTarget,
    },
    /// List backups, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Launch Noita through Steam
    Launch,
    /// Open the backup directory in the file manager
    Explore,
}

impl Cli {
    /// Command line flags win over values read from the config file.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(path) = &self.source_path {
            settings.source_path = Some(path.clone());
        }
        if let Some(path) = &self.destination_path {
            settings.destination_path = Some(path.clone());
        }
        if let Some(path) = &self.steam_path {
            settings.steam_path = Some(path.clone());
        }
        if let Some(num_backups) = self.num_backups {
            settings.num_backups = num_backups;
        }
        if let Some(num_workers) = self.num_workers {
            settings.num_workers = num_workers;
        }
        settings.auto_launch |= self.auto_launch;
        settings
    }

    pub fn settings(&self) -> Result<Settings> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()
                .ok_or_else(|| Error::Config("cannot locate home directory".to_string()))?,
        };
        let settings = self.apply(Settings::load(&path)?);
        settings.validate()?;
        Ok(settings)
    }
}

/// Runs one command to completion.
pub fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings()?;
    let paths = ResolvedPaths::from_settings(&settings)?;
    let game = Arc::new(SteamGame::noita(&paths.launcher));
    let sink: Arc<dyn StatusSink> = Arc::new(LogRing::new(STATUS_LINES));
    let ctx = OperationContext {
        phase: Phase::global(),
        sink: sink.clone(),
        clock: Arc::new(SystemClock),
        game: game.clone(),
        fs: Arc::new(StdFileSystem),
    };
    let config = BackupConfig {
        source: paths.source.clone(),
        destination: paths.destination.clone(),
        max_backups: settings.num_backups,
        workers: settings.num_workers,
        auto_launch: settings.auto_launch,
    };

    if settings.auto_launch || cli.command == Command::Launch {
        paths.require_launcher()?;
    }

    match cli.command {
        Command::Backup => {
            paths.require_source()?;
            paths.require_destination()?;
            let summary = Backup::new(config, ctx).start(RunMode::Blocking)?.wait()?;
            print_summary("backed up to", &summary);
        }
        Command::Restore { file } => {
            paths.require_destination()?;
            let summary = Restore::new(config, ctx)
                .start(file, RunMode::Blocking)?
                .wait()?;
            print_summary("restored from", &summary);
        }
        Command::List { json } => {
            let names = backup_names(&paths.destination)?;
            if json {
                let out = serde_json::to_string_pretty(&names)
                    .map_err(|e| Error::Config(format!("cannot encode backup list: {}", e)))?;
                println!("{}", out);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Command::Launch => {
            if let Err(e) = game.launch(false) {
                sink.error(format!("failed to launch noita: {}", e));
            }
        }
        Command::Explore => {
            if let Err(e) = open_in_file_manager(&paths.destination) {
                sink.warn(format!("cannot open backup directory: {}", e));
            }
        }
    }

    Ok(())
}

fn print_summary(verb: &str, summary: &OperationSummary) {
    println!(
        "{} {} ({} dirs, {} files in {:?})",
        verb,
        summary.backup.display(),
        summary.stats.dirs,
        summary.stats.files,
        summary.elapsed
    );
}
