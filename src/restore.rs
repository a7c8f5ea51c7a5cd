use crate::backup::engine::{CopyCounters, CopyEngine};
use crate::backup::retention::{backup_path, format_timestamp, list_backups, parse_timestamp};
use crate::backup::walker::{create_if_not_exists, exists};
use crate::backup::BackupConfig;
use crate::error::{Error, IoContext, Result};
use crate::operation::{Completion, OperationContext, OperationSummary, RunMode};
use crate::phase::PhaseGuard;
use chrono::NaiveDateTime;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Instant;

/// Which backup to copy back over the live save.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RestoreTarget {
    #[default]
    Latest,
    /// A backup directory name such as `2024-03-09-18-05-42`.
    Named(String),
}

impl FromStr for RestoreTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(RestoreTarget::Latest);
        }
        parse_timestamp(s)?;
        Ok(RestoreTarget::Named(s.to_string()))
    }
}

impl fmt::Display for RestoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreTarget::Latest => f.write_str("latest"),
            RestoreTarget::Named(name) => f.write_str(name),
        }
    }
}

/// `<save>.bak`, a sibling of the save directory. Trailing separators are ignored.
pub fn swap_path(save: &Path) -> PathBuf {
    let save = save.components().as_path();
    match save.file_name() {
        Some(name) => {
            let mut name = name.to_os_string();
            name.push(".bak");
            save.with_file_name(name)
        }
        None => {
            let mut name = OsString::from(save.as_os_str());
            name.push(".bak");
            PathBuf::from(name)
        }
    }
}

/// Replaces the live save with a backup. The previous save is parked at `<save>.bak`,
/// put back if the copy fails and otherwise kept until the next restore.
#[derive(Clone)]
pub struct Restore {
    config: BackupConfig,
    ctx: OperationContext,
}

impl Restore {
    pub fn new(config: BackupConfig, ctx: OperationContext) -> Self {
        Self { config, ctx }
    }

    pub fn start(&self, target: RestoreTarget, mode: RunMode) -> Result<Completion> {
        let guard = self.ctx.begin("during restore")?;

        if !mode.is_background() {
            return Ok(Completion::Done(self.run(guard, target, mode)));
        }

        let this = self.clone();
        thread::Builder::new()
            .name("restore".to_string())
            .spawn(move || this.run(guard, target, mode))
            .map(Completion::Pending)
            .map_err(|e| Error::io("cannot start restore thread for", &self.config.source, e))
    }

    fn run(
        &self,
        guard: PhaseGuard,
        target: RestoreTarget,
        mode: RunMode,
    ) -> Result<OperationSummary> {
        let started = Instant::now();
        let sink = &self.ctx.sink;

        let engine = CopyEngine::new(self.config.workers)?;
        let chosen = self.select(&target)?;
        let backup = backup_path(&self.config.destination, &chosen);
        let save = &self.config.source;

        sink.info(format!("restoring backup: {}", backup.display()));
        sink.info(format!("destination: {}", save.display()));

        let parked = self.swap_out(save)?;

        let counters = CopyCounters::new();
        let copied = create_if_not_exists(save)
            .and_then(|()| engine.copy_tree(&backup, save, &counters));
        if let Err(restore) = copied {
            sink.error(format!("cannot copy backup to save directory: {}", restore));
            return Err(self.roll_back(save, parked, restore));
        }

        if let Some(parked) = &parked {
            sink.info(format!("previous save kept at {}", parked.display()));
        }

        let summary = OperationSummary {
            backup,
            stats: counters.snapshot(),
            elapsed: started.elapsed(),
        };
        sink.info(format!("total time: {:?}", summary.elapsed));
        sink.info(format!("total dirs copied: {}", summary.stats.dirs));
        sink.info(format!("total files copied: {}", summary.stats.files));
        drop(guard);

        if self.config.auto_launch {
            self.ctx.auto_launch(mode.is_background());
        }

        Ok(summary)
    }

    fn select(&self, target: &RestoreTarget) -> Result<NaiveDateTime> {
        let sink = &self.ctx.sink;
        let backups = list_backups(&self.config.destination).map_err(|e| {
            sink.error(format!("error getting backups: {}", e));
            e
        })?;

        let chosen = match target {
            RestoreTarget::Latest => backups.last().copied().ok_or(Error::NoBackups),
            RestoreTarget::Named(name) => parse_timestamp(name)
                .ok()
                .filter(|stamp| backups.contains(stamp))
                .ok_or_else(|| Error::BackupNotFound(name.clone())),
        };
        chosen.map_err(|e| {
            sink.error(e.to_string());
            e
        })
    }

    /// Moves the live save aside. Returns where it went, or `None` if there was no
    /// live save to move.
    fn swap_out(&self, save: &Path) -> Result<Option<PathBuf>> {
        let parked = swap_path(save);
        if exists(&parked) {
            self.ctx
                .sink
                .warn(format!("removing stale {}", parked.display()));
            self.ctx.fs.remove_tree(&parked)?;
        }

        if !exists(save) {
            return Ok(None);
        }

        self.ctx
            .fs
            .rename(save, &parked)
            .context("cannot move save directory aside", save)?;
        Ok(Some(parked))
    }

    fn roll_back(&self, save: &Path, parked: Option<PathBuf>, restore: Error) -> Error {
        let fs = &self.ctx.fs;
        let rolled_back = fs.remove_tree(save).and_then(|()| match &parked {
            Some(parked) => fs
                .rename(parked, save)
                .context("cannot move save directory back from", parked),
            None => Ok(()),
        });

        match rolled_back {
            Ok(()) => {
                self.ctx.sink.info("previous save directory put back".to_string());
                restore
            }
            Err(rollback) => {
                let err = Error::RollbackFailed {
                    rollback: Box::new(rollback),
                    restore: Box::new(restore),
                };
                self.ctx.sink.error(err.to_string());
                err
            }
        }
    }
}

/// Backups newest first, formatted as directory names.
pub fn backup_names(dest_root: &Path) -> Result<Vec<String>> {
    Ok(list_backups(dest_root)?
        .iter()
        .rev()
        .map(format_timestamp)
        .collect())
}
