pub mod engine;
pub mod retention;
pub mod walker;

use crate::error::{Error, Result};
use crate::operation::{Completion, OperationContext, OperationSummary, RunMode};
use crate::phase::PhaseGuard;
use engine::{CopyCounters, CopyEngine, DEFAULT_WORKERS};
use retention::{
    backup_path, effective_max_backups, format_timestamp, list_backups, make_room,
    DEFAULT_BACKUPS_TO_KEEP,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;
use walker::{create_if_not_exists, exists};

/// Paths and limits for one backup or restore run. Paths are expected to be resolved
/// and validated by the caller.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// The live save directory.
    pub source: PathBuf,
    /// Directory holding the timestamped backups.
    pub destination: PathBuf,
    pub max_backups: i32,
    pub workers: usize,
    pub auto_launch: bool,
}

impl BackupConfig {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            max_backups: DEFAULT_BACKUPS_TO_KEEP,
            workers: DEFAULT_WORKERS,
            auto_launch: false,
        }
    }
}

/// Snapshots the save directory into `<destination>/<timestamp>`.
#[derive(Clone)]
pub struct Backup {
    config: BackupConfig,
    ctx: OperationContext,
}

impl Backup {
    pub fn new(config: BackupConfig, ctx: OperationContext) -> Self {
        Self { config, ctx }
    }

    pub fn start(&self, mode: RunMode) -> Result<Completion> {
        let guard = self.ctx.begin("during backup")?;

        if !mode.is_background() {
            return Ok(Completion::Done(self.run(guard, mode)));
        }

        let this = self.clone();
        thread::Builder::new()
            .name("backup".to_string())
            .spawn(move || this.run(guard, mode))
            .map(Completion::Pending)
            .map_err(|e| Error::io("cannot start backup thread for", &self.config.destination, e))
    }

    fn run(&self, guard: PhaseGuard, mode: RunMode) -> Result<OperationSummary> {
        let started = Instant::now();
        let timestamp = self.ctx.clock.now();
        let new_backup = backup_path(&self.config.destination, &timestamp);
        let sink = &self.ctx.sink;

        sink.info(format!("timestamp: {}", timestamp.format("%Y-%m-%d %H:%M:%S")));
        sink.info(format!("source: {}", self.config.source.display()));
        sink.info(format!("destination: {}", new_backup.display()));

        if exists(&new_backup) {
            let err = Error::BackupExists(new_backup);
            sink.error(err.to_string());
            return Err(err);
        }

        let counters = CopyCounters::new();
        if let Err(e) = self.backup_into(&new_backup, &counters) {
            return Err(self.discard_partial(&new_backup, e));
        }

        let summary = OperationSummary {
            backup: new_backup,
            stats: counters.snapshot(),
            elapsed: started.elapsed(),
        };
        sink.info(format!("total time: {:?}", summary.elapsed));
        sink.info(format!("total dirs copied: {}", summary.stats.dirs));
        sink.info(format!("total files copied: {}", summary.stats.files));
        counters.reset();
        drop(guard);

        if self.config.auto_launch {
            self.ctx.auto_launch(mode.is_background());
        }

        Ok(summary)
    }

    fn backup_into(&self, new_backup: &Path, counters: &CopyCounters) -> Result<()> {
        let engine = CopyEngine::new(self.config.workers)?;
        let destination = &self.config.destination;
        let sink = &self.ctx.sink;

        let backups = list_backups(destination).map_err(|e| {
            sink.error(format!("error getting backups: {}", e));
            e
        })?;
        sink.info(format!("number of backups: {}", backups.len()));

        let max_backups = effective_max_backups(self.config.max_backups);
        if backups.len() >= max_backups as usize {
            sink.warn(format!(
                "maximum backup threshold reached ({} of {}), oldest is {}",
                backups.len(),
                max_backups,
                backups.first().map(format_timestamp).unwrap_or_default()
            ));
            make_room(
                &backups,
                destination,
                max_backups,
                self.ctx.fs.as_ref(),
                sink.as_ref(),
            )?;
        }

        create_if_not_exists(new_backup).map_err(|e| {
            sink.error(format!("cannot create destination path: {}", e));
            e
        })?;

        engine
            .copy_tree(&self.config.source, new_backup, counters)
            .map_err(|e| {
                sink.error(format!("cannot copy source to destination: {}", e));
                e
            })
    }

    /// Removes a half written backup. The original error is always returned, wrapped
    /// together with the removal error if that failed too.
    fn discard_partial(&self, new_backup: &Path, error: Error) -> Error {
        if !exists(new_backup) {
            return error;
        }

        self.ctx
            .sink
            .info(format!("removing partial backup: {}", new_backup.display()));
        match self.ctx.fs.remove_tree(new_backup) {
            Ok(()) => error,
            Err(cleanup) => {
                self.ctx.sink.error(cleanup.to_string());
                Error::Cleanup {
                    error: Box::new(error),
                    cleanup: Box::new(cleanup),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::engine::tests::{build_save_tree, snapshot_tree};
    use crate::backup::engine::CopyStats;
    use crate::operation::testing::{fixed_time, test_context};
    use crate::services::fs::testing::FaultyFileSystem;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, BackupConfig) {
        let dir = tempdir().expect("tempdir");
        let source = dir.path().join("save00");
        let destination = dir.path().join("NoitaBackups");
        build_save_tree(&source);
        fs::create_dir_all(&destination).expect("mkdir destination");
        (dir, BackupConfig::new(source, destination))
    }

    #[test]
    fn backup_copies_the_save_into_a_timestamped_folder() {
        let (_dir, config) = setup();
        let (ctx, ring, _game) = test_context();

        let summary = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect("backup");

        assert_eq!(summary.backup, config.destination.join("2024-03-09-18-05-42"));
        assert_eq!(summary.stats, CopyStats { dirs: 5, files: 53 });
        assert_eq!(snapshot_tree(&summary.backup), snapshot_tree(&config.source));
        assert!(!ctx.phase.is_started());
        assert!(ring
            .lines()
            .iter()
            .any(|line| line == "total files copied: 53"));
    }

    #[test]
    fn rotation_keeps_the_configured_number_of_backups() {
        let (_dir, mut config) = setup();
        config.max_backups = 16;
        let (ctx, _ring, _game) = test_context();

        let oldest = fixed_time() - chrono::Duration::days(30);
        let existing: Vec<_> = (0..16)
            .map(|i| oldest + chrono::Duration::hours(i))
            .collect();
        for stamp in &existing {
            fs::create_dir_all(backup_path(&config.destination, stamp)).expect("mkdir");
        }

        let summary = Backup::new(config.clone(), ctx)
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect("backup");

        let after = list_backups(&config.destination).expect("list");
        assert_eq!(after.len(), 16);
        assert_eq!(after[..15], existing[1..]);
        assert_eq!(after[15], fixed_time());
        assert!(summary.backup.exists());
        assert!(!backup_path(&config.destination, &existing[0]).exists());
    }

    #[test]
    fn out_of_range_max_backups_falls_back_to_the_ceiling() {
        let (_dir, mut config) = setup();
        config.max_backups = 0;
        let (ctx, _ring, _game) = test_context();
        for i in 0..3 {
            let stamp = fixed_time() - chrono::Duration::minutes(i + 1);
            fs::create_dir_all(backup_path(&config.destination, &stamp)).expect("mkdir");
        }

        Backup::new(config.clone(), ctx)
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect("backup");

        assert_eq!(list_backups(&config.destination).expect("list").len(), 4);
    }

    #[test]
    fn refuses_to_run_while_the_game_is_running() {
        let (_dir, config) = setup();
        let (ctx, ring, game) = test_context();
        game.running.store(true, Ordering::SeqCst);

        let err = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Blocking)
            .expect_err("game is running");

        assert!(matches!(err, Error::GameRunning(_)));
        assert!(list_backups(&config.destination).expect("list").is_empty());
        assert!(!ctx.phase.is_started());
        assert_eq!(ring.lines(), vec!["game cannot be running during backup"]);
    }

    #[test]
    fn refuses_to_run_while_another_operation_holds_the_phase() {
        let (_dir, config) = setup();
        let (ctx, _ring, _game) = test_context();
        let _busy = ctx.phase.try_start().expect("hold phase");

        let err = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Blocking)
            .expect_err("phase is held");

        assert!(matches!(err, Error::OperationInProgress));
        assert!(list_backups(&config.destination).expect("list").is_empty());
    }

    #[test]
    fn invalid_worker_count_touches_nothing() {
        let (_dir, mut config) = setup();
        config.workers = 0;
        let (ctx, _ring, _game) = test_context();

        let err = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect_err("bad worker count");

        assert!(matches!(err, Error::InvalidWorkerCount { requested: 0, .. }));
        assert_eq!(fs::read_dir(&config.destination).expect("read").count(), 0);
        assert!(!ctx.phase.is_started());
    }

    #[test]
    fn existing_backup_with_the_same_name_is_not_overwritten() {
        let (_dir, config) = setup();
        let (ctx, _ring, _game) = test_context();
        let taken = backup_path(&config.destination, &fixed_time());
        fs::create_dir_all(&taken).expect("mkdir");
        fs::write(taken.join("marker"), b"keep me").expect("write");

        let err = Backup::new(config, ctx)
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect_err("name collision");

        assert!(matches!(err, Error::BackupExists(_)));
        assert_eq!(fs::read(taken.join("marker")).expect("read"), b"keep me");
    }

    #[cfg(unix)]
    #[test]
    fn failed_copy_removes_the_partial_backup() {
        let (_dir, config) = setup();
        let _listener =
            std::os::unix::net::UnixListener::bind(config.source.join("world/broken.sock"))
                .expect("bind");
        let (ctx, _ring, game) = test_context();
        let mut config = config;
        config.auto_launch = true;

        let err = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect_err("copy fails");

        assert!(matches!(err, Error::Workers { count: 1, .. }));
        assert!(!backup_path(&config.destination, &fixed_time()).exists());
        assert!(!ctx.phase.is_started());
        assert_eq!(game.launches.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[test]
    fn cleanup_failure_reports_both_errors() {
        let (_dir, config) = setup();
        let _listener =
            std::os::unix::net::UnixListener::bind(config.source.join("world/broken.sock"))
                .expect("bind");
        let partial = backup_path(&config.destination, &fixed_time());
        let faulty = Arc::new(FaultyFileSystem::failing_removal_of(&partial));
        let (mut ctx, ring, _game) = test_context();
        ctx.fs = faulty.clone();

        let err = Backup::new(config, ctx.clone())
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect_err("copy and cleanup fail");

        match &err {
            Error::Cleanup { error, cleanup } => {
                assert!(matches!(**error, Error::Workers { count: 1, .. }));
                assert!(matches!(**cleanup, Error::Io { ref path, .. } if *path == partial));
            }
            other => panic!("expected cleanup error, got {:?}", other),
        }
        let text = err.to_string();
        assert!(text.starts_with("1 worker errors occurred"), "{}", text);
        assert!(text.contains("removing partial backup also failed"), "{}", text);
        assert_eq!(faulty.removals(), vec![partial.clone()]);
        assert!(partial.exists());
        assert!(!ctx.phase.is_started());
        assert!(ring
            .lines()
            .iter()
            .any(|line| line.starts_with("failed to remove directory")));
    }

    #[test]
    fn launch_failure_does_not_fail_the_backup() {
        let (_dir, mut config) = setup();
        config.auto_launch = true;
        let (ctx, ring, game) = test_context();
        game.fail_launch.store(true, Ordering::SeqCst);

        let summary = Backup::new(config, ctx)
            .start(RunMode::Blocking)
            .expect("start")
            .wait()
            .expect("backup succeeds");

        assert!(summary.backup.exists());
        assert_eq!(game.launches.load(Ordering::SeqCst), 1);
        assert!(ring
            .lines()
            .iter()
            .any(|line| line.starts_with("failed to launch game")));
    }

    #[test]
    fn background_run_holds_the_phase_until_done() {
        let (_dir, config) = setup();
        let (ctx, _ring, _game) = test_context();

        let completion = Backup::new(config.clone(), ctx.clone())
            .start(RunMode::Background)
            .expect("start");
        assert!(matches!(completion, Completion::Pending(_)));

        let summary = completion.wait().expect("backup");
        assert_eq!(summary.stats, CopyStats { dirs: 5, files: 53 });
        assert!(!ctx.phase.is_started());
    }
}
