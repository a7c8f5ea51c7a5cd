use crate::backup::engine::CopyStats;
use crate::error::{Error, Result};
use crate::logring::StatusSink;
use crate::phase::{Phase, PhaseGuard};
use crate::services::clock::Clock;
use crate::services::fs::FileSystem;
use crate::services::process::GameProcess;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Collaborators shared by backup and restore runs.
#[derive(Clone)]
pub struct OperationContext {
    pub phase: Arc<Phase>,
    pub sink: Arc<dyn StatusSink>,
    pub clock: Arc<dyn Clock>,
    pub game: Arc<dyn GameProcess>,
    pub fs: Arc<dyn FileSystem>,
}

impl OperationContext {
    /// Rejects the run if the game is up or another run holds the phase.
    pub(crate) fn begin(&self, during: &'static str) -> Result<PhaseGuard> {
        if self.game.is_running() {
            let err = Error::GameRunning(during);
            self.sink.error(err.to_string());
            return Err(err);
        }

        match self.phase.try_start() {
            Some(guard) => Ok(guard),
            None => {
                self.sink.error(Error::OperationInProgress.to_string());
                Err(Error::OperationInProgress)
            }
        }
    }

    /// Best effort: a failed launch never fails the operation that triggered it.
    pub(crate) fn auto_launch(&self, detached: bool) {
        if let Err(e) = self.game.launch(detached) {
            self.sink.warn(format!("failed to launch game: {}", e));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run on the calling thread.
    Blocking,
    /// Run on a background thread and return immediately.
    Background,
}

impl RunMode {
    pub fn is_background(self) -> bool {
        self == RunMode::Background
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    /// The backup that was written or restored from.
    pub backup: PathBuf,
    pub stats: CopyStats,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// Outcome of `start`: either already finished or still running in the background.
#[derive(Debug)]
pub enum Completion {
    Done(Result<OperationSummary>),
    Pending(JoinHandle<Result<OperationSummary>>),
}

impl Completion {
    pub fn wait(self) -> Result<OperationSummary> {
        match self {
            Completion::Done(result) => result,
            Completion::Pending(handle) => handle.join().map_err(|_| Error::Panicked)?,
        }
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
