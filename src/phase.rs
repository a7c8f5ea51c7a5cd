use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref GLOBAL_PHASE: Arc<Phase> = Arc::new(Phase::new());
}

/// Single slot shared by backup and restore: at most one of them may touch the
/// save directory at a time.
#[derive(Debug, Default)]
pub struct Phase {
    started: AtomicBool,
}

impl Phase {
    pub fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    /// The process-wide phase used by the command line front end.
    pub fn global() -> Arc<Phase> {
        Arc::clone(&GLOBAL_PHASE)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Moves the phase to `started`. Returns `None` if another operation holds it.
    pub fn try_start(self: &Arc<Self>) -> Option<PhaseGuard> {
        self.started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| PhaseGuard {
                phase: Arc::clone(self),
            })
    }
}

/// Returns the phase to `stopped` when dropped.
#[derive(Debug)]
pub struct PhaseGuard {
    phase: Arc<Phase>,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.phase.started.store(false, Ordering::SeqCst);
    }
}
