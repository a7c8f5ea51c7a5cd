use chrono::{Local, NaiveDateTime, Timelike};

/// Source of the timestamp a backup directory is named after.
pub trait Clock: Send + Sync {
    /// Local wall clock time truncated to whole seconds.
    fn now(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}
