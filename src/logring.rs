use log::Level;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Receives the human readable status lines emitted by backup and restore runs.
pub trait StatusSink: Send + Sync {
    fn push(&self, level: Level, line: String);

    fn info(&self, line: String) {
        self.push(Level::Info, line);
    }

    fn warn(&self, line: String) {
        self.push(Level::Warn, line);
    }

    fn error(&self, line: String) {
        self.push(Level::Error, line);
    }
}

/// Fixed capacity ring of the most recent status lines. Every pushed line is also
/// forwarded to the `log` facade.
pub struct LogRing {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Oldest line first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn append(&self, line: String) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for LogRing {
    fn push(&self, level: Level, line: String) {
        log::log!(level, "{}", line);
        self.append(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_lines() {
        let ring = LogRing::new(3);
        for i in 0..5 {
            ring.info(format!("line {i}"));
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.lines(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn capacity_is_at_least_one() {
        let ring = LogRing::new(0);
        ring.warn("first".to_string());
        ring.warn("second".to_string());

        assert_eq!(ring.lines(), vec!["second"]);
    }
}
