use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEBOUNCE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Modified,
    Deleted,
}

/// Batches file change events per repo with a timer-based debounce. After
/// `DEBOUNCE_DELAY` of quiet (no new events), pending changes are flushed.
pub struct Debouncer {
    pending: HashMap<String, HashMap<String, FileChangeKind>>,
    last_event_at: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            last_event_at: None,
        }
    }

    /// Record a file change event. Resets the debounce timer.
    pub fn record(&mut self, repo_path: &str, rel_path: &str, kind: FileChangeKind) {
        self.pending
            .entry(repo_path.to_string())
            .or_default()
            .insert(rel_path.to_string(), kind);
        self.last_event_at = Some(Instant::now());
    }

    /// Duration until the next flush should happen, or `None` if nothing is pending.
    pub fn time_until_flush(&self) -> Option<Duration> {
        let last = self.last_event_at?;
        if self.pending.is_empty() {
            return None;
        }
        let elapsed = last.elapsed();
        if elapsed >= DEBOUNCE_DELAY {
            Some(Duration::ZERO)
        } else {
            Some(DEBOUNCE_DELAY - elapsed)
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.time_until_flush(), Some(d) if d.is_zero())
    }

    /// Drain all pending changes grouped by repo.
    pub fn flush(&mut self) -> HashMap<String, HashMap<String, FileChangeKind>> {
        self.last_event_at = None;
        std::mem::take(&mut self.pending)
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_debouncer_has_nothing_to_flush() {
        let debouncer = Debouncer::new();
        assert!(!debouncer.has_pending());
        assert!(debouncer.time_until_flush().is_none());
        assert!(!debouncer.is_ready());
    }

    #[test]
    fn single_event_is_not_immediately_ready() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo", "src/main.rs", FileChangeKind::Modified);
        assert!(debouncer.has_pending());
        assert!(!debouncer.is_ready());
    }

    #[test]
    fn repeated_events_for_one_file_keep_latest_kind() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo", "src/main.rs", FileChangeKind::Modified);
        debouncer.record("/repo", "src/main.rs", FileChangeKind::Deleted);

        let pending = &debouncer.pending["/repo"];
        assert_eq!(pending.len(), 1);
        assert_eq!(pending["src/main.rs"], FileChangeKind::Deleted);
    }

    #[test]
    fn events_are_grouped_per_repo() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo1", "a.rs", FileChangeKind::Modified);
        debouncer.record("/repo2", "b.rs", FileChangeKind::Deleted);
        assert_eq!(debouncer.pending.len(), 2);
    }

    #[test]
    fn flush_clears_pending_state() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo", "a.rs", FileChangeKind::Modified);

        let flushed = debouncer.flush();
        assert_eq!(flushed.len(), 1);
        assert!(flushed["/repo"].contains_key("a.rs"));
        assert!(!debouncer.has_pending());
        assert!(debouncer.time_until_flush().is_none());
    }

    #[test]
    fn ready_once_delay_has_elapsed() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo", "a.rs", FileChangeKind::Modified);
        debouncer.last_event_at = Some(Instant::now() - DEBOUNCE_DELAY - Duration::from_millis(1));

        assert!(debouncer.is_ready());
        assert_eq!(debouncer.time_until_flush(), Some(Duration::ZERO));
    }

    #[test]
    fn new_event_resets_the_timer() {
        let mut debouncer = Debouncer::new();
        debouncer.record("/repo", "a.rs", FileChangeKind::Modified);
        debouncer.last_event_at =
            Some(Instant::now() - DEBOUNCE_DELAY + Duration::from_millis(100));

        debouncer.record("/repo", "b.rs", FileChangeKind::Modified);
        assert!(!debouncer.is_ready());
        assert!(debouncer.time_until_flush().unwrap() > Duration::from_secs(1));
    }
}
