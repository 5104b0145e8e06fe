//! Per-run progress state, shared between the indexing threads and observers.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Live counters of one indexing run.
///
/// Each run owns its own `IndexRun`; nothing is global. It is `Sync`, so a
/// UI thread may poll [`snapshot`](Self::snapshot) while the run progresses.
#[derive(Debug, Default)]
pub struct IndexRun {
    current: AtomicUsize,
    total: AtomicUsize,
    new_indexed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    current_file: Mutex<String>,
    finished: AtomicBool,
}

/// Point-in-time copy of an [`IndexRun`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProgressSnapshot {
    /// Parse units completed so far.
    pub current: usize,
    /// Files handed to the parse workers (found minus skipped).
    pub total: usize,
    pub new_indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub current_file: String,
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Completion in percent (100 when there is nothing to do).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.current as f64 * 100.0 / self.total as f64
        }
    }
}

impl IndexRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            current: self.current.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            new_indexed: self.new_indexed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            current_file: self
                .current_file
                .lock()
                .map(|f| f.clone())
                .unwrap_or_default(),
            finished: self.finished.load(Ordering::Acquire),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn begin(&self, total: usize, skipped: usize) {
        self.current.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
        self.skipped.store(skipped, Ordering::Relaxed);
        self.new_indexed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.finished.store(false, Ordering::Release);
    }

    /// Mark one parse unit complete. Returns the new `current` count.
    pub(crate) fn advance(&self, path: &str, failed: bool) -> usize {
        if failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut current_file) = self.current_file.lock() {
            current_file.clear();
            current_file.push_str(path);
        }
        self.current.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn add_indexed(&self, count: usize) {
        self.new_indexed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn add_failed(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
