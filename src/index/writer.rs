//! Batch writer: the single consumer that persists parsed units.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::index::progress::IndexRun;
use crate::model::email::ParsedUnit;
use crate::store::Database;

/// What the writer persisted and what it could not.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriterReport {
    /// Paths committed to the catalog.
    pub indexed: Vec<String>,
    /// Paths whose flush transaction failed, with the cause.
    pub failed: Vec<(String, String)>,
    /// Number of flush transactions attempted.
    pub flushes: usize,
}

/// Accumulates units and flushes them when the batch is full or the
/// interval since the last flush has elapsed, whichever comes first.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    db: Database,
    batch_size: usize,
    flush_interval: Duration,
}

impl BatchWriter {
    pub fn new(db: Database, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Consume `units` until every sender is gone, then flush the remainder.
    pub fn run(&self, units: Receiver<ParsedUnit>, run: &IndexRun) -> WriterReport {
        let mut report = WriterReport::default();
        let mut batch: Vec<ParsedUnit> = Vec::with_capacity(self.batch_size);
        let mut deadline = Instant::now() + self.flush_interval;

        loop {
            let timeout = deadline.saturating_duration_since(Instant::now());
            match units.recv_timeout(timeout) {
                Ok(unit) => {
                    batch.push(unit);
                    if batch.len() >= self.batch_size {
                        self.flush(&mut batch, &mut report, run);
                        deadline = Instant::now() + self.flush_interval;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !batch.is_empty() {
                        self.flush(&mut batch, &mut report, run);
                    }
                    deadline = Instant::now() + self.flush_interval;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if !batch.is_empty() {
                        self.flush(&mut batch, &mut report, run);
                    }
                    break;
                }
            }
        }

        debug!(
            flushes = report.flushes,
            indexed = report.indexed.len(),
            failed = report.failed.len(),
            "Batch writer finished"
        );
        report
    }

    /// Write the batch in one transaction; on error every file in it fails.
    fn flush(&self, batch: &mut Vec<ParsedUnit>, report: &mut WriterReport, run: &IndexRun) {
        let units = std::mem::take(batch);
        report.flushes += 1;

        match self.db.insert_batch(&units) {
            Ok(ids) => {
                debug!(records = ids.len(), "Flushed batch");
                run.add_indexed(units.len());
                report
                    .indexed
                    .extend(units.into_iter().map(|u| u.email.file_path));
            }
            Err(e) => {
                warn!(records = units.len(), error = %e, "Batch flush failed; marking all files failed");
                run.add_failed(units.len());
                let cause = e.to_string();
                report.failed.extend(
                    units
                        .into_iter()
                        .map(|u| (u.email.file_path, cause.clone())),
                );
            }
        }
        batch.reserve(self.batch_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::email::NewEmail;
    use crossbeam_channel::bounded;

    fn unit(path: &str) -> ParsedUnit {
        ParsedUnit {
            email: NewEmail {
                file_path: path.to_string(),
                ..NewEmail::default()
            },
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_size_trigger_and_final_flush() {
        let db = Database::open_in_memory().unwrap();
        let writer = BatchWriter::new(db.clone(), 2, Duration::from_secs(60));
        let (tx, rx) = bounded(10);
        for i in 0..5 {
            tx.send(unit(&format!("{i}.eml"))).unwrap();
        }
        drop(tx);

        let run = IndexRun::new();
        let report = writer.run(rx, &run);
        assert_eq!(report.flushes, 3);
        assert_eq!(report.indexed.len(), 5);
        assert!(report.failed.is_empty());
        assert_eq!(db.count_emails().unwrap(), 5);
        assert_eq!(run.snapshot().new_indexed, 5);
    }

    #[test]
    fn test_time_trigger_flushes_partial_batch() {
        let db = Database::open_in_memory().unwrap();
        let writer = BatchWriter::new(db, 100, Duration::from_millis(20));
        let (tx, rx) = bounded(10);
        let run = IndexRun::new();

        let report = std::thread::scope(|s| {
            let handle = s.spawn(|| writer.run(rx, &run));
            tx.send(unit("a.eml")).unwrap();
            std::thread::sleep(Duration::from_millis(200));
            tx.send(unit("b.eml")).unwrap();
            drop(tx);
            handle.join().unwrap()
        });

        // One flush from the timer, one on close.
        assert_eq!(report.flushes, 2);
        assert_eq!(report.indexed, vec!["a.eml", "b.eml"]);
    }

    #[test]
    fn test_failed_flush_marks_whole_batch() {
        let db = Database::open_in_memory().unwrap();
        db.insert_batch(&[unit("dup.eml")]).unwrap();

        let writer = BatchWriter::new(db.clone(), 10, Duration::from_secs(60));
        let (tx, rx) = bounded(10);
        tx.send(unit("new.eml")).unwrap();
        tx.send(unit("dup.eml")).unwrap();
        drop(tx);

        let run = IndexRun::new();
        let report = writer.run(rx, &run);
        assert!(report.indexed.is_empty());
        let failed: Vec<_> = report.failed.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(failed, vec!["new.eml", "dup.eml"]);
        assert!(db.find_by_path("new.eml").unwrap().is_none());
        assert_eq!(run.snapshot().failed, 2);
    }
}
