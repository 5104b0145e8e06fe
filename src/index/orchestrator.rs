//! Indexing run: enumerate → pre-filter → parse workers → batch writer → result.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver};
use tracing::{error, info, warn};

use crate::config::IndexingConfig;
use crate::error::{Result, ShelfError};
use crate::index::prefilter;
use crate::index::progress::IndexRun;
use crate::index::worker::{self, WorkerEvent};
use crate::index::writer::{BatchWriter, WriterReport};
use crate::model::email::ParsedUnit;
use crate::scan::{PathResolver, Scanner};
use crate::store::Database;

/// Settings key holding the completion time of the last run (RFC 3339).
pub const LAST_RUN_SETTING: &str = "last_index_run";

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexResult {
    /// Candidate files found by the enumerator.
    pub total_found: usize,
    /// Files committed to the catalog by this run.
    pub new_indexed: usize,
    /// Files already in the catalog.
    pub skipped: usize,
    /// Files that failed to parse or whose flush failed.
    pub failed: usize,
    pub failed_files: Vec<String>,
}

/// Indexes every message file under a root into a [`Database`].
///
/// One run at a time per catalog. The pre-filter and the inserts are separate
/// steps, so overlapping runs race on the same paths and lose whole batches
/// to the `file_path` uniqueness constraint.
#[derive(Debug, Clone)]
pub struct Indexer {
    db: Database,
    root: PathBuf,
    config: IndexingConfig,
}

impl Indexer {
    pub fn new(db: Database, root: impl Into<PathBuf>, config: IndexingConfig) -> Self {
        Self {
            db,
            root: root.into(),
            config,
        }
    }

    /// Override the number of parse workers (clamped to at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = Some(workers.max(1));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index every new file under the root.
    pub fn index_all(&self) -> Result<IndexResult> {
        self.index_with_run(&IndexRun::new(), |_, _, _| {})
    }

    /// Like [`index_all`](Self::index_all), calling `on_progress(current, total, path)`
    /// once per parsed or failed file.
    pub fn index_with_progress<F>(&self, on_progress: F) -> Result<IndexResult>
    where
        F: FnMut(usize, usize, &str),
    {
        self.index_with_run(&IndexRun::new(), on_progress)
    }

    /// Run the pipeline, publishing live counters into `run`.
    ///
    /// Only enumeration and pre-filter errors abort the run; per-file and
    /// per-flush failures are reported in the result. The callback runs on
    /// the calling thread; a panic inside it is logged and swallowed.
    pub fn index_with_run<F>(&self, run: &IndexRun, mut on_progress: F) -> Result<IndexResult>
    where
        F: FnMut(usize, usize, &str),
    {
        let started = Instant::now();
        let scanner = Scanner::new(&self.root, &self.config.extension)?;
        let resolver = PathResolver::new(&self.root)?;

        let candidates = scanner.scan()?;
        let total_found = candidates.len();
        let split = prefilter::partition(&self.db, candidates, self.config.existence_chunk_size)?;
        let skipped = split.skipped.len();
        let pending = split.pending;
        let total = pending.len();

        run.begin(total, skipped);
        let mut result = IndexResult {
            total_found,
            skipped,
            ..IndexResult::default()
        };

        if pending.is_empty() {
            run.finish();
            info!(total_found, skipped, "Nothing new to index");
            return Ok(result);
        }

        let workers = self.config.worker_count().min(total);
        info!(
            root = %resolver.root().display(),
            total_found,
            pending = total,
            skipped,
            workers,
            "Indexing started"
        );

        let (path_tx, path_rx) = unbounded::<String>();
        for path in pending {
            // The receiver is alive in this scope.
            let _ = path_tx.send(path);
        }
        drop(path_tx);

        let (unit_tx, unit_rx) = bounded::<ParsedUnit>(self.config.queue_capacity.max(1));
        let (event_tx, event_rx) = unbounded::<WorkerEvent>();
        let writer = BatchWriter::new(
            self.db.clone(),
            self.config.batch_size,
            self.config.flush_interval(),
        );
        let preview_max = self.config.preview_max_bytes;
        let resolver = &resolver;

        let outcome: Result<(Vec<String>, Vec<String>, Vec<String>, Option<WriterReport>)> =
            thread::scope(|scope| {
                let writer_handle = thread::Builder::new()
                    .name("index-writer".to_string())
                    .spawn_scoped(scope, || writer.run(unit_rx, run))
                    .map_err(|source| ShelfError::Spawn {
                        name: "index-writer".to_string(),
                        source,
                    })?;

                let mut worker_handles = Vec::with_capacity(workers);
                for i in 0..workers {
                    let name = format!("index-parse-{i}");
                    let paths = path_rx.clone();
                    let units = unit_tx.clone();
                    let events = event_tx.clone();
                    let handle = thread::Builder::new()
                        .name(name.clone())
                        .spawn_scoped(scope, move || {
                            worker::run_worker(resolver, preview_max, paths, units, events)
                        })
                        .map_err(|source| ShelfError::Spawn { name, source })?;
                    worker_handles.push(handle);
                }
                drop(unit_tx);
                drop(event_tx);

                let mut parsed = Vec::new();
                let mut parse_failures = Vec::new();
                for event in event_rx.iter() {
                    let is_failure = matches!(event, WorkerEvent::Failed { .. });
                    let current = run.advance(event.path(), is_failure);

                    let notify = catch_unwind(AssertUnwindSafe(|| {
                        on_progress(current, total, event.path())
                    }));
                    if notify.is_err() {
                        warn!(path = event.path(), "Progress callback panicked; continuing");
                    }

                    match event {
                        WorkerEvent::Parsed(path) => parsed.push(path),
                        WorkerEvent::Failed { path, .. } => parse_failures.push(path),
                    }
                }

                for handle in worker_handles {
                    if handle.join().is_err() {
                        error!("Parse worker panicked");
                    }
                }
                let abandoned = collect_abandoned(&path_rx, run);
                let report = match writer_handle.join() {
                    Ok(report) => Some(report),
                    Err(_) => {
                        error!("Batch writer panicked");
                        None
                    }
                };
                Ok((parsed, parse_failures, abandoned, report))
            });

        let (parsed, parse_failures, abandoned, report) = outcome?;

        result.failed_files = parse_failures;
        result.failed_files.extend(abandoned);
        match report {
            Some(report) => {
                result.new_indexed = report.indexed.len();
                result
                    .failed_files
                    .extend(report.failed.into_iter().map(|(path, _)| path));
            }
            None => {
                // Writer died: count only what reached the catalog.
                let parsed_count = parsed.len();
                let unconfirmed: Vec<String> = parsed
                    .into_iter()
                    .filter(|p| self.db.find_by_path(p).ok().flatten().is_none())
                    .collect();
                run.add_failed(unconfirmed.len());
                result.new_indexed = parsed_count - unconfirmed.len();
                result.failed_files.extend(unconfirmed);
            }
        }
        result.failed = result.failed_files.len();
        run.finish();

        if let Err(e) = self
            .db
            .set_setting(LAST_RUN_SETTING, &chrono::Utc::now().to_rfc3339())
        {
            warn!(error = %e, "Could not record index run time");
        }

        info!(
            total_found = result.total_found,
            new_indexed = result.new_indexed,
            skipped = result.skipped,
            failed = result.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Indexing finished"
        );
        Ok(result)
    }
}

/// Paths no worker picked up because the pipeline stopped early.
fn collect_abandoned(paths: &Receiver<String>, run: &IndexRun) -> Vec<String> {
    let abandoned: Vec<String> = paths.try_iter().collect();
    if !abandoned.is_empty() {
        warn!(count = abandoned.len(), "Files left unparsed after the writer stopped");
        run.add_failed(abandoned.len());
    }
    abandoned
}
