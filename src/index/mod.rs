//! Concurrent indexing pipeline.
//!
//! The [`Indexer`] enumerates message files, drops the ones already in the
//! catalog, parses the rest on a pool of worker threads and hands the results
//! to a single [`BatchWriter`] that commits them in transactions.

pub mod orchestrator;
pub mod prefilter;
pub mod progress;
pub mod worker;
pub mod writer;

pub use orchestrator::{IndexResult, Indexer};
pub use progress::{IndexRun, ProgressSnapshot};
pub use worker::{parse_unit, truncate_preview, WorkerEvent};
pub use writer::{BatchWriter, WriterReport};
