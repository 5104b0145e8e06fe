//! `emlshelf`: a searchable catalog over a directory of `.eml` files.
//!
//! Message files stay where they are; the crate builds a SQLite catalog of
//! their metadata and a full-text index over subject, sender and a bounded
//! body preview. Indexing runs as a parallel pipeline (parse workers feeding
//! one batch writer), conversations are rebuilt from `In-Reply-To` links,
//! and full content is re-read from disk on demand.

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod scan;
pub mod store;
pub mod thread;
