//! SQLite catalog behind an `r2d2` connection pool.
//!
//! [`Database`] is cheap to clone and shared by the indexing writer thread,
//! the conversation engine and the CLI. Query methods live in [`emails`]
//! and [`search`]; [`content`] re-reads full messages from disk.

pub mod content;
pub mod emails;
pub mod schema;
pub mod search;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::{Result, ShelfError};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Pool size for file-backed catalogs: one writer plus concurrent readers.
const FILE_POOL_SIZE: u32 = 8;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the catalog database.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

impl Database {
    /// Open (or create) a catalog file, creating its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ShelfError::io(parent, e))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = Pool::builder().max_size(FILE_POOL_SIZE).build(manager)?;

        let db = Self { pool };
        db.initialize_schema()?;
        tracing::debug!(path = %path.display(), "Opened catalog");
        Ok(db)
    }

    /// Create a private in-memory catalog (single connection).
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        // The database lives only as long as its single connection.
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;

        let db = Self { pool };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Check out a pooled connection.
    ///
    /// Callers must not hold one across calls that check out another: the
    /// in-memory pool has a single connection.
    pub fn connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        schema::initialize(&conn)
    }
}

fn init_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}
