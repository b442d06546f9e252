//! Read connection pool for collection lookups.
//!
//! Uses r2d2 with r2d2_sqlite for pooled read access.
//! SQLite WAL mode allows concurrent readers alongside the single writer.

use std::fmt;
use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;

use super::schema::apply_reader_pragmas;
use crate::error::Result;

/// Pooled read-only connections.
#[derive(Clone)]
pub struct ReaderPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReaderPool {
    /// Create a new reader pool for the given database path.
    ///
    /// The database must already exist; the writer connection creates it.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    pub fn new<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .connection_customizer(Box::new(ReaderConnectionCustomizer))
            .build(manager)?;

        Ok(Self { pool })
    }

    /// Get a connection from the pool.
    pub fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Current pool state.
    fn state(&self) -> r2d2::State {
        self.pool.state()
    }
}

impl fmt::Debug for ReaderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ReaderPool")
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

/// Connection customizer that applies reader pragmas.
#[derive(Debug)]
struct ReaderConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error>
    for ReaderConnectionCustomizer
{
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> std::result::Result<(), rusqlite::Error> {
        apply_reader_pragmas(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{apply_pragmas, ensure_collection_table};
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn test_reader_pool_sees_committed_rows() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.sqlite3");

        let writer = Connection::open(&db_path).unwrap();
        apply_pragmas(&writer).unwrap();
        ensure_collection_table(&writer, "orders").unwrap();

        let pool = ReaderPool::new(&db_path, 2).unwrap();

        writer
            .execute(
                "INSERT INTO orders (id, data) VALUES ('o1', '{\"id\":\"o1\"}')",
                [],
            )
            .unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_reader_pool_is_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.sqlite3");
        let writer = Connection::open(&db_path).unwrap();
        apply_pragmas(&writer).unwrap();
        ensure_collection_table(&writer, "orders").unwrap();

        let pool = ReaderPool::new(&db_path, 1).unwrap();
        let conn = pool.get().unwrap();
        assert!(conn
            .execute("INSERT INTO orders (id, data) VALUES ('x', '{}')", [])
            .is_err());
    }
}
