//! SQLite schema for collection tables.
//!
//! Each collection gets one table used as an indexed key/value store: the
//! full record lives in `data`, and the well-known fields are copied into
//! their own columns so lookups by token, email or user can use an index.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Denormalized lookup columns and their types, in creation order.
pub const LOOKUP_COLUMNS: &[(&str, &str)] = &[
    ("token", "TEXT"),
    ("email", "TEXT"),
    ("userId", "TEXT"),
    ("updatedAt", "INTEGER"),
];

/// Indexed lookup columns.
const INDEXED_COLUMNS: &[&str] = &["token", "email", "userId"];

/// Pragmas for the single writer connection.
const WRITER_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 268435456;    -- 256MB mmap
PRAGMA busy_timeout = 5000;
"#;

/// Pragmas for pooled reader connections.
const READER_PRAGMAS: &str = r#"
PRAGMA cache_size = -16000;      -- 16MB cache
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 268435456;
PRAGMA busy_timeout = 5000;
"#;

/// Apply write-optimized pragmas.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(WRITER_PRAGMAS)
}

/// Apply pragmas for read-only pooled connections.
pub fn apply_reader_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(READER_PRAGMAS)
}

/// Collection names double as table names, so only plain identifiers pass.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Quote a validated identifier.
pub fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

/// Whether `table` exists.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}

/// Column names of `table`.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Create the table for a collection if needed, add lookup columns missing
/// from tables created by older versions, and create the lookup indexes.
///
/// Returns the columns that had to be added.
pub fn ensure_collection_table(conn: &Connection, table: &str) -> Result<Vec<&'static str>> {
    validate_table_name(table)?;
    let quoted = quote(table);

    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {quoted} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                token TEXT,
                email TEXT,
                userId TEXT,
                updatedAt INTEGER
            )"
        ),
        [],
    )?;

    let existing = table_columns(conn, table)?;
    let mut added = Vec::new();
    for (column, ty) in LOOKUP_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            conn.execute(
                &format!("ALTER TABLE {quoted} ADD COLUMN {column} {ty}"),
                [],
            )?;
            added.push(*column);
        }
    }

    for column in INDEXED_COLUMNS {
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS \"idx_{table}_{column}\" ON {quoted}({column})"),
            [],
        )?;
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_table_name() {
        assert!(validate_table_name("orders").is_ok());
        assert!(validate_table_name("deletedUsers").is_ok());
        assert!(validate_table_name("_t2").is_ok());

        for bad in ["", "2fast", "drop table", "a-b", "x\"y", "orders;"] {
            assert!(
                matches!(validate_table_name(bad), Err(StoreError::InvalidName(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_ensure_collection_table_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(ensure_collection_table(&conn, "users").unwrap().is_empty());
        assert!(ensure_collection_table(&conn, "users").unwrap().is_empty());
        assert!(table_exists(&conn, "users").unwrap());

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'users' AND name LIKE 'idx_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 3);
    }

    #[test]
    fn test_missing_columns_are_added() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE sessions (id TEXT PRIMARY KEY, data TEXT NOT NULL, token TEXT)",
            [],
        )
        .unwrap();

        let added = ensure_collection_table(&conn, "sessions").unwrap();
        assert_eq!(added, vec!["email", "userId", "updatedAt"]);

        let columns = table_columns(&conn, "sessions").unwrap();
        assert_eq!(
            columns,
            vec!["id", "data", "token", "email", "userId", "updatedAt"]
        );
    }

    #[test]
    fn test_pragmas_apply() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        apply_reader_pragmas(&conn).unwrap();
    }
}
