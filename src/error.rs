//! Error type for store operations.
//!
//! Expected conditions never surface here: a missing record is `None`, a
//! failed delete is `false`, a corrupt file falls back to its seed. What
//! remains is misuse (wrong shape, unknown collection) and genuinely
//! unexpected I/O, serialization or SQLite failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::Shape;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for collection store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{collection}' is {actual}-shaped, operation requires {expected}")]
    WrongShape {
        collection: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("collection '{collection}' already has a record with id '{id}'")]
    DuplicateId { collection: String, id: String },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("invalid collection name: {0}")]
    InvalidName(String),

    #[error("backup not found: {}", .0.display())]
    BackupNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to get pooled connection: {0}")]
    Pool(#[from] r2d2::Error),
}

impl StoreError {
    pub(crate) fn wrong_shape(collection: &str, expected: Shape, actual: Shape) -> Self {
        Self::WrongShape {
            collection: collection.to_string(),
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_shape_message() {
        let err = StoreError::wrong_shape("carts", Shape::List, Shape::Map);
        assert_eq!(
            err.to_string(),
            "collection 'carts' is map-shaped, operation requires list"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: StoreError = io_err.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
