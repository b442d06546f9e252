//! Stockroom: an embedded collection store for an e-commerce backend.
//!
//! Route handlers and background jobs talk to named collections (`orders`,
//! `users`, `products`, `carts`, ...) through one uniform contract, the
//! [`storage::CollectionStore`] trait. Two engines implement it:
//!
//! - **File-backed**: one JSON document per collection, an in-memory cache
//!   with secondary indexes, debounced writes and atomic-rename durability
//! - **SQLite-backed**: one table per collection used as an indexed key/value
//!   store, migrated from the JSON file on first use
//!
//! # Modules
//!
//! - [`catalog`]: Known collections, their shapes and seed data
//! - [`clock`]: Injectable time source
//! - [`config`]: CLI and environment configuration
//! - [`daemon`]: Long-running process lifecycle
//! - [`error`]: Store error type
//! - [`observability`]: Metrics and tracing setup
//! - [`query`]: Query predicates and index lookup classification
//! - [`record`]: Schema-less record model
//! - [`registry`]: Backend selection and maintenance operations
//! - [`storage`]: Both storage engines

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions,    // storage::file::FileStore is fine
    clippy::must_use_candidate,         // Not all functions need #[must_use]
    clippy::missing_errors_doc,         // Error docs can be verbose
    clippy::missing_panics_doc,         // Panic docs can be verbose
    clippy::needless_raw_string_hashes, // r#""# is fine for SQL
    clippy::similar_names,              // id/ids/idx are fine
    clippy::struct_excessive_bools,     // Config structs may have flags
    clippy::too_many_lines              // Some functions are inherently long
)]

pub mod catalog;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod observability;
pub mod query;
pub mod record;
pub mod registry;
pub mod storage;

pub use error::{Result, StoreError};
pub use query::Query;
pub use record::{CollectionData, Record, Shape};
pub use registry::{RegistryBuilder, StoreRegistry};
pub use storage::{Backend, CollectionStore};

use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable) record ID.
///
/// Used for records inserted without an `id` and for rows migrated from
/// JSON files that lack one.
///
/// # Example
///
/// ```
/// let id = stockroom::generate_record_id();
/// assert!(id.len() == 36); // UUID string format
/// ```
#[must_use]
pub fn generate_record_id() -> String {
    Uuid::now_v7().to_string()
}

/// Get the current Unix timestamp in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
