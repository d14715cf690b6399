//! Storage layer for the hbnb entity graph.
//!
//! [`Storage`] is the entry point: it selects a [`FileStorage`] (one JSON
//! document) or a [`DbStorage`] (sea-orm, one table per kind) from
//! [`configs::StorageConfig`] and forwards the [`StorageEngine`] operations.

pub mod db;
pub mod engine;
pub mod error;
pub mod facade;
pub mod file;
mod test_support;

pub use db::DbStorage;
pub use engine::{ObjectMap, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use facade::Storage;
pub use file::FileStorage;
