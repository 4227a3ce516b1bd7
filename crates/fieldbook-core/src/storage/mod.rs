//! Storage layer
//!
//! Local persistence for the offline layer.
//!
//! ## Architecture
//!
//! - **Mutation queue**: pending writes, drained in enqueue order
//! - **Query cache**: last-known-good query results with write timestamps
//!
//! Both live in one SQLite database owned by the offline layer; no other
//! component reads the tables directly.

pub mod cache;
pub mod database;
pub mod error;
pub mod queue;
pub mod schema;

pub use cache::QueryCache;
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use queue::MutationQueue;
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
