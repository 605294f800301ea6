//! Durable storage layer.
//!
//! All persistence goes through the async [`Database`] trait; the default
//! backend is libSQL (local file or in-memory) with version-tracked
//! migrations.

mod libsql_backend;
mod migrations;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
