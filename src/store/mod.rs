//! Persistence layer — libSQL-backed storage for threads, items, and runs.

pub mod legacy;
pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
