//! Persistence layer: SQLite-backed storage for users, conversations, and
//! transcript messages.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, User, UserUpdate};
