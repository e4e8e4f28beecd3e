mod backend;
mod postgres;
mod sanitize;
mod sqlite;

pub use backend::{DurableStore, SqlDialect, TableSpec, DATA_COLUMNS};
pub use postgres::PostgresBackend;
pub use sanitize::{validate_identifier, validate_limit, SqlSanitizeError};
pub use sqlite::SqliteBackend;
