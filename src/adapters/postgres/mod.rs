//! PostgreSQL adapters.

mod account_directory;

pub use account_directory::PostgresAccountDirectory;

/// Embedded schema migrations from `migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
