//! In-memory adapters for tests and local runs.

mod account_directory;

pub use account_directory::InMemoryAccountDirectory;
