//! Storage backends.

pub mod repository;
pub mod sqlite;

pub use repository::{
    Database, InMemoryStore, IntentFilter, IntentRepository, MemoryRepository,
    PortfolioRepository,
};
pub use sqlite::SqliteBackend;
