//! Summary store implementations for Threadwise.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySummaryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSummaryStore;
