// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod ingest;
pub mod metrics;
pub mod store;

pub use crate::api::router;
pub use crate::ingest::aggregator::{Aggregator, RunReport};
pub use crate::ingest::scheduler::{Scheduler, TriggerError};
pub use crate::store::{DocumentStore, MemoryStore, SqliteStore};
