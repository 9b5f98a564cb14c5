//! Registry of worker processes and their liveness timestamps.

pub mod manager;
pub mod models;
pub mod store;

pub use manager::ProcessorManager;
pub use models::*;
pub use store::{InMemoryProcessorStore, PostgresProcessorStore, ProcessorStore};
