//! Graph search jobs: model, name classification, storage and lifecycle.

pub mod classify;
pub mod manager;
pub mod models;
pub mod postgres;
pub mod store;

pub use classify::{classify, Classification};
pub use manager::GraphSearchManager;
pub use models::*;
pub use postgres::PostgresGraphSearchStore;
pub use store::{GraphSearchStore, InMemoryGraphSearchStore};
