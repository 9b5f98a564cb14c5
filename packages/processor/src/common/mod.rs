// Common types and utilities shared across the application

pub mod entity_ids;
pub mod error;
pub mod id;
pub mod sanitizer;
pub mod types;

pub use entity_ids::*;
pub use error::{ProcessorError, Result};
pub use id::Id;
pub use types::*;
