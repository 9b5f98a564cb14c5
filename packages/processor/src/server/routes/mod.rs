// HTTP routes
pub mod graph_searches;
pub mod health;

pub use graph_searches::*;
pub use health::*;
