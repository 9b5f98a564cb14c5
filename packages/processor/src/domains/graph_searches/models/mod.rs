pub mod graph_search;

pub use graph_search::*;
