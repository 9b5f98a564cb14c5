pub mod graph_searches;
pub mod processors;
