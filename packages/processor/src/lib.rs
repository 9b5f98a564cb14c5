// Graph Search Processor - core library
//
// Workers claim pending graph searches from a shared store, run the external
// graph generator on them and record the outcome. The same crate serves the
// HTTP facade used to create and inspect searches.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
