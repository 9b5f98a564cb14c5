//! Kernel module - external collaborators, dependencies and the poll loop.

pub mod deps;
pub mod graph_generator;
pub mod search_poller;
pub mod test_dependencies;
pub mod traits;
pub mod url_scraper;

pub use deps::ServerDeps;
pub use graph_generator::{
    CliGraphGenerator, FileGraphWatch, GeneratorMode, SOCIAL_NETWORKS_GRAPH_GENERATOR,
};
pub use search_poller::{SearchPoller, SearchPollerConfig};
pub use test_dependencies::TestDependencies;
pub use traits::*;
pub use url_scraper::OpenGraphScraper;
