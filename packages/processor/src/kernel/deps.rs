//! Dependency container shared by the search poller and the HTTP routes.
//!
//! Every external collaborator sits behind a trait so tests can swap in the
//! in-memory stores and the mocks from `test_dependencies`.

use std::sync::Arc;

use sqlx::PgPool;

use super::{BaseGraphGenerator, BaseUrlScraper};
use crate::domains::graph_searches::{
    GraphSearchManager, GraphSearchStore, InMemoryGraphSearchStore, PostgresGraphSearchStore,
};
use crate::domains::processors::{
    InMemoryProcessorStore, PostgresProcessorStore, ProcessorManager, ProcessorStore,
};

#[derive(Clone)]
pub struct ServerDeps {
    /// Present when running against Postgres; used by the health probe.
    pub db_pool: Option<PgPool>,
    pub graph_searches: Arc<dyn GraphSearchStore>,
    pub processors: Arc<dyn ProcessorStore>,
    pub graph_generator: Arc<dyn BaseGraphGenerator>,
    pub url_scraper: Arc<dyn BaseUrlScraper>,
}

impl ServerDeps {
    /// Postgres-backed stores sharing one pool.
    pub fn postgres(
        pool: PgPool,
        graph_generator: Arc<dyn BaseGraphGenerator>,
        url_scraper: Arc<dyn BaseUrlScraper>,
    ) -> Self {
        Self {
            graph_searches: Arc::new(PostgresGraphSearchStore::new(pool.clone())),
            processors: Arc::new(PostgresProcessorStore::new(pool.clone())),
            db_pool: Some(pool),
            graph_generator,
            url_scraper,
        }
    }

    /// Process-local stores. State is lost on exit.
    pub fn in_memory(
        graph_generator: Arc<dyn BaseGraphGenerator>,
        url_scraper: Arc<dyn BaseUrlScraper>,
    ) -> Self {
        Self {
            db_pool: None,
            graph_searches: Arc::new(InMemoryGraphSearchStore::new()),
            processors: Arc::new(InMemoryProcessorStore::new()),
            graph_generator,
            url_scraper,
        }
    }

    pub fn graph_search_manager(&self, processor_id: &str) -> GraphSearchManager {
        GraphSearchManager::new(
            processor_id,
            self.graph_searches.clone(),
            self.url_scraper.clone(),
        )
    }

    pub fn processor_manager(&self, processor_id: &str) -> ProcessorManager {
        ProcessorManager::new(processor_id, self.processors.clone())
    }
}
