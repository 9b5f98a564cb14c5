//! Poll loop that claims pending graph searches and drives them through the
//! graph generator.
//!
//! # Architecture
//!
//! ```text
//! SearchPoller
//!     │
//!     ├─► claim newest PENDING search (GraphSearchManager)
//!     ├─► fetch URL preview when missing (BaseUrlScraper)
//!     ├─► run the graph generator (BaseGraphGenerator, sync or watched)
//!     └─► mark DONE / DONE_ERROR
//! ```
//!
//! One search is processed at a time. Shutdown is only observed between
//! iterations, so a claimed search always reaches a terminal status unless the
//! process dies; the startup sweep (`init`) recovers those.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::traits::{GraphWatch, Invocation, WatchUpdate};
use super::ServerDeps;
use crate::common::{ProcessorError, Result};
use crate::domains::graph_searches::{GraphResult, GraphSearch, GraphSearchManager, GraphSearchType};
use crate::domains::processors::{ProcessorManager, ProcessorPatch};

/// Configuration for the search poller.
#[derive(Debug, Clone)]
pub struct SearchPollerConfig {
    /// Identity stamped on claimed searches
    pub processor_id: String,
    /// Delay after an iteration, and when nothing is pending
    pub wait_time: Duration,
    /// Delay after the store failed
    pub wait_on_store_error: Duration,
    /// Delay between polls of a watched invocation
    pub watch_interval: Duration,
    /// Upper bound on one generator run; unbounded when `None`
    pub tool_timeout: Option<Duration>,
}

impl Default for SearchPollerConfig {
    fn default() -> Self {
        Self {
            processor_id: "noname_1_search".to_string(),
            wait_time: Duration::from_secs(1),
            wait_on_store_error: Duration::from_secs(30),
            watch_interval: Duration::from_secs(2),
            tool_timeout: None,
        }
    }
}

impl SearchPollerConfig {
    /// Create a new config with a specific processor ID.
    pub fn with_processor_id(processor_id: impl Into<String>) -> Self {
        Self {
            processor_id: processor_id.into(),
            ..Default::default()
        }
    }
}

pub struct SearchPoller {
    config: SearchPollerConfig,
    graph_searches: GraphSearchManager,
    processors: ProcessorManager,
    deps: ServerDeps,
}

impl SearchPoller {
    pub fn new(config: SearchPollerConfig, deps: ServerDeps) -> Self {
        Self {
            graph_searches: deps.graph_search_manager(&config.processor_id),
            processors: deps.processor_manager(&config.processor_id),
            config,
            deps,
        }
    }

    /// Startup sweep: hand back searches this processor left behind.
    pub async fn init(&self) -> Result<u64> {
        let reset = self.graph_searches.reset_outdated().await?;
        info!(
            processor_id = %self.config.processor_id,
            reset,
            "Reset outdated graph searches"
        );
        Ok(reset)
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            processor_id = %self.config.processor_id,
            wait_time_ms = self.config.wait_time.as_millis() as u64,
            wait_on_store_error_ms = self.config.wait_on_store_error.as_millis() as u64,
            "Search poller starting"
        );

        while !shutdown.is_cancelled() {
            let wait = self.poll_once().await;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!(processor_id = %self.config.processor_id, "Search poller stopped");
    }

    /// Run one iteration and return how long to wait before the next one.
    pub async fn poll_once(&self) -> Duration {
        let claim = match self.graph_searches.claim_next_pending().await {
            Ok(claim) => claim,
            Err(e) => {
                error!(
                    processor_id = %self.config.processor_id,
                    error = %e,
                    "Failed to claim graph search"
                );
                return self.config.wait_on_store_error;
            }
        };

        let Some(search) = claim.search else {
            if let Err(e) = self.processors.update(ProcessorPatch::polled()).await {
                warn!(error = %e, "Failed to record poll time");
            }
            debug!(
                wait_ms = self.config.wait_time.as_millis() as u64,
                "No more graph searches to go"
            );
            return self.config.wait_time;
        };

        info!(
            pending = claim.pending,
            search_id = %search.id,
            name = %search.name,
            kind = %search.kind,
            "------- Processing graph search -------"
        );

        let outcome = match self.process(&search).await {
            Ok(result) => self
                .graph_searches
                .mark_done(&search, &result)
                .await
                .map(|_| result),
            Err(e) => Err(e),
        };

        let wait = match outcome {
            Ok(result) => {
                info!(
                    search_id = %search.id,
                    nodes = result.node_count(),
                    edges = result.edge_count(),
                    "Graph search done"
                );
                self.config.wait_time
            }
            Err(e) => {
                warn!(search_id = %search.id, error = %e, "Graph search failed");

                match self
                    .graph_searches
                    .mark_done_error(&search, &e.to_string())
                    .await
                {
                    Ok(_) => self.config.wait_time,
                    Err(store_err) => {
                        error!(
                            search_id = %search.id,
                            error = %store_err,
                            "Failed to record graph search failure"
                        );
                        self.config.wait_on_store_error
                    }
                }
            }
        };

        if let Err(e) = self.processors.update(ProcessorPatch::processed()).await {
            warn!(error = %e, "Failed to record processed time");
        }

        wait
    }

    async fn process(&self, search: &GraphSearch) -> Result<GraphResult> {
        self.graph_searches.mark_processing(search).await?;

        let search = if search.kind == GraphSearchType::Url && !search.has_url_preview() {
            let preview = self.deps.url_scraper.fetch_preview(&search.name).await?;
            debug!(search_id = %search.id, title = ?preview.title, "Fetched URL preview");

            self.graph_searches
                .merge_metadata(search, &json!({ "url": preview }))
                .await?
                .unwrap_or_else(|| search.clone())
        } else {
            search.clone()
        };

        if let Err(e) = self.processors.update(ProcessorPatch::processing()).await {
            warn!(error = %e, "Failed to record processing time");
        }

        self.generate(&search).await
    }

    async fn generate(&self, search: &GraphSearch) -> Result<GraphResult> {
        // A timeout too large to represent is no bound at all.
        let deadline = self
            .config
            .tool_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        let invocation = self
            .bounded(
                deadline,
                self.deps
                    .graph_generator
                    .invoke(&search.name, &search.options),
            )
            .await?;

        match invocation {
            Invocation::Completed(result) => Ok(result),
            Invocation::Watched(mut watch) => {
                let outcome = self.bounded(deadline, self.watch(search, watch.as_mut())).await;
                watch.release().await;
                outcome
            }
        }
    }

    /// Poll a watched invocation until it finishes or fails.
    async fn watch(&self, search: &GraphSearch, watch: &mut dyn GraphWatch) -> Result<GraphResult> {
        loop {
            match watch.poll().await {
                Ok(WatchUpdate::Finished(result)) => return Ok(result),
                Ok(WatchUpdate::Partial(result)) => {
                    if let Err(e) = self.graph_searches.record_progress(search, &result).await {
                        warn!(search_id = %search.id, error = %e, "Failed to record partial graph");
                    }
                }
                Ok(WatchUpdate::Pending) => {}
                Err(ProcessorError::TransientRead(reason)) => {
                    debug!(search_id = %search.id, reason = %reason, "Graph output not ready");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.config.watch_interval).await;
        }
    }

    async fn bounded<T>(
        &self,
        deadline: Option<Instant>,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let (Some(deadline), Some(timeout)) = (deadline, self.config.tool_timeout) else {
            return work.await;
        };

        tokio::time::timeout_at(deadline, work).await.map_err(|_| {
            ProcessorError::ExternalTool(format!(
                "graph generator timed out after {}s",
                timeout.as_secs_f64()
            ))
        })?
    }
}
