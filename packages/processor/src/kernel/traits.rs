// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no job lifecycle logic.
// The lifecycle lives in the graph_searches domain and the search poller.
//
// Naming convention: Base* for trait names (e.g., BaseGraphGenerator)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::domains::graph_searches::GraphResult;

// =============================================================================
// Graph Generator Trait (Infrastructure - external graph tool)
// =============================================================================

/// What a single generator invocation hands back.
pub enum Invocation {
    /// The tool ran to completion.
    Completed(GraphResult),
    /// The tool is running; poll the handle for its output.
    Watched(Box<dyn GraphWatch>),
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invocation::Completed(result) => f
                .debug_struct("Completed")
                .field("nodes", &result.node_count())
                .field("edges", &result.edge_count())
                .finish(),
            Invocation::Watched(_) => f.write_str("Watched"),
        }
    }
}

/// One observation of a watched invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate {
    /// Nothing new since the last poll.
    Pending,
    /// Output readable while the tool is still running.
    Partial(GraphResult),
    /// The tool exited successfully and its output is final.
    Finished(GraphResult),
}

/// Handle to a running tool whose output is polled.
#[async_trait]
pub trait GraphWatch: Send {
    /// Read the current state of the output.
    ///
    /// `ProcessorError::TransientRead` means the output is not readable yet and
    /// must not fail the job.
    async fn poll(&mut self) -> Result<WatchUpdate>;

    /// Stop the tool if it is still running and drop its scratch files.
    async fn release(&mut self);
}

#[async_trait]
pub trait BaseGraphGenerator: Send + Sync {
    /// Run the tool for `name`, forwarding `options` untouched.
    async fn invoke(&self, name: &str, options: &serde_json::Value) -> Result<Invocation>;

    /// Tool version, as reported at startup.
    fn version(&self) -> String;

    /// Provider name, used in the processor metadata (`provider:version`).
    fn provider(&self) -> &str;
}

// =============================================================================
// URL Scraper Trait (Infrastructure - link previews)
// =============================================================================

/// Link preview stored under `metadata.url` of URL searches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlPreview {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site: Option<String>,
    pub image: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

#[async_trait]
pub trait BaseUrlScraper: Send + Sync {
    /// Content type reported by the server, empty when absent.
    async fn resolve_type(&self, url: &str) -> Result<String>;

    async fn fetch_preview(&self, url: &str) -> Result<UrlPreview>;
}
