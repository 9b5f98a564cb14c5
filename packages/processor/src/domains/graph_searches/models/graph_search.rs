use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Json;
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::GraphSearchId;

// ============================================================================
// Enums
// ============================================================================

/// Lifecycle status of a graph search.
///
/// ```text
/// PENDING     --claim-->              PROCESSING
/// PROCESSING  --success-->            DONE
/// PROCESSING  --failure-->            DONE_ERROR
/// DONE_ERROR  --refresh / sweep-->    PENDING
/// PROCESSING  --sweep (same owner)--> PENDING
/// ```
///
/// `DONE` is only left through a refresh, which creates a new record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphSearchStatus {
    #[default]
    Pending,
    Processing,
    Done,
    DoneError,
}

impl GraphSearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphSearchStatus::Pending => "PENDING",
            GraphSearchStatus::Processing => "PROCESSING",
            GraphSearchStatus::Done => "DONE",
            GraphSearchStatus::DoneError => "DONE_ERROR",
        }
    }

    /// Whether the repository may move a record from `self` to `next` in place.
    ///
    /// Re-asserting `PROCESSING` and re-delivering `DONE` are allowed.
    pub fn can_transition_to(&self, next: GraphSearchStatus) -> bool {
        use GraphSearchStatus::*;

        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Done)
                | (Processing, DoneError)
                | (Processing, Pending)
                | (DoneError, Pending)
                | (Done, Done)
        )
    }
}

impl std::fmt::Display for GraphSearchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of target a search name refers to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphSearchType {
    #[default]
    Keyword,
    Hashtag,
    Mention,
    Url,
    Cashtag,
}

impl GraphSearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphSearchType::Keyword => "KEYWORD",
            GraphSearchType::Hashtag => "HASHTAG",
            GraphSearchType::Mention => "MENTION",
            GraphSearchType::Url => "URL",
            GraphSearchType::Cashtag => "CASHTAG",
        }
    }
}

impl std::fmt::Display for GraphSearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Result document
// ============================================================================

/// Output of the graph generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphResult {
    #[serde(default)]
    pub nodes: Vec<serde_json::Value>,
    #[serde(default)]
    pub edges: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GraphResult {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Progress marker merged into `metadata.progress` while a watched job runs.
pub const PROGRESS_IN_PROGRESS: &str = "IN_PROGRESS";
/// Progress marker written by the final `mark_done`.
pub const PROGRESS_COMPLETE: &str = "COMPLETE";
/// Progress marker left by `mark_done_error` on a job that reported progress.
pub const PROGRESS_FAILED: &str = "FAILED";

/// Metadata patch describing the progress of a result.
pub fn progress_patch(state: &str, result: &GraphResult) -> serde_json::Value {
    json!({
        "progress": {
            "state": state,
            "nodes": result.node_count(),
            "edges": result.edge_count(),
            "updatedAt": Utc::now(),
        }
    })
}

// ============================================================================
// Graph search model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSearch {
    pub id: GraphSearchId,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: GraphSearchType,
    pub status: GraphSearchStatus,
    /// Forwarded verbatim to the graph generator.
    pub options: serde_json::Value,
    pub metadata: serde_json::Value,
    pub result: Option<Json<GraphResult>>,
    pub error: Option<String>,
    pub processor_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphSearch {
    /// Whether the URL preview has already been fetched for this search.
    pub fn has_url_preview(&self) -> bool {
        self.metadata
            .get("url")
            .and_then(|url| url.get("scrapedAt"))
            .is_some_and(|scraped_at| !scraped_at.is_null())
    }

    pub fn result(&self) -> Option<&GraphResult> {
        self.result.as_ref().map(|json| &json.0)
    }

    /// `metadata.progress.state`, when a watched run has reported progress.
    pub fn progress_state(&self) -> Option<&str> {
        self.metadata
            .get("progress")
            .and_then(|progress| progress.get("state"))
            .and_then(|state| state.as_str())
    }
}

/// Fields supplied when inserting a new search. Status always starts `PENDING`.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewGraphSearch {
    pub name: String,
    pub kind: GraphSearchType,
    #[builder(default = json!({}))]
    pub options: serde_json::Value,
    #[builder(default = json!({}))]
    pub metadata: serde_json::Value,
    #[builder(default, setter(strip_option))]
    pub processor_id: Option<String>,
}

/// Lookup key accepted by `get` and `refresh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphSearchFilter {
    Id(GraphSearchId),
    Name(String),
}

impl std::fmt::Display for GraphSearchFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphSearchFilter::Id(id) => write!(f, "id={}", id),
            GraphSearchFilter::Name(name) => write!(f, "name={}", name),
        }
    }
}

/// Outcome of one claim attempt.
#[derive(Debug, Clone)]
pub struct Claim {
    pub search: Option<GraphSearch>,
    /// Pending rows at query time. Advisory only.
    pub pending: i64,
}
