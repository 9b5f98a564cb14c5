//! Lifecycle operations on graph searches for one processor identity.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::classify::{classify, Classification};
use super::models::{
    progress_patch, Claim, GraphResult, GraphSearch, GraphSearchFilter, NewGraphSearch,
    PROGRESS_COMPLETE, PROGRESS_IN_PROGRESS,
};
use super::store::GraphSearchStore;
use crate::common::{merge_json_object, ProcessorError, Result};
use crate::kernel::BaseUrlScraper;

/// Error text marking a failure of the generator command itself. Such failures
/// are retried by the startup sweep; input-level failures are not.
pub const COMMAND_FAILED_MARKER: &str = "Command failed";

/// Options applied under the caller's options when a search is created.
pub fn default_search_options() -> Value {
    json!({
        "maxresults": 5000,
        "compute_botscore": true,
        "batch_size": 200,
    })
}

#[derive(Clone)]
pub struct GraphSearchManager {
    processor_id: String,
    store: Arc<dyn GraphSearchStore>,
    url_scraper: Arc<dyn BaseUrlScraper>,
}

impl GraphSearchManager {
    pub fn new(
        processor_id: impl Into<String>,
        store: Arc<dyn GraphSearchStore>,
        url_scraper: Arc<dyn BaseUrlScraper>,
    ) -> Self {
        Self {
            processor_id: processor_id.into(),
            store,
            url_scraper,
        }
    }

    pub fn processor_id(&self) -> &str {
        &self.processor_id
    }

    pub async fn classify(&self, raw_name: &str, blocked_mimes: &[String]) -> Result<Classification> {
        classify(raw_name, blocked_mimes, self.url_scraper.as_ref()).await
    }

    /// Insert a new `PENDING` search stamped with this processor's id.
    pub async fn create(&self, new: NewGraphSearch) -> Result<GraphSearch> {
        info!(
            processor_id = %self.processor_id,
            name = %new.name,
            kind = %new.kind,
            "Creating graph search"
        );

        let new = NewGraphSearch {
            processor_id: Some(self.processor_id.clone()),
            ..new
        };
        self.store.insert(new).await
    }

    /// Classify `raw_name` and return the search already stored under its
    /// canonical name, or create one. The flag is `true` when created.
    pub async fn create_or_get(
        &self,
        raw_name: &str,
        options: &Value,
        blocked_mimes: &[String],
    ) -> Result<(GraphSearch, bool)> {
        let Classification { kind, name } = self.classify(raw_name, blocked_mimes).await?;

        if let Some(existing) = self.get(&GraphSearchFilter::Name(name.clone())).await? {
            debug!(search_id = %existing.id, name = %name, "Graph search already exists");
            return Ok((existing, false));
        }

        let mut all_options = default_search_options();
        merge_json_object(&mut all_options, options);

        let search = self
            .create(
                NewGraphSearch::builder()
                    .name(name)
                    .kind(kind)
                    .options(all_options)
                    .build(),
            )
            .await?;
        Ok((search, true))
    }

    pub async fn get(&self, filter: &GraphSearchFilter) -> Result<Option<GraphSearch>> {
        self.store.find(filter).await
    }

    pub async fn list(&self) -> Result<Vec<GraphSearch>> {
        self.store.list().await
    }

    /// Replace the matching search with a fresh `PENDING` copy.
    ///
    /// Delete and re-insert are two statements; a reader in between sees no
    /// record.
    pub async fn refresh(&self, filter: &GraphSearchFilter) -> Result<GraphSearch> {
        let existing = self
            .get(filter)
            .await?
            .ok_or_else(|| ProcessorError::NotFound(filter.to_string()))?;

        info!(
            processor_id = %self.processor_id,
            search_id = %existing.id,
            name = %existing.name,
            "Refreshing graph search"
        );

        self.store.delete(existing.id).await?;

        // Progress belongs to the run that produced it.
        let mut metadata = existing.metadata;
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.remove("progress");
        }

        self.create(
            NewGraphSearch::builder()
                .name(existing.name)
                .kind(existing.kind)
                .options(existing.options)
                .metadata(metadata)
                .build(),
        )
        .await
    }

    /// Count pending searches and claim the newest one for this processor.
    pub async fn claim_next_pending(&self) -> Result<Claim> {
        debug!(processor_id = %self.processor_id, "Looking for pending graph searches");

        let pending = self.store.count_pending().await?;
        let search = self.store.claim_next_pending(&self.processor_id).await?;

        Ok(Claim { search, pending })
    }

    pub async fn mark_processing(&self, search: &GraphSearch) -> Result<Option<GraphSearch>> {
        let updated = self
            .store
            .mark_processing(search.id, &self.processor_id)
            .await?;
        Ok(self.warn_if_skipped(search, updated))
    }

    pub async fn merge_metadata(
        &self,
        search: &GraphSearch,
        patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        let updated = self.store.merge_metadata(search.id, patch).await?;
        Ok(self.warn_if_skipped(search, updated))
    }

    /// Persist a partial result; the search stays `PROCESSING`.
    pub async fn record_progress(
        &self,
        search: &GraphSearch,
        result: &GraphResult,
    ) -> Result<Option<GraphSearch>> {
        debug!(
            search_id = %search.id,
            nodes = result.node_count(),
            edges = result.edge_count(),
            "Recording partial graph"
        );

        let patch = progress_patch(PROGRESS_IN_PROGRESS, result);
        let updated = self.store.record_progress(search.id, result, &patch).await?;
        Ok(self.warn_if_skipped(search, updated))
    }

    pub async fn mark_done(
        &self,
        search: &GraphSearch,
        result: &GraphResult,
    ) -> Result<Option<GraphSearch>> {
        let patch = progress_patch(PROGRESS_COMPLETE, result);
        let updated = self.store.mark_done(search.id, result, &patch).await?;
        Ok(self.warn_if_skipped(search, updated))
    }

    /// Record a failure. Any previous result is left in place and reported
    /// progress is marked failed.
    pub async fn mark_done_error(
        &self,
        search: &GraphSearch,
        error: &str,
    ) -> Result<Option<GraphSearch>> {
        let updated = self.store.mark_done_error(search.id, error).await?;
        Ok(self.warn_if_skipped(search, updated))
    }

    /// Return searches orphaned by a previous run of this processor to
    /// `PENDING`. Runs once at startup.
    pub async fn reset_outdated(&self) -> Result<u64> {
        info!(processor_id = %self.processor_id, "Resetting outdated graph searches");

        self.store
            .reset_outdated(&self.processor_id, COMMAND_FAILED_MARKER)
            .await
    }

    fn warn_if_skipped(
        &self,
        search: &GraphSearch,
        updated: Option<GraphSearch>,
    ) -> Option<GraphSearch> {
        if updated.is_none() {
            warn!(
                processor_id = %self.processor_id,
                search_id = %search.id,
                "Graph search missing or not in an updatable status (refreshed?)"
            );
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::graph_searches::models::{
        GraphSearchStatus, GraphSearchType, PROGRESS_FAILED,
    };
    use crate::domains::graph_searches::store::InMemoryGraphSearchStore;
    use crate::kernel::test_dependencies::MockUrlScraper;

    fn manager(owner: &str, store: Arc<InMemoryGraphSearchStore>) -> GraphSearchManager {
        GraphSearchManager::new(owner, store, Arc::new(MockUrlScraper::new()))
    }

    fn blocked() -> Vec<String> {
        vec!["image".into()]
    }

    fn graph(nodes: usize, edges: usize) -> GraphResult {
        GraphResult {
            nodes: (0..nodes).map(|i| json!({ "id": i })).collect(),
            edges: (0..edges).map(|i| json!({ "id": i })).collect(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn create_stamps_processor_and_pending() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("noname_1_server", store);

        let search = manager
            .create(
                NewGraphSearch::builder()
                    .name("#launch")
                    .kind(GraphSearchType::Hashtag)
                    .processor_id("someone-else")
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(search.status, GraphSearchStatus::Pending);
        assert_eq!(search.processor_id.as_deref(), Some("noname_1_server"));
    }

    #[tokio::test]
    async fn create_or_get_merges_defaults_and_dedupes() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        let (created, is_new) = manager
            .create_or_get("#launch!", &json!({ "maxresults": 10 }), &blocked())
            .await
            .unwrap();
        assert!(is_new);
        assert_eq!(created.name, "#launch");
        assert_eq!(created.options["maxresults"], json!(10));
        assert_eq!(created.options["batch_size"], json!(200));
        assert_eq!(created.options["compute_botscore"], json!(true));

        let (again, is_new) = manager
            .create_or_get("#launch", &json!({}), &blocked())
            .await
            .unwrap();
        assert!(!is_new);
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn refresh_recreates_as_pending_with_same_options() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        let (original, _) = manager
            .create_or_get("@alice", &json!({ "lang": "fr" }), &blocked())
            .await
            .unwrap();
        let claim = manager.claim_next_pending().await.unwrap();
        let claimed = claim.search.unwrap();
        manager.record_progress(&claimed, &graph(3, 1)).await.unwrap();
        let failed = manager
            .mark_done_error(&claimed, "Command failed: exit 1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.progress_state(), Some(PROGRESS_FAILED));

        let refreshed = manager
            .refresh(&GraphSearchFilter::Name("@alice".into()))
            .await
            .unwrap();
        assert_ne!(refreshed.id, original.id);
        assert_eq!(refreshed.status, GraphSearchStatus::Pending);
        assert_eq!(refreshed.options, original.options);
        assert!(refreshed.error.is_none());
        assert!(refreshed.progress_state().is_none());
        assert!(refreshed.result.is_none());

        let old = manager
            .get(&GraphSearchFilter::Id(original.id))
            .await
            .unwrap();
        assert!(old.is_none());
    }

    #[tokio::test]
    async fn refresh_of_missing_search_is_not_found() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        let err = manager
            .refresh(&GraphSearchFilter::Name("nothing".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::NotFound(_)));
    }

    #[tokio::test]
    async fn claim_reports_pending_count_before_claiming() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        assert_eq!(manager.claim_next_pending().await.unwrap().pending, 0);

        manager.create_or_get("one", &json!({}), &blocked()).await.unwrap();
        manager.create_or_get("two", &json!({}), &blocked()).await.unwrap();

        let claim = manager.claim_next_pending().await.unwrap();
        assert_eq!(claim.pending, 2);
        assert_eq!(claim.search.unwrap().name, "two");
    }

    #[tokio::test]
    async fn progress_then_done_updates_metadata() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        manager.create_or_get("rust", &json!({}), &blocked()).await.unwrap();
        let search = manager.claim_next_pending().await.unwrap().search.unwrap();

        let partial = manager
            .record_progress(&search, &graph(1, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(partial.status, GraphSearchStatus::Processing);
        assert_eq!(partial.progress_state(), Some(PROGRESS_IN_PROGRESS));
        assert_eq!(partial.metadata["progress"]["nodes"], json!(1));

        let done = manager
            .mark_done(&search, &graph(2, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, GraphSearchStatus::Done);
        assert_eq!(done.progress_state(), Some(PROGRESS_COMPLETE));
        assert_eq!(done.result().unwrap().edge_count(), 1);

        let again = manager
            .mark_done(&search, &graph(2, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.status, GraphSearchStatus::Done);
    }

    #[tokio::test]
    async fn mark_done_clears_previous_error() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        manager.create_or_get("rust", &json!({}), &blocked()).await.unwrap();
        let search = manager.claim_next_pending().await.unwrap().search.unwrap();
        manager
            .mark_done_error(&search, "Command failed: exit 1")
            .await
            .unwrap();
        assert_eq!(manager.reset_outdated().await.unwrap(), 1);

        let retried = manager.claim_next_pending().await.unwrap().search.unwrap();
        assert_eq!(retried.id, search.id);
        assert!(retried.error.is_some());

        let done = manager
            .mark_done(&retried, &graph(0, 0))
            .await
            .unwrap()
            .unwrap();
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn merge_metadata_keeps_existing_keys() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store);

        let search = manager
            .create(
                NewGraphSearch::builder()
                    .name("rust")
                    .kind(GraphSearchType::Keyword)
                    .metadata(json!({ "origin": "api" }))
                    .build(),
            )
            .await
            .unwrap();

        let updated = manager
            .merge_metadata(&search, &json!({ "url": { "title": "x" } }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.metadata["origin"], json!("api"));
        assert_eq!(updated.metadata["url"]["title"], json!("x"));
    }

    #[tokio::test]
    async fn updates_on_deleted_search_return_none() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let manager = manager("w1", store.clone());

        manager.create_or_get("rust", &json!({}), &blocked()).await.unwrap();
        let search = manager.claim_next_pending().await.unwrap().search.unwrap();
        store.delete(search.id).await.unwrap();

        assert!(manager
            .mark_done(&search, &graph(1, 1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_outdated_is_scoped_to_this_processor() {
        let store = Arc::new(InMemoryGraphSearchStore::new());
        let mine = manager("w1", store.clone());
        let other = manager("w2", store.clone());

        mine.create_or_get("a", &json!({}), &blocked()).await.unwrap();
        other.create_or_get("b", &json!({}), &blocked()).await.unwrap();

        let b = other.claim_next_pending().await.unwrap().search.unwrap();
        let a = mine.claim_next_pending().await.unwrap().search.unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(b.name, "b");

        assert_eq!(mine.reset_outdated().await.unwrap(), 1);
        assert_eq!(store.count_pending().await.unwrap(), 1);

        let b = other
            .get(&GraphSearchFilter::Id(b.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(b.status, GraphSearchStatus::Processing);
    }
}
