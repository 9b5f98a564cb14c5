//! Storage seam for graph searches.
//!
//! Every status change is a single statement (Postgres) or a single guarded
//! critical section (memory). Callers never read-then-write to change status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;
use tokio::sync::Mutex;

use super::models::{
    GraphResult, GraphSearch, GraphSearchFilter, GraphSearchStatus, NewGraphSearch,
    PROGRESS_FAILED,
};
use crate::common::{merge_json_object, GraphSearchId, ProcessorError, Result};

#[async_trait]
pub trait GraphSearchStore: Send + Sync {
    async fn insert(&self, new: NewGraphSearch) -> Result<GraphSearch>;

    /// Newest record matching the filter.
    async fn find(&self, filter: &GraphSearchFilter) -> Result<Option<GraphSearch>>;

    /// All records, newest first.
    async fn list(&self) -> Result<Vec<GraphSearch>>;

    async fn delete(&self, id: GraphSearchId) -> Result<bool>;

    async fn count_pending(&self) -> Result<i64>;

    /// Atomically move the newest `PENDING` record to `PROCESSING` under `owner`.
    async fn claim_next_pending(&self, owner: &str) -> Result<Option<GraphSearch>>;

    async fn mark_processing(&self, id: GraphSearchId, owner: &str)
        -> Result<Option<GraphSearch>>;

    async fn merge_metadata(&self, id: GraphSearchId, patch: &Value)
        -> Result<Option<GraphSearch>>;

    /// Store a partial result without leaving `PROCESSING`.
    async fn record_progress(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>>;

    async fn mark_done(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>>;

    /// `PROCESSING` to `DONE_ERROR`. A reported `metadata.progress` is
    /// marked failed; the result is kept.
    async fn mark_done_error(&self, id: GraphSearchId, error: &str)
        -> Result<Option<GraphSearch>>;

    /// Return `owner`'s orphaned records to `PENDING`: everything still
    /// `PROCESSING`, and `DONE_ERROR` records whose error contains
    /// `error_marker` (case-insensitive).
    async fn reset_outdated(&self, owner: &str, error_marker: &str) -> Result<u64>;
}

// ============================================================================
// In-memory store
// ============================================================================

struct Entry {
    seq: u64,
    search: GraphSearch,
}

#[derive(Default)]
struct State {
    entries: HashMap<GraphSearchId, Entry>,
    next_seq: u64,
}

impl State {
    fn newest_first(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.search
                .created_at
                .cmp(&a.search.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries
    }

    fn update<F>(&mut self, id: GraphSearchId, apply: F) -> Option<GraphSearch>
    where
        F: FnOnce(&mut GraphSearch),
    {
        self.update_when(id, |_| true, apply)
    }

    /// Apply `apply` only when `guard` holds for the current record.
    fn update_when<G, F>(&mut self, id: GraphSearchId, guard: G, apply: F) -> Option<GraphSearch>
    where
        G: FnOnce(&GraphSearch) -> bool,
        F: FnOnce(&mut GraphSearch),
    {
        let entry = self.entries.get_mut(&id)?;
        if !guard(&entry.search) {
            return None;
        }
        apply(&mut entry.search);
        entry.search.updated_at = Utc::now();
        Some(entry.search.clone())
    }

    /// Move the record to `next` if the state machine allows it.
    fn transition<F>(
        &mut self,
        id: GraphSearchId,
        next: GraphSearchStatus,
        apply: F,
    ) -> Option<GraphSearch>
    where
        F: FnOnce(&mut GraphSearch),
    {
        self.update_when(
            id,
            |search| search.status.can_transition_to(next),
            |search| {
                search.status = next;
                apply(search);
            },
        )
    }
}

/// Process-local store used by tests and `STORE=memory` runs.
///
/// All operations run under one mutex, which makes the claim atomic across
/// tasks sharing the store.
#[derive(Default)]
pub struct InMemoryGraphSearchStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl InMemoryGraphSearchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a store error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProcessorError::store(anyhow!("in-memory store unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphSearchStore for InMemoryGraphSearchStore {
    async fn insert(&self, new: NewGraphSearch) -> Result<GraphSearch> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let now = Utc::now();
        let search = GraphSearch {
            id: GraphSearchId::new(),
            name: new.name,
            kind: new.kind,
            status: GraphSearchStatus::Pending,
            options: new.options,
            metadata: new.metadata,
            result: None,
            error: None,
            processor_id: new.processor_id,
            created_at: now,
            updated_at: now,
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            search.id,
            Entry {
                seq,
                search: search.clone(),
            },
        );
        Ok(search)
    }

    async fn find(&self, filter: &GraphSearchFilter) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let state = self.state.lock().await;

        let found = match filter {
            GraphSearchFilter::Id(id) => state.entries.get(id).map(|e| e.search.clone()),
            GraphSearchFilter::Name(name) => state
                .newest_first()
                .into_iter()
                .find(|e| &e.search.name == name)
                .map(|e| e.search.clone()),
        };
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<GraphSearch>> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .newest_first()
            .into_iter()
            .map(|e| e.search.clone())
            .collect())
    }

    async fn delete(&self, id: GraphSearchId) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.entries.remove(&id).is_some())
    }

    async fn count_pending(&self) -> Result<i64> {
        self.check_available()?;
        let state = self.state.lock().await;
        let count = state
            .entries
            .values()
            .filter(|e| e.search.status == GraphSearchStatus::Pending)
            .count();
        Ok(count as i64)
    }

    async fn claim_next_pending(&self, owner: &str) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let next = state
            .newest_first()
            .into_iter()
            .find(|e| e.search.status == GraphSearchStatus::Pending)
            .map(|e| e.search.id);

        Ok(next.and_then(|id| {
            state.transition(id, GraphSearchStatus::Processing, |search| {
                search.processor_id = Some(owner.to_string());
            })
        }))
    }

    async fn mark_processing(
        &self,
        id: GraphSearchId,
        owner: &str,
    ) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, GraphSearchStatus::Processing, |search| {
            search.processor_id = Some(owner.to_string());
        }))
    }

    async fn merge_metadata(
        &self,
        id: GraphSearchId,
        patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.update(id, |search| merge_json_object(&mut search.metadata, patch)))
    }

    async fn record_progress(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.update_when(
            id,
            |search| search.status == GraphSearchStatus::Processing,
            |search| {
                search.result = Some(Json(result.clone()));
                merge_json_object(&mut search.metadata, metadata_patch);
            },
        ))
    }

    async fn mark_done(
        &self,
        id: GraphSearchId,
        result: &GraphResult,
        metadata_patch: &Value,
    ) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, GraphSearchStatus::Done, |search| {
            search.error = None;
            search.result = Some(Json(result.clone()));
            merge_json_object(&mut search.metadata, metadata_patch);
        }))
    }

    async fn mark_done_error(
        &self,
        id: GraphSearchId,
        error: &str,
    ) -> Result<Option<GraphSearch>> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        Ok(state.transition(id, GraphSearchStatus::DoneError, |search| {
            search.error = Some(error.to_string());
            if let Some(progress) = search
                .metadata
                .get_mut("progress")
                .and_then(Value::as_object_mut)
            {
                progress.insert("state".to_string(), Value::from(PROGRESS_FAILED));
            }
        }))
    }

    async fn reset_outdated(&self, owner: &str, error_marker: &str) -> Result<u64> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let marker = error_marker.to_lowercase();
        let now = Utc::now();

        let mut reset = 0;
        for entry in state.entries.values_mut() {
            let search = &mut entry.search;
            if search.processor_id.as_deref() != Some(owner) {
                continue;
            }

            let orphaned = match search.status {
                GraphSearchStatus::Processing => true,
                GraphSearchStatus::DoneError => search
                    .error
                    .as_deref()
                    .is_some_and(|error| error.to_lowercase().contains(&marker)),
                _ => false,
            };

            if orphaned {
                search.status = GraphSearchStatus::Pending;
                search.processor_id = None;
                search.updated_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
