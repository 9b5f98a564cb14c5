//! Postgres-backed store tests. Need a Docker daemon:
//! `cargo test --test postgres_store_tests -- --ignored`

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::TestHarness;
use processor_core::domains::graph_searches::{
    GraphSearchFilter, GraphSearchManager, GraphSearchStatus, GraphSearchStore, GraphSearchType,
    NewGraphSearch, PostgresGraphSearchStore,
};
use processor_core::domains::processors::{PostgresProcessorStore, ProcessorManager, ProcessorPatch};
use processor_core::kernel::test_dependencies::{graph_result, MockUrlScraper};
use serde_json::json;
use test_context::test_context;

fn manager(ctx: &TestHarness, processor_id: &str) -> GraphSearchManager {
    GraphSearchManager::new(
        processor_id,
        Arc::new(PostgresGraphSearchStore::new(ctx.db_pool.clone())),
        Arc::new(MockUrlScraper::new()),
    )
}

fn keyword(name: &str) -> NewGraphSearch {
    NewGraphSearch::builder()
        .name(name)
        .kind(GraphSearchType::Keyword)
        .build()
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn claim_takes_the_newest_pending_search(ctx: &mut TestHarness) {
    let manager = manager(ctx, "graph_1_search");
    manager.create(keyword("older")).await.unwrap();
    manager.create(keyword("newer")).await.unwrap();

    let claim = manager.claim_next_pending().await.unwrap();

    assert_eq!(claim.pending, 2);
    let search = claim.search.unwrap();
    assert_eq!(search.name, "newer");
    assert_eq!(search.status, GraphSearchStatus::Processing);
    assert_eq!(search.processor_id.as_deref(), Some("graph_1_search"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_claims_are_exclusive(ctx: &mut TestHarness) {
    let seed = manager(ctx, "seed");
    for n in 0..5 {
        seed.create(keyword(&format!("topic{n}"))).await.unwrap();
    }

    let mut handles = Vec::new();
    for worker in 0..10 {
        let manager = manager(ctx, &format!("graph_{worker}_search"));
        handles.push(tokio::spawn(async move {
            manager.claim_next_pending().await.unwrap().search
        }));
    }

    let mut claimed = HashSet::new();
    for handle in handles {
        if let Some(search) = handle.await.unwrap() {
            assert!(claimed.insert(search.id), "search claimed twice");
        }
    }
    assert_eq!(claimed.len(), 5);
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn done_keeps_metadata_and_overwrites_result(ctx: &mut TestHarness) {
    let manager = manager(ctx, "graph_1_search");
    manager.create(keyword("rust")).await.unwrap();
    let search = manager.claim_next_pending().await.unwrap().search.unwrap();

    manager
        .merge_metadata(&search, &json!({"url": {"title": "x"}}))
        .await
        .unwrap();
    manager
        .record_progress(&search, &graph_result(1, 0))
        .await
        .unwrap();
    let done = manager
        .mark_done(&search, &graph_result(2, 1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(done.status, GraphSearchStatus::Done);
    assert_eq!(done.result().unwrap().node_count(), 2);
    assert_eq!(done.metadata["url"]["title"], "x");
    assert_eq!(done.progress_state(), Some("COMPLETE"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn failure_keeps_partial_result_and_marks_progress(ctx: &mut TestHarness) {
    let manager = manager(ctx, "graph_1_search");
    manager.create(keyword("rust")).await.unwrap();
    let search = manager.claim_next_pending().await.unwrap().search.unwrap();

    manager
        .record_progress(&search, &graph_result(3, 1))
        .await
        .unwrap();
    let failed = manager
        .mark_done_error(&search, "Command failed: exit 2")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(failed.status, GraphSearchStatus::DoneError);
    assert_eq!(failed.result().unwrap().node_count(), 3);
    assert_eq!(failed.progress_state(), Some("FAILED"));
    assert_eq!(failed.metadata["progress"]["nodes"], 3);
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn status_changes_follow_the_state_machine(ctx: &mut TestHarness) {
    let store = PostgresGraphSearchStore::new(ctx.db_pool.clone());
    let search = store.insert(keyword("rust")).await.unwrap();
    let result = graph_result(1, 0);

    assert!(store.mark_done(search.id, &result, &json!({})).await.unwrap().is_none());
    assert!(store.mark_done_error(search.id, "boom").await.unwrap().is_none());
    assert!(store
        .record_progress(search.id, &result, &json!({}))
        .await
        .unwrap()
        .is_none());

    store.mark_processing(search.id, "graph_1_search").await.unwrap().unwrap();
    let done = store
        .mark_done(search.id, &result, &json!({}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, GraphSearchStatus::Done);

    assert!(store.mark_processing(search.id, "someone").await.unwrap().is_none());
    assert!(store.mark_done_error(search.id, "late").await.unwrap().is_none());
    let again = store
        .mark_done(search.id, &result, &json!({}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.processor_id.as_deref(), Some("graph_1_search"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn reset_outdated_is_scoped_to_the_processor(ctx: &mut TestHarness) {
    let mine = manager(ctx, "graph_1_search");
    let theirs = manager(ctx, "graph_2_search");

    theirs.create(keyword("foreign")).await.unwrap();
    let foreign = theirs.claim_next_pending().await.unwrap().search.unwrap();
    theirs
        .mark_done_error(&foreign, "command FAILED: exit 1")
        .await
        .unwrap();

    for name in ["crashed", "tool-failed", "bad-input"] {
        mine.create(keyword(name)).await.unwrap();
    }
    let mut claimed = Vec::new();
    for _ in 0..3 {
        claimed.push(mine.claim_next_pending().await.unwrap().search.unwrap());
    }

    for search in &claimed {
        match search.name.as_str() {
            "tool-failed" => {
                mine.mark_done_error(search, "Command failed: exit 1").await.unwrap();
            }
            "bad-input" => {
                mine.mark_done_error(search, "invalid search name").await.unwrap();
            }
            _ => {}
        }
    }

    assert_eq!(mine.reset_outdated().await.unwrap(), 2);

    let status = |name: &'static str| {
        let mine = mine.clone();
        async move {
            mine.get(&GraphSearchFilter::Name(name.to_string()))
                .await
                .unwrap()
                .unwrap()
                .status
        }
    };
    assert_eq!(status("crashed").await, GraphSearchStatus::Pending);
    assert_eq!(status("tool-failed").await, GraphSearchStatus::Pending);
    assert_eq!(status("bad-input").await, GraphSearchStatus::DoneError);
    assert_eq!(status("foreign").await, GraphSearchStatus::DoneError);
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn refresh_replaces_the_record(ctx: &mut TestHarness) {
    let manager = manager(ctx, "graph_1_server");
    let (original, created) = manager
        .create_or_get("#launch", &json!({"maxresults": 10}), &[])
        .await
        .unwrap();
    assert!(created);
    let claimed = manager.claim_next_pending().await.unwrap().search.unwrap();
    manager.mark_done(&claimed, &graph_result(2, 1)).await.unwrap();

    let refreshed = manager
        .refresh(&GraphSearchFilter::Id(original.id))
        .await
        .unwrap();

    assert_ne!(refreshed.id, original.id);
    assert_eq!(refreshed.kind, GraphSearchType::Hashtag);
    assert_eq!(refreshed.options["maxresults"], 10);
    assert!(refreshed.progress_state().is_none());
    assert!(refreshed.result.is_none());
    assert_eq!(manager.list().await.unwrap().len(), 1);

    let store = PostgresGraphSearchStore::new(ctx.db_pool.clone());
    assert!(!store.delete(original.id).await.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires docker"]
async fn processor_upsert_merges_metadata(ctx: &mut TestHarness) {
    let processors = ProcessorManager::new(
        "graph_1_search",
        Arc::new(PostgresProcessorStore::new(ctx.db_pool.clone())),
    );

    processors
        .update(
            ProcessorPatch::builder()
                .metadata(json!({"version": "1.0.0", "debug": null}))
                .build(),
        )
        .await
        .unwrap();
    let polled = processors.update(ProcessorPatch::polled()).await.unwrap();
    let processing = processors
        .update(
            ProcessorPatch::builder()
                .metadata(json!({"graphGenerator": "sngg:2.0"}))
                .build(),
        )
        .await
        .unwrap();

    assert!(polled.last_poll_at.is_some());
    assert_eq!(processing.metadata["version"], "1.0.0");
    assert_eq!(processing.metadata["graphGenerator"], "sngg:2.0");
    assert_eq!(processing.last_poll_at, polled.last_poll_at);
    assert!(processors.get().await.unwrap().is_some());
}
