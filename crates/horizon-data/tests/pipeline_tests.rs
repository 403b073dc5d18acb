//! Behaviour of composed provider chains.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, op_keys, row, EventLog, ScriptedProvider};
use futures_util::StreamExt;
use horizon_data::{
    collect_items, get_enhanced_data_provider, AbortController, ContainsKeysParameters, DataCache,
    DataProvider, DataProviderEvent, EnhancementOptions, FetchByKeysParameters,
    FetchByOffsetParameters, FetchListParameters, Item, MutationEventDetail,
    MutationOperationDetail, ProviderChain, SharedDataProvider,
};
use serde_json::{json, Value};

fn enhanced(source: &Arc<ScriptedProvider>) -> SharedDataProvider<i64, Value> {
    let source: SharedDataProvider<i64, Value> = source.clone();
    get_enhanced_data_provider(source, &EnhancementOptions::default())
}

#[tokio::test]
async fn test_remove_reaches_consumer_only_for_fetched_rows() {
    init_tracing();
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2]]));
    let provider = ProviderChain::new(source.clone() as SharedDataProvider<i64, Value>)
        .with_caching(true)
        .with_event_filtering(true)
        .build();
    let log = EventLog::attach(provider.as_ref());

    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();
    source.dispatch(MutationEventDetail::new().with_remove(MutationOperationDetail::new([2, 3])));

    let events = log.take();
    assert_eq!(events.len(), 1);
    let detail = events[0].mutation().unwrap();
    assert_eq!(op_keys(detail.remove.as_ref()), vec![2]);
}

#[tokio::test]
async fn test_each_key_yielded_once_per_iteration() {
    init_tracing();
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2, 2], vec![3, 1], vec![2]]));
    let provider = enhanced(&source);

    let mut stream = provider.fetch_first(FetchListParameters::new());
    let mut pages = Vec::new();
    while let Some(page) = stream.next().await {
        pages.push(page.unwrap().keys().copied().collect::<Vec<_>>());
    }
    assert_eq!(pages, vec![vec![1, 2], vec![3]]);
}

#[tokio::test]
async fn test_lookups_after_iteration_skip_the_source() {
    init_tracing();
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2], vec![3, 4]]));
    let provider = enhanced(&source);
    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();

    let found = provider.fetch_by_keys(FetchByKeysParameters::new([4, 1])).await.unwrap();
    assert_eq!(found.results.values().cloned().collect::<Vec<_>>(), vec![row(4), row(1)]);

    let range = provider.fetch_by_offset(FetchByOffsetParameters::new(1, 2)).await.unwrap();
    assert_eq!(range.results, vec![row(2), row(3)]);

    let contains = provider.contains_keys(ContainsKeysParameters::new([3, 9])).await.unwrap();
    assert_eq!(contains.results.into_iter().collect::<Vec<_>>(), vec![3]);

    assert_eq!(source.lookup_calls(), 0);
    assert_eq!(source.fetch_first_calls(), 1);
}

#[tokio::test]
async fn test_lookup_outside_visited_rows_reaches_the_source() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2], vec![3, 4]]));
    let provider = enhanced(&source);
    let mut stream = provider.fetch_first(FetchListParameters::new());
    stream.next().await.unwrap().unwrap();

    let found = provider.fetch_by_keys(FetchByKeysParameters::new([4])).await.unwrap();
    assert_eq!(found.results.len(), 1);
    assert_eq!(source.lookup_calls(), 1);
}

#[tokio::test]
async fn test_filtered_remove_shrinks_parallel_arrays() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2]]));
    let provider = enhanced(&source);
    let log = EventLog::attach(provider.as_ref());
    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();

    source.dispatch(
        MutationEventDetail::new().with_remove(
            MutationOperationDetail::new([1, 2, 3])
                .with_data(vec![json!("a"), json!("b"), json!("c")])
                .with_indexes(vec![0, 1, 2]),
        ),
    );
    let events = log.take();
    let remove = events[0].mutation().unwrap().remove.clone().unwrap();
    assert_eq!(remove.keys.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(remove.data, Some(vec![json!("a"), json!("b")]));
    assert_eq!(remove.indexes, Some(vec![0, 1]));
}

#[tokio::test]
async fn test_irrelevant_mutations_produce_no_event() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2]]));
    let provider = enhanced(&source);
    let log = EventLog::attach(provider.as_ref());
    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();

    source.dispatch(
        MutationEventDetail::new()
            .with_remove(MutationOperationDetail::new([7]))
            .with_update(MutationOperationDetail::new([8]).with_data(vec![json!({ "id": 8 })])),
    );
    source.dispatch(MutationEventDetail::new());
    assert!(log.take().is_empty());

    // Adds are never filtered.
    let added = MutationOperationDetail::from_items(vec![row(9)]);
    source.dispatch(MutationEventDetail::new().with_add(added));
    assert_eq!(op_keys(log.take()[0].mutation().unwrap().add.as_ref()), vec![9]);
}

#[tokio::test]
async fn test_refresh_empties_cache_and_is_forwarded() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2]]));
    let provider = enhanced(&source);
    let log = EventLog::attach(provider.as_ref());
    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();

    source.refresh();
    assert_eq!(log.take(), vec![DataProviderEvent::Refresh]);

    // Nothing is cached any more, so lookups go to the source and removes are dropped.
    provider.fetch_by_keys(FetchByKeysParameters::new([1])).await.unwrap();
    assert_eq!(source.lookup_calls(), 1);
    source.dispatch(MutationEventDetail::new().with_remove(MutationOperationDetail::new([1])));
    assert!(log.take().is_empty());

    source.refresh();
    assert_eq!(log.take(), vec![DataProviderEvent::Refresh]);
}

#[tokio::test]
async fn test_updates_refresh_cached_rows() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1, 2]]));
    let provider = enhanced(&source);
    collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();

    let renamed = json!({ "id": 1, "name": "renamed" });
    let update = MutationOperationDetail::new([1]).with_data(vec![renamed.clone()]);
    source.dispatch(MutationEventDetail::new().with_update(update));
    let found = provider.fetch_by_keys(FetchByKeysParameters::new([1])).await.unwrap();
    assert_eq!(found.results[&1].data, renamed);
    assert_eq!(source.lookup_calls(), 0);
}

#[tokio::test]
async fn test_enhancement_is_idempotent() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1]]));
    let once = enhanced(&source);
    let twice = get_enhanced_data_provider(once.clone(), &EnhancementOptions::default());
    assert!(Arc::ptr_eq(&once, &twice));
}

#[tokio::test]
async fn test_fetch_errors_pass_through_unchanged() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1], vec![2]]));
    source.fail_after_first_page("backend offline");
    let provider = enhanced(&source);

    let mut stream = provider.fetch_first(FetchListParameters::new());
    assert!(stream.next().await.unwrap().is_ok());
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err, horizon_data::DataError::fetch("backend offline"));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_abort_between_pages_leaves_no_partial_rows() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1], vec![2]]));
    let cache = Arc::new(DataCache::new());
    let provider = ProviderChain::new(source.clone() as SharedDataProvider<i64, Value>)
        .with_shared_cache(cache.clone())
        .with_caching(true)
        .with_dedup(true)
        .with_event_filtering(true)
        .build();
    let controller = AbortController::new();

    let mut stream =
        provider.fetch_first(FetchListParameters::new().with_signal(controller.signal()));
    stream.next().await.unwrap().unwrap();
    controller.abort("closed");
    assert!(stream.next().await.unwrap().unwrap_err().is_aborted());
    assert!(stream.next().await.is_none());

    assert_eq!(cache.keys(), vec![1]);
    assert!(!cache.is_complete());

    // The iteration never finished, so a miss is not proof of absence.
    let contains = provider.contains_keys(ContainsKeysParameters::new([1, 2])).await.unwrap();
    assert_eq!(contains.results.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(source.lookup_calls(), 1);

    provider.fetch_by_keys(FetchByKeysParameters::new([2])).await.unwrap();
    assert_eq!(source.lookup_calls(), 2);
}

#[tokio::test]
async fn test_abort_rejects_a_pending_page() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1]]));
    source.stall_after_pages();
    let provider = ProviderChain::new(source.clone() as SharedDataProvider<i64, Value>)
        .with_caching(true)
        .with_dedup(true)
        .build();
    let controller = AbortController::new();

    let mut stream =
        provider.fetch_first(FetchListParameters::new().with_signal(controller.signal()));
    stream.next().await.unwrap().unwrap();
    let pending = tokio::spawn(async move { stream.next().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.abort("closed");

    let next = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert!(next.unwrap().unwrap_err().is_aborted());
}

#[tokio::test]
async fn test_abort_rejects_a_pending_lookup() {
    let source = Arc::new(ScriptedProvider::new(vec![]));
    source.stall_after_pages();
    let provider = enhanced(&source);
    let controller = AbortController::new();

    let lookup =
        provider.fetch_by_keys(FetchByKeysParameters::new([5]).with_signal(controller.signal()));
    let pending = tokio::spawn(lookup);

    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.abort("closed");

    let result = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
    assert!(result.unwrap_err().is_aborted());
}

#[tokio::test]
async fn test_lookup_returns_the_row_the_iteration_yielded() {
    let source = Arc::new(ScriptedProvider::from_rows(vec![
        vec![Item::new(1, json!({ "id": 1, "name": "first" }))],
        vec![Item::new(1, json!({ "id": 1, "name": "second" })), row(2)],
    ]));
    let provider = ProviderChain::new(source.clone() as SharedDataProvider<i64, Value>)
        .with_caching(true)
        .with_dedup(true)
        .build();

    let seen = collect_items(provider.fetch_first(FetchListParameters::new())).await.unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].data["name"], json!("first"));

    let found = provider.fetch_by_keys(FetchByKeysParameters::new([1])).await.unwrap();
    assert_eq!(found.results[&1], seen[0]);
    assert_eq!(source.lookup_calls(), 0);
}

#[tokio::test]
async fn test_dropping_the_chain_detaches_from_the_source() {
    let source = Arc::new(ScriptedProvider::new(vec![vec![1]]));
    let provider = enhanced(&source);
    let log = EventLog::attach(provider.as_ref());
    drop(provider);

    source.refresh();
    assert!(log.take().is_empty());
}
