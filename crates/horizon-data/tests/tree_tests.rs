//! Tree views and node suppression over array-backed trees.

mod common;

use std::sync::Arc;

use common::init_tracing;
use horizon_data::{
    collect_items, ArrayTreeDataProvider, DataMapping, DataProvider, FetchByOffsetParameters,
    FetchListParameters, IsEmpty, Item, ProviderConfig, SharedTreeDataProvider, SortCriterion,
    SuppressNode, SuppressNodeTreeDataProvider, TreeDataProvider, TreeDataProviderView, ViewOptions,
};
use serde_json::{json, Value};

fn projects() -> Arc<ArrayTreeDataProvider<String, Value>> {
    Arc::new(ArrayTreeDataProvider::new(
        vec![
            json!({ "id": "X", "title": "archive", "children": [] }),
            json!({ "id": "Y", "title": "active", "children": [
                { "id": "Y1", "title": "build", "children": [{ "id": "Y1a", "title": "ci" }] },
                { "id": "Y2", "title": "docs", "children": [] },
                { "id": "Y3", "title": "notes" }
            ] }),
            json!({ "id": "Z", "title": "inbox", "children": [{ "id": "Z1", "title": "triage" }] }),
        ],
        "id",
        "children",
    ))
}

fn keys(items: &[Item<String, Value>]) -> Vec<&str> {
    items.iter().map(|item| item.key().as_str()).collect()
}

#[tokio::test]
async fn test_empty_child_providers_are_suppressed_at_every_level() {
    init_tracing();
    let tree: SharedTreeDataProvider<String, Value> = projects();
    let view = SuppressNodeTreeDataProvider::new(tree, SuppressNode::IfEmptyChildren);

    let roots = collect_items(view.fetch_first(FetchListParameters::new())).await.unwrap();
    assert_eq!(keys(&roots), vec!["Y", "Z"]);

    let active = view.get_child_data_provider(&"Y".to_string()).unwrap();
    let children = collect_items(active.fetch_first(FetchListParameters::new())).await.unwrap();
    assert_eq!(keys(&children), vec!["Y1"]);

    // Y1a has no children of its own.
    let build = active.get_child_data_provider(&"Y1".to_string()).unwrap();
    assert!(collect_items(build.fetch_first(FetchListParameters::new())).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_suppressed_offsets_follow_filtered_order() {
    let tree: SharedTreeDataProvider<String, Value> = projects();
    let view = SuppressNodeTreeDataProvider::new(tree, SuppressNode::IfEmptyChildren);
    let second = view
        .fetch_by_offset(
            FetchByOffsetParameters::new(1, 1).with_sort(vec![SortCriterion::descending("title")]),
        )
        .await
        .unwrap();
    // Sorted: inbox (Z), archive (X, suppressed), active (Y).
    assert_eq!(keys(&second.results), vec!["Y"]);
    assert!(second.done);
}

#[tokio::test]
async fn test_view_over_suppressed_tree() {
    let tree: SharedTreeDataProvider<String, Value> = projects();
    let suppressed: SharedTreeDataProvider<String, Value> =
        Arc::new(SuppressNodeTreeDataProvider::new(tree, SuppressNode::IfEmptyChildren));
    let titled = DataMapping::new().with_map_fields(|mut item: Item<String, Value>| {
        if let Some(title) = item.data.get("title").and_then(Value::as_str).map(str::to_uppercase) {
            item.data["title"] = json!(title);
        }
        item
    });
    let view = TreeDataProviderView::new(
        suppressed,
        ViewOptions::new()
            .with_sort(vec![SortCriterion::ascending("title")])
            .with_attributes(vec!["id".to_string(), "title".to_string()])
            .with_data_mapping(titled),
    );

    let roots = collect_items(view.fetch_first(FetchListParameters::new())).await.unwrap();
    let titles: Vec<&str> = roots.iter().filter_map(|item| item.data["title"].as_str()).collect();
    assert_eq!(titles, vec!["ACTIVE", "INBOX"]);
    assert!(roots[0].data.get("children").is_none());

    let inbox = view.get_child_data_provider(&"Z".to_string()).unwrap();
    assert!(collect_items(inbox.fetch_first(FetchListParameters::new())).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_suppression_policy() {
    let config = ProviderConfig::from_toml_str(r#"suppressNode = "ifEmptyChildren""#).unwrap();
    let tree: SharedTreeDataProvider<String, Value> = projects();
    let view = SuppressNodeTreeDataProvider::new(tree, config.suppress_node);
    assert_eq!(view.is_empty(), IsEmpty::Unknown);
    assert_eq!(view.get_total_size().await.unwrap(), -1);
}
