//! A tree view over another tree provider.
//!
//! [`TreeDataProviderView`] applies the same [`ViewOptions`] at every level:
//! flat operations go through a [`ListDataProviderView`] over the wrapped
//! level, and each child provider is wrapped in a new view on request.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon_data_core::logging::targets;
use horizon_data_core::{EventTarget, EventTargetMixin};

use crate::capability::{Capability, CapabilityName};
use crate::error::DataResult;
use crate::list_view::{ListDataProviderView, ViewOptions};
use crate::provider::{
    DataProvider, DataProviderEvent, FetchListStream, SharedTreeDataProvider, TreeDataProvider,
};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, IsEmpty, Key,
};

/// Applies [`ViewOptions`] recursively to a tree.
pub struct TreeDataProviderView<K: Key, D: Data> {
    tree: SharedTreeDataProvider<K, D>,
    list: ListDataProviderView<K, D>,
}

impl<K: Key, D: Data> TreeDataProviderView<K, D> {
    pub fn new(tree: SharedTreeDataProvider<K, D>, options: ViewOptions<K, D>) -> Self {
        let list = ListDataProviderView::new(tree.clone(), options);
        Self { tree, list }
    }

    pub fn options(&self) -> &ViewOptions<K, D> {
        self.list.options()
    }

    /// The wrapped tree.
    pub fn inner(&self) -> &SharedTreeDataProvider<K, D> {
        &self.tree
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>> for TreeDataProviderView<K, D> {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        self.list.event_target()
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for TreeDataProviderView<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        self.list.fetch_first(params)
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        self.list.get_capability(name)
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        self.list.fetch_by_keys(params)
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        self.list.fetch_by_offset(params)
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        self.list.contains_keys(params)
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        self.list.get_total_size()
    }

    fn is_empty(&self) -> IsEmpty {
        self.list.is_empty()
    }
}

impl<K: Key, D: Data> TreeDataProvider<K, D> for TreeDataProviderView<K, D> {
    fn get_child_data_provider(&self, parent_key: &K) -> Option<SharedTreeDataProvider<K, D>> {
        let child = self.tree.get_child_data_provider(parent_key)?;
        tracing::trace!(target: targets::VIEW, ?parent_key, "wrapping child provider");
        Some(Arc::new(Self::new(child, self.options().clone())))
    }
}

impl<K: Key, D: Data> fmt::Debug for TreeDataProviderView<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeDataProviderView")
            .field("options", self.options())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(TreeDataProviderView<u64, String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayTreeDataProvider;
    use crate::list_view::DataMapping;
    use crate::provider::collect_items;
    use crate::types::{Item, SortCriterion};
    use serde_json::{json, Value};

    fn catalog() -> SharedTreeDataProvider<String, Value> {
        Arc::new(ArrayTreeDataProvider::new(
            vec![
                json!({ "id": "fruit", "rank": 2, "children": [
                    { "id": "pear", "rank": 1 },
                    { "id": "apple", "rank": 3 },
                    { "id": "fig", "rank": 2 }
                ] }),
                json!({ "id": "veg", "rank": 1, "children": [] }),
            ],
            "id",
            "children",
        ))
    }

    fn upper_ids() -> DataMapping<String, Value> {
        DataMapping::new().with_map_fields(|mut item: Item<String, Value>| {
            if let Some(id) = item.data.get("id").and_then(Value::as_str).map(str::to_uppercase) {
                item.data["id"] = json!(id);
            }
            item
        })
    }

    fn ids(items: &[Item<String, Value>]) -> Vec<String> {
        items.iter().map(|item| item.data["id"].as_str().unwrap_or_default().to_string()).collect()
    }

    #[tokio::test]
    async fn test_options_apply_at_every_level() {
        let view = TreeDataProviderView::new(
            catalog(),
            ViewOptions::new()
                .with_sort(vec![SortCriterion::ascending("rank")])
                .with_data_mapping(upper_ids()),
        );

        let roots = collect_items(view.fetch_first(FetchListParameters::new())).await.unwrap();
        assert_eq!(ids(&roots), vec!["VEG", "FRUIT"]);

        let fruit = view.get_child_data_provider(&"fruit".to_string()).unwrap();
        let children = collect_items(fruit.fetch_first(FetchListParameters::new())).await.unwrap();
        assert_eq!(ids(&children), vec!["PEAR", "FIG", "APPLE"]);

        assert!(fruit.get_child_data_provider(&"pear".to_string()).is_none());
        let veg = view.get_child_data_provider(&"veg".to_string()).unwrap();
        assert_eq!(veg.is_empty(), IsEmpty::Yes);
    }

    #[test]
    fn test_missing_child_stays_missing() {
        let view = TreeDataProviderView::new(catalog(), ViewOptions::new());
        assert!(view.get_child_data_provider(&"stone".to_string()).is_none());
    }
}
