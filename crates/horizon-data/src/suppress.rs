//! A tree view that hides nodes with no children.
//!
//! With [`SuppressNode::IfEmptyChildren`], a row is served only when the
//! wrapped tree has a child provider for it that reports rows. Offsets
//! address the filtered sequence. Child providers are wrapped with the same
//! policy, so suppression applies at every level as each level is fetched.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::StreamExt;
use horizon_data_core::logging::{summarize_keys, targets};
use horizon_data_core::{EventTarget, EventTargetMixin};
use serde::{Deserialize, Serialize};

use crate::abort::next_or_abort;
use crate::capability::{Capability, CapabilityName};
use crate::error::DataResult;
use crate::provider::{
    fetch_by_offset_by_iteration, DataProvider, DataProviderEvent, FetchListStream,
    SharedTreeDataProvider, TreeDataProvider, DEFAULT_FETCH_SIZE,
};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, FetchListResult, IsEmpty,
    Item, Key,
};

/// Which nodes a suppressing view hides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuppressNode {
    /// Serve every node.
    #[default]
    None,
    /// Hide nodes without a non-empty child provider.
    IfEmptyChildren,
}

/// Whether `key` keeps its place under `policy`.
fn is_retained<K: Key, D: Data>(
    tree: &dyn TreeDataProvider<K, D>,
    policy: SuppressNode,
    key: &K,
) -> bool {
    match policy {
        SuppressNode::None => true,
        SuppressNode::IfEmptyChildren => tree
            .get_child_data_provider(key)
            .is_some_and(|child| child.is_empty() == IsEmpty::No),
    }
}

fn retain_rows<K: Key, D: Data>(
    tree: &dyn TreeDataProvider<K, D>,
    policy: SuppressNode,
    items: Vec<Item<K, D>>,
) -> Vec<Item<K, D>> {
    let mut suppressed = Vec::new();
    let kept = items
        .into_iter()
        .filter(|item| {
            let keep = is_retained(tree, policy, item.key());
            if !keep {
                suppressed.push(item.key().clone());
            }
            keep
        })
        .collect();
    if !suppressed.is_empty() {
        tracing::debug!(
            target: targets::TREE,
            keys = %summarize_keys(&suppressed),
            "nodes suppressed"
        );
    }
    kept
}

/// Hides tree nodes according to a [`SuppressNode`] policy.
pub struct SuppressNodeTreeDataProvider<K: Key, D: Data> {
    tree: SharedTreeDataProvider<K, D>,
    policy: SuppressNode,
}

impl<K: Key, D: Data> SuppressNodeTreeDataProvider<K, D> {
    pub fn new(tree: SharedTreeDataProvider<K, D>, policy: SuppressNode) -> Self {
        Self { tree, policy }
    }

    pub fn policy(&self) -> SuppressNode {
        self.policy
    }

    /// The wrapped tree.
    pub fn inner(&self) -> &SharedTreeDataProvider<K, D> {
        &self.tree
    }

    fn suppressing(&self) -> bool {
        self.policy != SuppressNode::None
    }

    /// The wrapped iteration with suppressed rows removed.
    fn filtered_stream(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let signal = params.signal.clone();
        let mut upstream = self.tree.fetch_first(params);
        let tree = self.tree.clone();
        let policy = self.policy;
        try_stream! {
            while let Some(page) = next_or_abort(&mut upstream, signal.as_ref()).await {
                let page = page?;
                let fetch_parameters = page.fetch_parameters.clone();
                let kept = retain_rows(tree.as_ref(), policy, page.into_items());
                if kept.is_empty() {
                    continue;
                }
                yield FetchListResult::from_items(kept, fetch_parameters);
            }
        }
        .boxed()
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>>
    for SuppressNodeTreeDataProvider<K, D>
{
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        self.tree.event_target()
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for SuppressNodeTreeDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        if !self.suppressing() {
            return self.tree.fetch_first(params);
        }
        self.filtered_stream(params)
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        self.tree.get_capability(name)
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        let lookup = self.tree.fetch_by_keys(params);
        if !self.suppressing() {
            return lookup;
        }
        let tree = self.tree.clone();
        let policy = self.policy;
        async move {
            let mut found = lookup.await?;
            found.results.retain(|key, _| is_retained(tree.as_ref(), policy, key));
            Ok(found)
        }
        .boxed()
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        if !self.suppressing() {
            return self.tree.fetch_by_offset(params);
        }
        let mut list = params.list_parameters();
        list.size = Some(-1);
        let stream = self.filtered_stream(list);
        fetch_by_offset_by_iteration(stream, params, DEFAULT_FETCH_SIZE).boxed()
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        let lookup = self.tree.contains_keys(params);
        if !self.suppressing() {
            return lookup;
        }
        let tree = self.tree.clone();
        let policy = self.policy;
        async move {
            let mut found = lookup.await?;
            found.results.retain(|key| is_retained(tree.as_ref(), policy, key));
            Ok(found)
        }
        .boxed()
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        if !self.suppressing() {
            return self.tree.get_total_size();
        }
        future::ready(Ok(-1)).boxed()
    }

    fn is_empty(&self) -> IsEmpty {
        match self.tree.is_empty() {
            IsEmpty::Yes => IsEmpty::Yes,
            other if !self.suppressing() => other,
            _ => IsEmpty::Unknown,
        }
    }
}

impl<K: Key, D: Data> TreeDataProvider<K, D> for SuppressNodeTreeDataProvider<K, D> {
    fn get_child_data_provider(&self, parent_key: &K) -> Option<SharedTreeDataProvider<K, D>> {
        let child = self.tree.get_child_data_provider(parent_key)?;
        Some(Arc::new(Self::new(child, self.policy)))
    }
}

impl<K: Key, D: Data> fmt::Debug for SuppressNodeTreeDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressNodeTreeDataProvider")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(SuppressNodeTreeDataProvider<u64, String>: Send, Sync);
