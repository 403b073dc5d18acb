//! The data provider contract.
//!
//! A [`DataProvider`] serves keyed rows through an asynchronous page stream
//! ([`fetch_first`](DataProvider::fetch_first)) plus key, offset and
//! containment lookups. Providers announce changes through `mutate` and
//! `refresh` events on their [`EventTarget`](horizon_data_core::EventTarget).
//!
//! Decorators implement the same trait over an `Arc<dyn DataProvider>`, so a
//! chain of them is itself a provider.
//!
//! # Example
//!
//! ```
//! use futures_util::StreamExt;
//! use horizon_data::{ArrayDataProvider, DataProvider, FetchListParameters};
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let provider: ArrayDataProvider<i64, Value> =
//!     ArrayDataProvider::new(vec![json!({"id": 1}), json!({"id": 2})], "id");
//!
//! let mut pages = provider.fetch_first(FetchListParameters::new().with_size(1));
//! while let Some(page) = pages.next().await {
//!     let page = page.unwrap();
//!     println!("{:?}", page.keys().collect::<Vec<_>>());
//! }
//! # });
//! ```

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, StreamExt};
use horizon_data_core::{Event, EventListener, EventTargetMixin, ListenerId};
use indexmap::{IndexMap, IndexSet};

use crate::abort::{check_signal, next_or_abort};
use crate::capability::{Capability, CapabilityName};
use crate::error::DataResult;
use crate::mutation::MutationEventDetail;
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, FetchListResult, IsEmpty,
    Item, Key,
};

/// Event type of mutation events.
pub const MUTATE: &str = "mutate";
/// Event type of refresh events.
pub const REFRESH: &str = "refresh";

/// Events dispatched by data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum DataProviderEvent<K: Key, D> {
    /// Rows were added, removed or updated.
    Mutate(MutationEventDetail<K, D>),
    /// Everything may have changed; consumers should refetch.
    Refresh,
}

impl<K: Key, D: Data> DataProviderEvent<K, D> {
    /// The mutation detail, for mutate events.
    pub fn mutation(&self) -> Option<&MutationEventDetail<K, D>> {
        match self {
            Self::Mutate(detail) => Some(detail),
            Self::Refresh => None,
        }
    }
}

impl<K: Key, D: Data> Event for DataProviderEvent<K, D> {
    fn event_type(&self) -> &str {
        match self {
            Self::Mutate(_) => MUTATE,
            Self::Refresh => REFRESH,
        }
    }
}

/// A stream of pages produced by one `fetch_first` call.
///
/// A stream is single-pass; call `fetch_first` again to restart.
pub type FetchListStream<K, D> = BoxStream<'static, DataResult<FetchListResult<K, D>>>;

/// A shared, type-erased provider.
pub type SharedDataProvider<K, D> = Arc<dyn DataProvider<K, D>>;

/// A shared, type-erased tree provider.
pub type SharedTreeDataProvider<K, D> = Arc<dyn TreeDataProvider<K, D>>;

/// Keyed, paginated, observable rows.
///
/// Only [`fetch_first`](Self::fetch_first) and
/// [`get_capability`](Self::get_capability) are required; key and offset
/// fetches fall back to walking a fresh iteration.
pub trait DataProvider<K: Key, D: Data>: EventTargetMixin<DataProviderEvent<K, D>> + Send + Sync {
    /// Start an iteration over the rows matching `params`.
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D>;

    /// Describe a capability; `None` when the provider does not support it.
    fn get_capability(&self, name: CapabilityName) -> Option<Capability>;

    /// Fetch rows by key. Keys that do not exist are absent from the results.
    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        let stream = self.fetch_first(FetchListParameters {
            size: Some(-1),
            attributes: params.attributes.clone(),
            signal: params.signal.clone(),
            ..Default::default()
        });
        fetch_by_keys_by_iteration(stream, params).boxed()
    }

    /// Fetch a range of rows.
    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        let mut list = params.list_parameters();
        list.size = Some(-1);
        let stream = self.fetch_first(list);
        fetch_by_offset_by_iteration(stream, params, DEFAULT_FETCH_SIZE).boxed()
    }

    /// Report which of the given keys exist.
    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        let lookup = self.fetch_by_keys(FetchByKeysParameters {
            keys: params.keys.clone(),
            attributes: None,
            signal: params.signal.clone(),
        });
        async move {
            let found = lookup.await?;
            Ok(ContainsKeysResults {
                results: found.results.into_keys().collect(),
                contains_parameters: params,
            })
        }
        .boxed()
    }

    /// Total number of rows, or `-1` when unknown.
    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        future::ready(Ok(-1)).boxed()
    }

    /// Whether the provider has no rows.
    fn is_empty(&self) -> IsEmpty {
        IsEmpty::Unknown
    }
}

/// A provider whose rows may have children.
pub trait TreeDataProvider<K: Key, D: Data>: DataProvider<K, D> {
    /// The provider of `parent_key`'s children; `None` for leaves.
    fn get_child_data_provider(&self, parent_key: &K) -> Option<SharedTreeDataProvider<K, D>>;
}

/// A listener on another provider, removed when the guard is dropped.
///
/// Decorators hold one guard per forwarded event type so that dropping a
/// decorator detaches it from the provider it wraps.
pub struct ListenerGuard<K: Key, D: Data> {
    provider: SharedDataProvider<K, D>,
    event_type: &'static str,
    id: ListenerId,
}

impl<K: Key, D: Data> ListenerGuard<K, D> {
    /// Register `listener` on `provider` for `event_type`.
    pub fn new(
        provider: &SharedDataProvider<K, D>,
        event_type: &'static str,
        listener: EventListener<DataProviderEvent<K, D>>,
    ) -> Self {
        let id = provider.add_event_listener(event_type, listener);
        Self {
            provider: provider.clone(),
            event_type,
            id,
        }
    }
}

impl<K: Key, D: Data> Drop for ListenerGuard<K, D> {
    fn drop(&mut self) {
        self.provider.remove_event_listener(self.event_type, self.id);
    }
}

/// Page size used when a request does not specify one.
pub const DEFAULT_FETCH_SIZE: usize = 25;

/// Answer a key fetch by scanning an iteration.
pub async fn fetch_by_keys_by_iteration<K: Key, D: Data>(
    mut stream: FetchListStream<K, D>,
    params: FetchByKeysParameters<K>,
) -> DataResult<FetchByKeysResults<K, D>> {
    let mut found: IndexMap<K, Item<K, D>> = IndexMap::new();
    let mut remaining: IndexSet<K> = params.keys.clone();
    while !remaining.is_empty() {
        let Some(page) = next_or_abort(&mut stream, params.signal.as_ref()).await else {
            break;
        };
        for item in page?.into_items() {
            if remaining.shift_remove(item.key()) {
                found.insert(item.key().clone(), item);
            }
        }
    }
    check_signal(params.signal.as_ref())?;

    // Results follow the requested key order.
    let results = params
        .keys
        .iter()
        .filter_map(|key| found.shift_remove(key).map(|item| (key.clone(), item)))
        .collect();
    Ok(FetchByKeysResults {
        fetch_parameters: params,
        results,
    })
}

/// Answer an offset fetch by scanning an iteration.
pub async fn fetch_by_offset_by_iteration<K: Key, D: Data>(
    mut stream: FetchListStream<K, D>,
    params: FetchByOffsetParameters,
    default_size: usize,
) -> DataResult<FetchByOffsetResults<K, D>> {
    let size = crate::types::resolve_page_size(params.size, default_size);
    let end = size.map(|size| params.offset + size);
    let mut position = 0usize;
    let mut results = Vec::new();
    let mut done = true;

    while let Some(page) = next_or_abort(&mut stream, params.signal.as_ref()).await {
        for item in page?.into_items() {
            if end.is_some_and(|end| position >= end) {
                done = false;
                break;
            }
            if position >= params.offset {
                results.push(item);
            }
            position += 1;
        }
        if !done {
            break;
        }
    }
    check_signal(params.signal.as_ref())?;

    Ok(FetchByOffsetResults {
        fetch_parameters: params,
        results,
        done,
    })
}

/// Collect every page of an iteration into items.
pub async fn collect_items<K: Key, D: Data>(
    mut stream: FetchListStream<K, D>,
) -> DataResult<Vec<Item<K, D>>> {
    let mut items = Vec::new();
    while let Some(page) = stream.next().await {
        items.extend(page?.into_items());
    }
    Ok(items)
}
