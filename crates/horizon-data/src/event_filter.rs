//! The mutation event filtering decorator.
//!
//! [`MutateEventFilteringDataProvider`] forwards only the parts of a `mutate`
//! event that concern rows the consumer has fetched. Removes and updates of
//! keys absent from the cache are stripped; adds always pass. An event left
//! with nothing to report is not dispatched at all.
//!
//! The layer reads a [`DataCache`]. Composed over a caching layer it reads
//! that layer's cache; standalone it records its own iterations into a cache
//! it owns.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon_data_core::logging::{span_names, summarize_keys, targets};
use horizon_data_core::{listener, EventTarget, EventTargetMixin};

use crate::cache::{record_iteration, DataCache};
use crate::capability::{Capability, CapabilityName, EventFilteringType};
use crate::error::DataResult;
use crate::mutation::{MutationEventDetail, MutationOperationDetail};
use crate::provider::{
    DataProvider, DataProviderEvent, FetchListStream, ListenerGuard, SharedDataProvider, MUTATE,
    REFRESH,
};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, IsEmpty, Key,
};

/// How the layer relates to its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheRole {
    /// Records iterations and applies mutations.
    Owner,
    /// Reads a cache maintained by a caching layer below.
    Reader,
}

/// Re-emits only mutations relevant to fetched rows.
pub struct MutateEventFilteringDataProvider<K: Key, D: Data> {
    inner: SharedDataProvider<K, D>,
    cache: Arc<DataCache<K, D>>,
    role: CacheRole,
    events: Arc<EventTarget<DataProviderEvent<K, D>>>,
    _listeners: [ListenerGuard<K, D>; 2],
}

impl<K: Key, D: Data> MutateEventFilteringDataProvider<K, D> {
    /// Wrap `inner` with a cache populated from this layer's iterations.
    pub fn new(inner: SharedDataProvider<K, D>) -> Self {
        Self::build(inner, Arc::new(DataCache::new()), CacheRole::Owner)
    }

    /// Wrap `inner`, filtering against a cache maintained below this layer.
    pub fn with_shared_cache(inner: SharedDataProvider<K, D>, cache: Arc<DataCache<K, D>>) -> Self {
        Self::build(inner, cache, CacheRole::Reader)
    }

    fn build(
        inner: SharedDataProvider<K, D>,
        cache: Arc<DataCache<K, D>>,
        role: CacheRole,
    ) -> Self {
        let events = Arc::new(EventTarget::new());

        let on_mutate = {
            let events = events.clone();
            let cache = cache.clone();
            listener(move |event: &DataProviderEvent<K, D>| {
                let Some(detail) = event.mutation() else {
                    return;
                };
                let _span =
                    tracing::trace_span!(target: targets::EVENT_FILTER, span_names::MUTATION)
                        .entered();
                let filtered = filter_mutation(&cache, detail);
                if filtered.is_empty() {
                    tracing::debug!(
                        target: targets::EVENT_FILTER,
                        "mutation concerns no fetched row, not dispatched"
                    );
                } else {
                    events.dispatch_event(&DataProviderEvent::Mutate(filtered));
                }
                if role == CacheRole::Owner {
                    cache.apply_mutation(detail);
                }
            })
        };
        let on_refresh = {
            let events = events.clone();
            let cache = cache.clone();
            listener(move |event: &DataProviderEvent<K, D>| {
                cache.reset();
                events.dispatch_event(event);
            })
        };

        let listeners = [
            ListenerGuard::new(&inner, MUTATE, on_mutate),
            ListenerGuard::new(&inner, REFRESH, on_refresh),
        ];
        Self {
            inner,
            cache,
            role,
            events,
            _listeners: listeners,
        }
    }

    /// The cache mutations are filtered against.
    pub fn cache(&self) -> &Arc<DataCache<K, D>> {
        &self.cache
    }

    /// Whether this layer records its own iterations.
    pub fn owns_cache(&self) -> bool {
        self.role == CacheRole::Owner
    }
}

/// Strip removes and updates of uncached keys; adds are kept whole.
pub fn filter_mutation<K: Key, D: Data>(
    cache: &DataCache<K, D>,
    detail: &MutationEventDetail<K, D>,
) -> MutationEventDetail<K, D> {
    MutationEventDetail {
        add: detail.add.clone(),
        remove: detail.remove.as_ref().map(|remove| filter_operation(cache, remove, "remove")),
        update: detail.update.as_ref().map(|update| filter_operation(cache, update, "update")),
    }
}

fn filter_operation<K: Key, D: Data>(
    cache: &DataCache<K, D>,
    operation: &MutationOperationDetail<K, D>,
    kind: &'static str,
) -> MutationOperationDetail<K, D> {
    let (_, stale) = cache.partition_keys(operation.keys.iter());
    if stale.is_empty() {
        return operation.clone();
    }
    tracing::trace!(
        target: targets::EVENT_FILTER,
        kind,
        keys = %summarize_keys(&stale),
        "stale keys stripped"
    );
    operation.retain_keys(|key| !stale.contains(key))
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>>
    for MutateEventFilteringDataProvider<K, D>
{
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        &self.events
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for MutateEventFilteringDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let upstream = self.inner.fetch_first(params.clone());
        match self.role {
            CacheRole::Owner => record_iteration(upstream, self.cache.clone(), params),
            CacheRole::Reader => upstream,
        }
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        match name {
            CapabilityName::EventFiltering => {
                Some(Capability::event_filtering(EventFilteringType::Iterator))
            }
            other => self.inner.get_capability(other),
        }
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        self.inner.fetch_by_keys(params)
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        self.inner.fetch_by_offset(params)
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        self.inner.contains_keys(params)
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        self.inner.get_total_size()
    }

    fn is_empty(&self) -> IsEmpty {
        self.inner.is_empty()
    }
}

impl<K: Key, D: Data> fmt::Debug for MutateEventFilteringDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutateEventFilteringDataProvider")
            .field("role", &self.role)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(MutateEventFilteringDataProvider<u64, String>: Send, Sync);
