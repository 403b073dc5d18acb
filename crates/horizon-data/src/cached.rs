//! The caching decorator.
//!
//! [`CachedIteratorResultsDataProvider`] records every row yielded by the live
//! `fetch_first` iteration into a [`DataCache`] and answers key, offset and
//! containment lookups from it when the cached rows cover the request.
//! Requests the cache cannot fully answer go to the wrapped provider.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use horizon_data_core::logging::targets;
use horizon_data_core::{listener, EventTarget, EventTargetMixin};

use crate::abort::check_signal;
use crate::cache::{record_iteration, CacheCriteria, DataCache};
use crate::capability::{CachingType, Capability, CapabilityName, FetchFirstCapability};
use crate::error::DataResult;
use crate::provider::{
    DataProvider, DataProviderEvent, FetchListStream, ListenerGuard, SharedDataProvider, MUTATE,
    REFRESH,
};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, IsEmpty, Key,
};

/// Memoizes the rows of the current iteration.
pub struct CachedIteratorResultsDataProvider<K: Key, D: Data> {
    inner: SharedDataProvider<K, D>,
    cache: Arc<DataCache<K, D>>,
    events: Arc<EventTarget<DataProviderEvent<K, D>>>,
    _listeners: [ListenerGuard<K, D>; 2],
}

impl<K: Key, D: Data> CachedIteratorResultsDataProvider<K, D> {
    /// Wrap `inner` with a cache of its own.
    pub fn new(inner: SharedDataProvider<K, D>) -> Self {
        Self::with_cache(inner, Arc::new(DataCache::new()))
    }

    /// Wrap `inner`, recording into `cache`.
    pub fn with_cache(inner: SharedDataProvider<K, D>, cache: Arc<DataCache<K, D>>) -> Self {
        let events = Arc::new(EventTarget::new());

        // Downstream sees the mutation before the cached rows change.
        let on_mutate = {
            let events = events.clone();
            let cache = cache.clone();
            listener(move |event: &DataProviderEvent<K, D>| {
                events.dispatch_event(event);
                if let Some(detail) = event.mutation() {
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
            events,
            _listeners: listeners,
        }
    }

    /// The cache this layer records into.
    pub fn cache(&self) -> &Arc<DataCache<K, D>> {
        &self.cache
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &SharedDataProvider<K, D> {
        &self.inner
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>>
    for CachedIteratorResultsDataProvider<K, D>
{
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        &self.events
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for CachedIteratorResultsDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let upstream = self.inner.fetch_first(params.clone());
        record_iteration(upstream, self.cache.clone(), params)
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        match name {
            CapabilityName::FetchFirst => {
                let iteration_speed = match self.inner.get_capability(CapabilityName::FetchFirst) {
                    Some(Capability::FetchFirst(inner)) => inner.iteration_speed,
                    _ => Default::default(),
                };
                Some(Capability::FetchFirst(FetchFirstCapability {
                    caching: CachingType::VisitedByCurrentIterator,
                    iteration_speed,
                }))
            }
            other => self.inner.get_capability(other),
        }
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        let cached = if params.attributes == self.cache.criteria().attributes {
            self.cache.get_all(params.keys.iter())
        } else {
            None
        };
        match cached {
            Some(results) => {
                tracing::trace!(
                    target: targets::CACHE,
                    keys = params.keys.len(),
                    "fetch_by_keys served from cache"
                );
                async move {
                    check_signal(params.signal.as_ref())?;
                    Ok(FetchByKeysResults {
                        fetch_parameters: params,
                        results,
                    })
                }
                .boxed()
            }
            None => self.inner.fetch_by_keys(params),
        }
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        let size =
            crate::types::resolve_page_size(params.size, crate::provider::DEFAULT_FETCH_SIZE);
        let cached = if self.cache.matches(&CacheCriteria::from_offset(&params)) {
            self.cache.range(params.offset, size)
        } else {
            None
        };
        match cached {
            Some((results, done)) => {
                tracing::trace!(
                    target: targets::CACHE,
                    offset = params.offset,
                    rows = results.len(),
                    "fetch_by_offset served from cache"
                );
                async move {
                    check_signal(params.signal.as_ref())?;
                    Ok(FetchByOffsetResults {
                        fetch_parameters: params,
                        results,
                        done,
                    })
                }
                .boxed()
            }
            None => self.inner.fetch_by_offset(params),
        }
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        let (hits, misses) = self.cache.partition_keys(params.keys.iter());
        // A complete unfiltered iteration saw every row, so misses are absent.
        let exhaustive =
            self.cache.is_complete() && self.cache.criteria().filter_criterion.is_none();
        if !misses.is_empty() && !exhaustive {
            return self.inner.contains_keys(params);
        }
        async move {
            check_signal(params.signal.as_ref())?;
            Ok(ContainsKeysResults {
                contains_parameters: params,
                results: hits,
            })
        }
        .boxed()
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        self.inner.get_total_size()
    }

    fn is_empty(&self) -> IsEmpty {
        self.inner.is_empty()
    }
}

impl<K: Key, D: Data> fmt::Debug for CachedIteratorResultsDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedIteratorResultsDataProvider")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(CachedIteratorResultsDataProvider<u64, String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ArrayDataProvider;
    use crate::mutation::{MutationEventDetail, MutationOperationDetail};
    use crate::provider::collect_items;
    use crate::types::SortCriterion;
    use futures_util::StreamExt;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts the lookups that reach the wrapped rows.
    struct Counting {
        rows: ArrayDataProvider<i64, Value>,
        lookups: AtomicUsize,
    }

    impl EventTargetMixin<DataProviderEvent<i64, Value>> for Counting {
        fn event_target(&self) -> &EventTarget<DataProviderEvent<i64, Value>> {
            self.rows.event_target()
        }
    }

    impl DataProvider<i64, Value> for Counting {
        fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<i64, Value> {
            self.rows.fetch_first(params)
        }

        fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
            self.rows.get_capability(name)
        }

        fn fetch_by_keys(
            &self,
            params: FetchByKeysParameters<i64>,
        ) -> BoxFuture<'static, DataResult<FetchByKeysResults<i64, Value>>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.rows.fetch_by_keys(params)
        }

        fn fetch_by_offset(
            &self,
            params: FetchByOffsetParameters,
        ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<i64, Value>>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.rows.fetch_by_offset(params)
        }

        fn contains_keys(
            &self,
            params: ContainsKeysParameters<i64>,
        ) -> BoxFuture<'static, DataResult<ContainsKeysResults<i64>>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.rows.contains_keys(params)
        }
    }

    fn source() -> Arc<Counting> {
        Arc::new(Counting {
            rows: ArrayDataProvider::new(
                (1..=5).map(|id| json!({ "id": id, "name": format!("row{id}") })).collect(),
                "id",
            ),
            lookups: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_iteration_populates_cache() {
        let cached = CachedIteratorResultsDataProvider::new(source());

        let mut stream = cached.fetch_first(FetchListParameters::new().with_size(2));
        stream.next().await.unwrap().unwrap();
        assert_eq!(cached.cache().keys(), vec![1, 2]);

        while stream.next().await.is_some() {}
        assert_eq!(cached.cache().len(), 5);
        assert!(cached.cache().is_complete());
    }

    #[tokio::test]
    async fn test_lookups_answered_from_cache() {
        let source = source();
        let cached = CachedIteratorResultsDataProvider::new(source.clone());
        collect_items(cached.fetch_first(FetchListParameters::new())).await.unwrap();

        let by_keys = cached.fetch_by_keys(FetchByKeysParameters::new([4, 2])).await.unwrap();
        assert_eq!(by_keys.results.keys().copied().collect::<Vec<_>>(), vec![4, 2]);

        let page = cached.fetch_by_offset(FetchByOffsetParameters::new(3, 10)).await.unwrap();
        assert_eq!(page.results.iter().map(|item| *item.key()).collect::<Vec<_>>(), vec![4, 5]);
        assert!(page.done);

        let contains = cached.contains_keys(ContainsKeysParameters::new([1, 42])).await.unwrap();
        assert_eq!(contains.results.into_iter().collect::<Vec<_>>(), vec![1]);

        assert_eq!(source.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookups_outside_cache_are_delegated() {
        let source = source();
        let cached = CachedIteratorResultsDataProvider::new(source.clone());
        let mut stream = cached.fetch_first(FetchListParameters::new().with_size(2));
        stream.next().await.unwrap().unwrap();

        let by_keys = cached.fetch_by_keys(FetchByKeysParameters::new([1, 5])).await.unwrap();
        assert_eq!(by_keys.results.len(), 2);

        let sorted = cached
            .fetch_by_offset(
                FetchByOffsetParameters::new(0, 1)
                    .with_sort(vec![SortCriterion::descending("id")]),
            )
            .await
            .unwrap();
        assert_eq!(*sorted.results[0].key(), 5);

        cached.contains_keys(ContainsKeysParameters::new([3])).await.unwrap();
        assert_eq!(source.lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_mutation_reaches_listeners_before_cache_changes() {
        let source = source();
        let cached = CachedIteratorResultsDataProvider::new(source.clone());
        collect_items(cached.fetch_first(FetchListParameters::new())).await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            let cache = cached.cache().clone();
            cached.add_event_listener(
                MUTATE,
                listener(move |_: &DataProviderEvent<i64, Value>| {
                    seen.lock().push(cache.contains(&2))
                }),
            );
        }

        let removal = MutationEventDetail::new().with_remove(MutationOperationDetail::new([2]));
        source.rows.dispatch_mutation(removal);
        assert_eq!(*seen.lock(), vec![true]);
        assert!(!cached.cache().contains(&2));
    }

    #[tokio::test]
    async fn test_refresh_resets_cache_and_is_forwarded() {
        let source = source();
        let cached = CachedIteratorResultsDataProvider::new(source.clone());
        collect_items(cached.fetch_first(FetchListParameters::new())).await.unwrap();

        let refreshes = Arc::new(AtomicUsize::new(0));
        {
            let refreshes = refreshes.clone();
            cached.add_event_listener(
                REFRESH,
                listener(move |_: &DataProviderEvent<i64, Value>| {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        source.rows.reset(vec![json!({ "id": 7 })]);
        assert!(cached.cache().is_empty());
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aborted_iteration_commits_nothing_further() {
        let cached = CachedIteratorResultsDataProvider::new(source());
        let controller = crate::abort::AbortController::new();
        let params = FetchListParameters::new()
            .with_size(2)
            .with_signal(controller.signal());
        let mut stream = cached.fetch_first(params);
        stream.next().await.unwrap().unwrap();
        controller.abort("navigated away");
        assert!(stream.next().await.unwrap().unwrap_err().is_aborted());
        assert_eq!(cached.cache().keys(), vec![1, 2]);
        assert!(!cached.cache().is_complete());
    }

    #[test]
    fn test_capability_reports_iterator_caching() {
        let cached = CachedIteratorResultsDataProvider::new(source());
        assert_eq!(
            crate::capability::caching_of(
                cached.get_capability(CapabilityName::FetchFirst).as_ref()
            ),
            CachingType::VisitedByCurrentIterator
        );
        assert!(cached.get_capability(CapabilityName::Dedup).is_some());
    }

    #[test]
    fn test_dropping_layer_detaches_listeners() {
        let source = source();
        let cached = CachedIteratorResultsDataProvider::new(source.clone());
        assert_eq!(source.event_target().listener_count(), 2);
        drop(cached);
        assert_eq!(source.event_target().listener_count(), 0);
    }
}
