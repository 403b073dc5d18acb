//! The iteration cache shared by a decorator chain.
//!
//! A [`DataCache`] records the rows visited by the live `fetch_first`
//! iteration, keyed by row key and kept in iteration order. Each iteration
//! gets an id from [`begin_iteration`](DataCache::begin_iteration); the first
//! page committed by a newer iteration replaces the cache, and pages of an
//! older iteration are ignored from then on.
//!
//! The cache changes only through page commits, mutation processing and
//! [`reset`](DataCache::reset).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::stream::StreamExt;

use horizon_data_core::logging::{summarize_keys, targets};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use crate::abort::{check_signal, next_or_abort};
use crate::mutation::{MutationEventDetail, MutationOperationDetail};
use crate::provider::FetchListStream;
use crate::types::{
    Data, FetchByOffsetParameters, FetchListParameters, FilterCriterion, Item, Key, SortCriterion,
};

/// Identifies one `fetch_first` iteration.
pub type IterationId = u64;

/// The criteria under which cached rows were fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheCriteria {
    pub sort_criteria: Vec<SortCriterion>,
    pub filter_criterion: Option<FilterCriterion>,
    pub attributes: Option<Vec<String>>,
}

impl CacheCriteria {
    pub fn from_list(params: &FetchListParameters) -> Self {
        Self {
            sort_criteria: params.sort_criteria.clone(),
            filter_criterion: params.filter_criterion.clone(),
            attributes: params.attributes.clone(),
        }
    }

    pub fn from_offset(params: &FetchByOffsetParameters) -> Self {
        Self {
            sort_criteria: params.sort_criteria.clone(),
            filter_criterion: params.filter_criterion.clone(),
            attributes: params.attributes.clone(),
        }
    }
}

struct CacheState<K, D> {
    items: IndexMap<K, Item<K, D>>,
    /// Iteration whose rows are held.
    iteration: Option<IterationId>,
    /// Iterations up to this id were started before the last reset.
    floor: IterationId,
    criteria: CacheCriteria,
    /// The held iteration ran to completion.
    complete: bool,
}

/// Rows visited by the current iteration.
pub struct DataCache<K, D> {
    next_iteration: AtomicU64,
    state: RwLock<CacheState<K, D>>,
}

impl<K: Key, D: Clone> Default for DataCache<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, D: Clone> DataCache<K, D> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            next_iteration: AtomicU64::new(0),
            state: RwLock::new(CacheState {
                items: IndexMap::new(),
                iteration: None,
                floor: 0,
                criteria: CacheCriteria::default(),
                complete: false,
            }),
        }
    }

    /// Allocate an id for a new iteration.
    pub fn begin_iteration(&self) -> IterationId {
        self.next_iteration.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record one page of `iteration`.
    ///
    /// Returns `false` when the iteration has been superseded or predates the
    /// last reset; nothing is written in that case.
    pub fn commit_page(
        &self,
        iteration: IterationId,
        params: &FetchListParameters,
        items: &[Item<K, D>],
    ) -> bool {
        let mut state = self.state.write();
        if iteration <= state.floor || state.iteration.is_some_and(|current| iteration < current) {
            tracing::trace!(
                target: targets::CACHE,
                iteration,
                "page of superseded iteration ignored"
            );
            return false;
        }
        if state.iteration != Some(iteration) {
            tracing::debug!(
                target: targets::CACHE,
                iteration,
                dropped = state.items.len(),
                "new iteration, cache reset"
            );
            state.items.clear();
            state.iteration = Some(iteration);
            state.criteria = CacheCriteria::from_list(params);
            state.complete = false;
        }
        // The first occurrence of a key within an iteration is the one consumers see.
        for item in items {
            state.items.entry(item.key().clone()).or_insert_with(|| item.clone());
        }
        tracing::trace!(
            target: targets::CACHE,
            iteration,
            added = items.len(),
            total = state.items.len(),
            "page cached"
        );
        true
    }

    /// Note that `iteration` has yielded its last page.
    pub fn mark_complete(&self, iteration: IterationId) {
        let mut state = self.state.write();
        if state.iteration == Some(iteration) {
            state.complete = true;
        }
    }

    /// Whether the held iteration ran to completion.
    pub fn is_complete(&self) -> bool {
        self.state.read().complete
    }

    /// The criteria of the held iteration.
    pub fn criteria(&self) -> CacheCriteria {
        self.state.read().criteria.clone()
    }

    /// Whether rows are held and were fetched under `criteria`.
    pub fn matches(&self, criteria: &CacheCriteria) -> bool {
        let state = self.state.read();
        state.iteration.is_some() && state.criteria == *criteria
    }

    /// The cached row of `key`.
    pub fn get(&self, key: &K) -> Option<Item<K, D>> {
        self.state.read().items.get(key).cloned()
    }

    /// Whether `key` is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.state.read().items.contains_key(key)
    }

    /// Split `keys` into cached and missing keys, preserving order.
    pub fn partition_keys<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a K>,
    ) -> (IndexSet<K>, IndexSet<K>) {
        let state = self.state.read();
        keys.into_iter()
            .cloned()
            .partition(|key| state.items.contains_key(key))
    }

    /// Every requested row, or `None` if any is missing.
    pub fn get_all<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a K>,
    ) -> Option<IndexMap<K, Item<K, D>>> {
        let state = self.state.read();
        keys.into_iter()
            .map(|key| state.items.get(key).map(|item| (key.clone(), item.clone())))
            .collect()
    }

    /// Rows `offset..offset + size` in iteration order.
    ///
    /// Returns `None` when the range extends past the cached rows and the
    /// iteration has not completed. The flag reports whether no rows exist
    /// past the range.
    pub fn range(&self, offset: usize, size: Option<usize>) -> Option<(Vec<Item<K, D>>, bool)> {
        let state = self.state.read();
        state.iteration?;
        let len = state.items.len();
        let end = match size {
            Some(size) => offset.saturating_add(size),
            None => usize::MAX,
        };
        if end > len && !state.complete {
            return None;
        }
        let end = end.min(len);
        let start = offset.min(end);
        let rows = state.items.values().skip(start).take(end - start).cloned().collect();
        Some((rows, state.complete && end == len))
    }

    /// Apply the removes and updates of a mutation.
    pub fn apply_mutation(&self, detail: &MutationEventDetail<K, D>) {
        if let Some(remove) = &detail.remove {
            self.remove_keys(remove.keys.iter());
        }
        if let Some(update) = &detail.update {
            self.update_items(update);
        }
        if detail.add.as_ref().is_some_and(|add| !add.is_empty()) {
            self.state.write().complete = false;
        }
    }

    /// Drop `keys`; returns how many were cached.
    pub fn remove_keys<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> usize {
        let mut state = self.state.write();
        let removed: Vec<&K> = keys
            .into_iter()
            .filter(|key| state.items.shift_remove(*key).is_some())
            .collect();
        if !removed.is_empty() {
            tracing::trace!(
                target: targets::CACHE,
                keys = %summarize_keys(&removed),
                "removed from cache"
            );
        }
        removed.len()
    }

    /// Refresh cached rows from an update.
    ///
    /// Rows updated without data are evicted; uncached keys are ignored.
    pub fn update_items(&self, update: &MutationOperationDetail<K, D>) {
        let mut state = self.state.write();
        for (position, key) in update.keys.iter().enumerate() {
            if !state.items.contains_key(key) {
                continue;
            }
            match update.data_at(position) {
                Some(data) => {
                    if let Some(item) = state.items.get_mut(key) {
                        item.data = data.clone();
                        let metadata = update.metadata.as_ref().and_then(|m| m.get(position));
                        if let Some(metadata) = metadata {
                            item.metadata = metadata.clone();
                        }
                    }
                }
                None => {
                    state.items.shift_remove(key);
                }
            }
        }
    }

    /// Drop every row and disown all iterations started so far.
    pub fn reset(&self) {
        let mut state = self.state.write();
        let dropped = state.items.len();
        state.items.clear();
        state.iteration = None;
        state.floor = self.next_iteration.load(Ordering::SeqCst);
        state.criteria = CacheCriteria::default();
        state.complete = false;
        tracing::debug!(target: targets::CACHE, dropped, "cache reset");
    }

    /// Cached keys in iteration order.
    pub fn keys(&self) -> Vec<K> {
        self.state.read().items.keys().cloned().collect()
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    /// Whether no row is cached.
    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }
}

impl<K: Key, D> std::fmt::Debug for DataCache<K, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("DataCache")
            .field("iteration", &state.iteration)
            .field("len", &state.items.len())
            .field("complete", &state.complete)
            .finish()
    }
}

/// Wrap an iteration so each page is committed to `cache` before it is yielded.
///
/// Failed or aborted pages are not committed; the error ends the stream.
pub fn record_iteration<K: Key, D: Data>(
    mut upstream: FetchListStream<K, D>,
    cache: Arc<DataCache<K, D>>,
    params: FetchListParameters,
) -> FetchListStream<K, D> {
    let iteration = cache.begin_iteration();
    try_stream! {
        while let Some(page) = next_or_abort(&mut upstream, params.signal.as_ref()).await {
            let page = page?;
            check_signal(params.signal.as_ref())?;
            cache.commit_page(iteration, &params, &page.items());
            yield page;
        }
        cache.mark_complete(iteration);
    }
    .boxed()
}

static_assertions::assert_impl_all!(DataCache<u64, String>: Send, Sync);
