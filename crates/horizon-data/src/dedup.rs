//! The dedup decorator.
//!
//! [`DedupDataProvider`] guarantees that one iteration never yields the same
//! key twice. The first occurrence of a key wins; later pages are filtered
//! down to unseen keys and skipped entirely when nothing remains.

use std::collections::HashSet;
use std::fmt;

use async_stream::try_stream;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::StreamExt;
use horizon_data_core::logging::{summarize_keys, targets};
use horizon_data_core::{EventTarget, EventTargetMixin};

use crate::abort::next_or_abort;
use crate::capability::{Capability, CapabilityName, DedupType};
use crate::error::DataResult;
use crate::provider::{DataProvider, DataProviderEvent, FetchListStream, SharedDataProvider};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, FetchListResult, IsEmpty,
    Item, Key,
};

/// Drops keys already yielded by the current iteration.
pub struct DedupDataProvider<K: Key, D: Data> {
    inner: SharedDataProvider<K, D>,
}

impl<K: Key, D: Data> DedupDataProvider<K, D> {
    pub fn new(inner: SharedDataProvider<K, D>) -> Self {
        Self { inner }
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &SharedDataProvider<K, D> {
        &self.inner
    }
}

/// Keep the items whose key has not been seen, recording them as seen.
fn retain_unseen<K: Key, D>(
    items: Vec<Item<K, D>>,
    seen: &mut HashSet<K>,
) -> (Vec<Item<K, D>>, Vec<K>) {
    let mut dropped = Vec::new();
    let kept = items
        .into_iter()
        .filter(|item| {
            if seen.insert(item.key().clone()) {
                true
            } else {
                dropped.push(item.key().clone());
                false
            }
        })
        .collect();
    (kept, dropped)
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>> for DedupDataProvider<K, D> {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        self.inner.event_target()
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for DedupDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let signal = params.signal.clone();
        let mut upstream = self.inner.fetch_first(params);
        try_stream! {
            let mut seen: HashSet<K> = HashSet::new();
            while let Some(page) = next_or_abort(&mut upstream, signal.as_ref()).await {
                let page = page?;
                let fetch_parameters = page.fetch_parameters.clone();
                let (kept, dropped) = retain_unseen(page.into_items(), &mut seen);
                if !dropped.is_empty() {
                    tracing::debug!(
                        target: targets::DEDUP,
                        keys = %summarize_keys(&dropped),
                        "duplicate keys dropped"
                    );
                }
                if kept.is_empty() {
                    continue;
                }
                yield FetchListResult::from_items(kept, fetch_parameters);
            }
        }
        .boxed()
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        match name {
            CapabilityName::Dedup => Some(Capability::dedup(DedupType::Iterator)),
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
        let lookup = self.inner.fetch_by_offset(params);
        async move {
            let mut result = lookup.await?;
            let rows = std::mem::take(&mut result.results);
            let (kept, dropped) = retain_unseen(rows, &mut HashSet::new());
            if !dropped.is_empty() {
                tracing::debug!(
                    target: targets::DEDUP,
                    keys = %summarize_keys(&dropped),
                    "duplicate keys dropped from range"
                );
            }
            result.results = kept;
            Ok(result)
        }
        .boxed()
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

impl<K: Key, D: Data> fmt::Debug for DedupDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupDataProvider").finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(DedupDataProvider<u64, String>: Send, Sync);
