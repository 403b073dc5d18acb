//! Capability negotiation and decorator composition.
//!
//! [`get_enhanced_data_provider`] asks a provider which capabilities it
//! already has and wraps it only in the layers it lacks, always in the order
//! caching, dedup, event filtering. [`ProviderChain`] composes the same layers
//! explicitly.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_data::{
//!     get_enhanced_data_provider, ArrayDataProvider, EnhancementOptions, SharedDataProvider,
//! };
//! use serde_json::{json, Value};
//!
//! let rows: SharedDataProvider<i64, Value> =
//!     Arc::new(ArrayDataProvider::new(vec![json!({ "id": 1 })], "id"));
//!
//! // Array providers already cache, dedup and filter events.
//! let enhanced = get_enhanced_data_provider(rows.clone(), &EnhancementOptions::default());
//! assert!(Arc::ptr_eq(&rows, &enhanced));
//! ```

use std::sync::Arc;

use horizon_data_core::logging::targets;

use crate::cache::DataCache;
use crate::cached::CachedIteratorResultsDataProvider;
use crate::capability::{
    caching_of, dedup_of, event_filtering_of, CachingType, CapabilityName, DedupType,
    EventFilteringType,
};
use crate::config::EnhancementOptions;
use crate::dedup::DedupDataProvider;
use crate::event_filter::MutateEventFilteringDataProvider;
use crate::provider::SharedDataProvider;
use crate::types::{Data, Key};

/// Wrap `provider` in the layers it lacks.
///
/// Returns `provider` itself when no layer is needed.
pub fn get_enhanced_data_provider<K: Key, D: Data>(
    provider: SharedDataProvider<K, D>,
    options: &EnhancementOptions,
) -> SharedDataProvider<K, D> {
    let has_caching = matches!(
        caching_of(provider.get_capability(CapabilityName::FetchFirst).as_ref()),
        CachingType::All | CachingType::VisitedByCurrentIterator
    );
    let has_dedup = matches!(
        dedup_of(provider.get_capability(CapabilityName::Dedup).as_ref()),
        DedupType::Global | DedupType::Iterator
    );
    let has_event_filtering = matches!(
        event_filtering_of(provider.get_capability(CapabilityName::EventFiltering).as_ref()),
        EventFilteringType::Global | EventFilteringType::Iterator
    );

    let caching = !has_caching && !options.caching_disabled();
    let dedup = !has_dedup && !options.dedup_disabled();
    let event_filtering = !has_event_filtering && !options.event_filtering_disabled();

    if !(caching || dedup || event_filtering) {
        tracing::debug!(target: targets::ENHANCE, "provider needs no enhancement");
        return provider;
    }
    ProviderChain::new(provider)
        .with_caching(caching)
        .with_dedup(dedup)
        .with_event_filtering(event_filtering)
        .build()
}

/// Explicit composition of decorator layers.
///
/// One [`DataCache`] is created per [`build`](Self::build), unless one is
/// supplied with [`with_shared_cache`](Self::with_shared_cache), and shared by
/// the caching and event filtering layers.
pub struct ProviderChain<K: Key, D: Data> {
    provider: SharedDataProvider<K, D>,
    cache: Option<Arc<DataCache<K, D>>>,
    caching: bool,
    dedup: bool,
    event_filtering: bool,
}

impl<K: Key, D: Data> ProviderChain<K, D> {
    /// A chain adding no layer yet.
    pub fn new(provider: SharedDataProvider<K, D>) -> Self {
        Self {
            provider,
            cache: None,
            caching: false,
            dedup: false,
            event_filtering: false,
        }
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.caching = enabled;
        self
    }

    pub fn with_dedup(mut self, enabled: bool) -> Self {
        self.dedup = enabled;
        self
    }

    pub fn with_event_filtering(mut self, enabled: bool) -> Self {
        self.event_filtering = enabled;
        self
    }

    /// Use `cache` as the chain's shared cache.
    pub fn with_shared_cache(mut self, cache: Arc<DataCache<K, D>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Compose the selected layers over the provider.
    pub fn build(self) -> SharedDataProvider<K, D> {
        tracing::debug!(
            target: targets::ENHANCE,
            caching = self.caching,
            dedup = self.dedup,
            event_filtering = self.event_filtering,
            "composing provider chain"
        );
        let cache = self.cache.unwrap_or_default();
        let mut provider = self.provider;
        if self.caching {
            provider = Arc::new(CachedIteratorResultsDataProvider::with_cache(
                provider,
                cache.clone(),
            ));
        }
        if self.dedup {
            provider = Arc::new(DedupDataProvider::new(provider));
        }
        if self.event_filtering {
            let filtering = if self.caching {
                MutateEventFilteringDataProvider::with_shared_cache(provider, cache)
            } else {
                MutateEventFilteringDataProvider::new(provider)
            };
            provider = Arc::new(filtering);
        }
        provider
    }
}

impl<K: Key, D: Data> std::fmt::Debug for ProviderChain<K, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderChain")
            .field("caching", &self.caching)
            .field("dedup", &self.dedup)
            .field("event_filtering", &self.event_filtering)
            .finish_non_exhaustive()
    }
}
