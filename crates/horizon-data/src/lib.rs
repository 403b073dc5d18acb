//! Composable asynchronous data providers for Horizon.
//!
//! A [`DataProvider`] serves keyed rows as a stream of pages and announces
//! changes through `mutate` and `refresh` events. This crate provides the
//! provider contract and the layers that sit between a raw source and the
//! component that renders it:
//!
//! - **Array Providers**: In-memory flat and tree sources with mutation events
//! - **Caching**: Rows of the live iteration answer key and offset lookups
//! - **Dedup**: No key is yielded twice within one iteration
//! - **Event Filtering**: Consumers only hear about rows they have fetched
//! - **Views**: Default criteria, field mapping and node suppression for trees
//! - **Enhancement**: Capability negotiation adding only the missing layers
//!
//! # Composition Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_data::{
//!     listener, DataProvider, DataProviderEvent, EventTargetMixin, ProviderChain,
//!     SharedDataProvider, MUTATE,
//! };
//! use horizon_data::{ArrayDataProvider, FetchListParameters};
//! use serde_json::{json, Value};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let rows = Arc::new(ArrayDataProvider::<i64, Value>::new(
//!     (1..=100).map(|id| json!({ "id": id })).collect(),
//!     "id",
//! ));
//! let source: SharedDataProvider<i64, Value> = rows.clone();
//! let provider = ProviderChain::new(source)
//!     .with_caching(true)
//!     .with_event_filtering(true)
//!     .build();
//!
//! provider.add_event_listener(MUTATE, listener(|event: &DataProviderEvent<i64, Value>| {
//!     println!("relevant change: {:?}", event.mutation());
//! }));
//!
//! // Only the first page has been seen, so removing row 90 is not reported.
//! let mut pages = provider.fetch_first(FetchListParameters::new().with_size(10));
//! futures_util::StreamExt::next(&mut pages).await;
//! rows.remove([90]);
//! # });
//! ```

pub mod abort;
pub mod array;
pub mod cache;
pub mod cached;
pub mod capability;
pub mod config;
pub mod dedup;
mod error;
pub mod event_filter;
pub mod enhance;
pub mod filter;
pub mod list_view;
pub mod mutation;
pub mod provider;
pub mod suppress;
pub mod tree_view;
pub mod types;

pub use abort::{AbortController, AbortSignal};
pub use array::{ArrayDataProvider, ArrayTreeDataProvider, ChildrenFn, KeyFn};
pub use cache::{CacheCriteria, DataCache, IterationId};
pub use cached::CachedIteratorResultsDataProvider;
pub use capability::{
    CachingType, Capability, CapabilityName, DedupType, EventFilteringType,
    FetchByKeysImplementation, FetchByOffsetImplementation, IterationSpeed, SortAttributes,
};
pub use config::{EnhancementOptions, ProviderConfig};
pub use dedup::DedupDataProvider;
pub use enhance::{get_enhanced_data_provider, ProviderChain};
pub use error::{DataError, DataResult};
pub use event_filter::MutateEventFilteringDataProvider;
pub use filter::{CompiledFilter, FieldAccess};
pub use list_view::{DataMapping, ListDataProviderView, ViewOptions};
pub use mutation::{MutationEventDetail, MutationOperationDetail};
pub use provider::{
    collect_items, DataProvider, DataProviderEvent, FetchListStream, ListenerGuard,
    SharedDataProvider, SharedTreeDataProvider, TreeDataProvider, DEFAULT_FETCH_SIZE, MUTATE,
    REFRESH,
};
pub use suppress::{SuppressNode, SuppressNodeTreeDataProvider};
pub use tree_view::TreeDataProviderView;
pub use types::{
    AttributeOperator, CompoundOperator, ContainsKeysParameters, ContainsKeysResults, Data,
    FetchByKeysParameters, FetchByKeysResults, FetchByOffsetParameters, FetchByOffsetResults,
    FetchListParameters, FetchListResult, FilterCriterion, IsEmpty, Item, ItemMetadata, Key,
    SortCriterion, SortDirection,
};

// Re-export the event primitives every provider is built on
pub use horizon_data_core::{
    listener, EventListener, EventTarget, EventTargetMixin, ListenerId, Propagation,
};
