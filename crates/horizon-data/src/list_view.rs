//! A list view over another provider.
//!
//! [`ListDataProviderView`] fills in default attributes, sort and filter for
//! requests that leave them out, translates criteria through an optional
//! [`DataMapping`], and maps every row it hands out (including rows carried by
//! `mutate` events) through the mapping's field mapper.

use std::fmt;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::StreamExt;
use horizon_data_core::logging::targets;
use horizon_data_core::{listener, EventTarget, EventTargetMixin};

use crate::capability::{Capability, CapabilityName};
use crate::error::DataResult;
use crate::mutation::{MutationEventDetail, MutationOperationDetail};
use crate::provider::{
    DataProvider, DataProviderEvent, FetchListStream, ListenerGuard, SharedDataProvider, MUTATE,
    REFRESH,
};
use crate::types::{
    ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters, FetchByKeysResults,
    FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters, FetchListResult,
    FilterCriterion, IsEmpty, Item, Key, SortCriterion,
};

/// Maps a row of the wrapped provider to the row the view exposes.
pub type FieldMapFn<K, D> = Arc<dyn Fn(Item<K, D>) -> Item<K, D> + Send + Sync>;

/// Translates sort criteria from view attributes to wrapped attributes.
pub type SortMapFn = Arc<dyn Fn(Vec<SortCriterion>) -> Vec<SortCriterion> + Send + Sync>;

/// Translates a filter criterion from view attributes to wrapped attributes.
pub type FilterMapFn = Arc<dyn Fn(FilterCriterion) -> FilterCriterion + Send + Sync>;

/// Row and criteria translation between a view and its wrapped provider.
pub struct DataMapping<K, D> {
    pub map_fields: Option<FieldMapFn<K, D>>,
    pub map_sort_criteria: Option<SortMapFn>,
    pub map_filter_criterion: Option<FilterMapFn>,
}

impl<K, D> Default for DataMapping<K, D> {
    fn default() -> Self {
        Self {
            map_fields: None,
            map_sort_criteria: None,
            map_filter_criterion: None,
        }
    }
}

impl<K, D> Clone for DataMapping<K, D> {
    fn clone(&self) -> Self {
        Self {
            map_fields: self.map_fields.clone(),
            map_sort_criteria: self.map_sort_criteria.clone(),
            map_filter_criterion: self.map_filter_criterion.clone(),
        }
    }
}

impl<K: Key, D: Data> DataMapping<K, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map each row handed out by the view.
    pub fn with_map_fields<F>(mut self, map: F) -> Self
    where
        F: Fn(Item<K, D>) -> Item<K, D> + Send + Sync + 'static,
    {
        self.map_fields = Some(Arc::new(map));
        self
    }

    /// Translate requested sort criteria.
    pub fn with_map_sort_criteria<F>(mut self, map: F) -> Self
    where
        F: Fn(Vec<SortCriterion>) -> Vec<SortCriterion> + Send + Sync + 'static,
    {
        self.map_sort_criteria = Some(Arc::new(map));
        self
    }

    /// Translate a requested filter criterion.
    pub fn with_map_filter_criterion<F>(mut self, map: F) -> Self
    where
        F: Fn(FilterCriterion) -> FilterCriterion + Send + Sync + 'static,
    {
        self.map_filter_criterion = Some(Arc::new(map));
        self
    }

    fn map_items(&self, items: Vec<Item<K, D>>) -> Vec<Item<K, D>> {
        match &self.map_fields {
            Some(map) => items.into_iter().map(map.as_ref()).collect(),
            None => items,
        }
    }

    fn map_operation(
        &self,
        operation: &MutationOperationDetail<K, D>,
    ) -> MutationOperationDetail<K, D> {
        let Some(items) = operation.items() else {
            return operation.clone();
        };
        let mapped = MutationOperationDetail::from_items(self.map_items(items));
        MutationOperationDetail {
            data: mapped.data,
            metadata: if operation.metadata.is_some() {
                mapped.metadata
            } else {
                None
            },
            ..operation.clone()
        }
    }

    fn map_event(&self, event: &DataProviderEvent<K, D>) -> DataProviderEvent<K, D> {
        match event {
            DataProviderEvent::Mutate(detail) if self.map_fields.is_some() => {
                DataProviderEvent::Mutate(MutationEventDetail {
                    add: detail.add.as_ref().map(|add| self.map_operation(add)),
                    remove: detail.remove.as_ref().map(|remove| self.map_operation(remove)),
                    update: detail.update.as_ref().map(|update| self.map_operation(update)),
                })
            }
            other => other.clone(),
        }
    }
}

impl<K, D> fmt::Debug for DataMapping<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMapping")
            .field("map_fields", &self.map_fields.is_some())
            .field("map_sort_criteria", &self.map_sort_criteria.is_some())
            .field("map_filter_criterion", &self.map_filter_criterion.is_some())
            .finish()
    }
}

/// Defaults and mapping applied by a view.
pub struct ViewOptions<K, D> {
    /// Attributes fetched when a request names none.
    pub attributes: Option<Vec<String>>,
    /// Sort applied when a request has none.
    pub sort_criteria: Vec<SortCriterion>,
    /// Filter applied when a request has none.
    pub filter_criterion: Option<FilterCriterion>,
    pub data_mapping: Option<DataMapping<K, D>>,
}

impl<K, D> Default for ViewOptions<K, D> {
    fn default() -> Self {
        Self {
            attributes: None,
            sort_criteria: Vec::new(),
            filter_criterion: None,
            data_mapping: None,
        }
    }
}

impl<K, D> Clone for ViewOptions<K, D> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            sort_criteria: self.sort_criteria.clone(),
            filter_criterion: self.filter_criterion.clone(),
            data_mapping: self.data_mapping.clone(),
        }
    }
}

impl<K, D> fmt::Debug for ViewOptions<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewOptions")
            .field("attributes", &self.attributes)
            .field("sort_criteria", &self.sort_criteria)
            .field("filter_criterion", &self.filter_criterion)
            .field("data_mapping", &self.data_mapping)
            .finish()
    }
}

impl<K: Key, D: Data> ViewOptions<K, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_sort(mut self, sort_criteria: Vec<SortCriterion>) -> Self {
        self.sort_criteria = sort_criteria;
        self
    }

    pub fn with_filter(mut self, filter_criterion: FilterCriterion) -> Self {
        self.filter_criterion = Some(filter_criterion);
        self
    }

    pub fn with_data_mapping(mut self, data_mapping: DataMapping<K, D>) -> Self {
        self.data_mapping = Some(data_mapping);
        self
    }

    fn effective_sort(&self, requested: &[SortCriterion]) -> Vec<SortCriterion> {
        let sort = if requested.is_empty() {
            self.sort_criteria.clone()
        } else {
            requested.to_vec()
        };
        match self.data_mapping.as_ref().and_then(|mapping| mapping.map_sort_criteria.as_ref()) {
            Some(map) if !sort.is_empty() => map(sort),
            _ => sort,
        }
    }

    fn effective_filter(&self, requested: Option<&FilterCriterion>) -> Option<FilterCriterion> {
        let filter = requested.or(self.filter_criterion.as_ref()).cloned()?;
        let map = self
            .data_mapping
            .as_ref()
            .and_then(|mapping| mapping.map_filter_criterion.as_ref());
        Some(match map {
            Some(map) => map(filter),
            None => filter,
        })
    }

    fn effective_attributes(&self, requested: Option<&Vec<String>>) -> Option<Vec<String>> {
        requested.or(self.attributes.as_ref()).cloned()
    }

    fn list_parameters(&self, params: &FetchListParameters) -> FetchListParameters {
        FetchListParameters {
            size: params.size,
            sort_criteria: self.effective_sort(&params.sort_criteria),
            filter_criterion: self.effective_filter(params.filter_criterion.as_ref()),
            attributes: self.effective_attributes(params.attributes.as_ref()),
            signal: params.signal.clone(),
        }
    }

    fn offset_parameters(&self, params: &FetchByOffsetParameters) -> FetchByOffsetParameters {
        FetchByOffsetParameters {
            offset: params.offset,
            size: params.size,
            sort_criteria: self.effective_sort(&params.sort_criteria),
            filter_criterion: self.effective_filter(params.filter_criterion.as_ref()),
            attributes: self.effective_attributes(params.attributes.as_ref()),
            signal: params.signal.clone(),
        }
    }

    fn map_items(&self, items: Vec<Item<K, D>>) -> Vec<Item<K, D>> {
        match &self.data_mapping {
            Some(mapping) => mapping.map_items(items),
            None => items,
        }
    }
}

/// Applies [`ViewOptions`] to a wrapped provider.
pub struct ListDataProviderView<K: Key, D: Data> {
    inner: SharedDataProvider<K, D>,
    options: ViewOptions<K, D>,
    events: Arc<EventTarget<DataProviderEvent<K, D>>>,
    _listeners: [ListenerGuard<K, D>; 2],
}

impl<K: Key, D: Data> ListDataProviderView<K, D> {
    pub fn new(inner: SharedDataProvider<K, D>, options: ViewOptions<K, D>) -> Self {
        let events = Arc::new(EventTarget::new());
        let forward = |events: &Arc<EventTarget<DataProviderEvent<K, D>>>| {
            let events = events.clone();
            let mapping = options.data_mapping.clone();
            listener(move |event: &DataProviderEvent<K, D>| {
                match &mapping {
                    Some(mapping) => events.dispatch_event(&mapping.map_event(event)),
                    None => events.dispatch_event(event),
                };
            })
        };
        let listeners = [
            ListenerGuard::new(&inner, MUTATE, forward(&events)),
            ListenerGuard::new(&inner, REFRESH, forward(&events)),
        ];
        tracing::trace!(target: targets::VIEW, ?options, "list view created");
        Self {
            inner,
            options,
            events,
            _listeners: listeners,
        }
    }

    pub fn options(&self) -> &ViewOptions<K, D> {
        &self.options
    }

    /// The wrapped provider.
    pub fn inner(&self) -> &SharedDataProvider<K, D> {
        &self.inner
    }

    fn filters_rows(&self) -> bool {
        self.options.filter_criterion.is_some()
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>> for ListDataProviderView<K, D> {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        &self.events
    }
}

impl<K: Key, D: Data> DataProvider<K, D> for ListDataProviderView<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let options = self.options.clone();
        let upstream = self.inner.fetch_first(options.list_parameters(&params));
        upstream
            .map(move |page| {
                let page = page?;
                let items = options.map_items(page.into_items());
                Ok(FetchListResult::from_items(items, params.clone()))
            })
            .boxed()
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        self.inner.get_capability(name)
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        let options = self.options.clone();
        let lookup = self.inner.fetch_by_keys(FetchByKeysParameters {
            keys: params.keys.clone(),
            attributes: options.effective_attributes(params.attributes.as_ref()),
            signal: params.signal.clone(),
        });
        async move {
            let found = lookup.await?;
            let items = options.map_items(found.results.into_values().collect());
            Ok(FetchByKeysResults {
                fetch_parameters: params,
                results: items.into_iter().map(|item| (item.key().clone(), item)).collect(),
            })
        }
        .boxed()
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        let options = self.options.clone();
        let lookup = self.inner.fetch_by_offset(options.offset_parameters(&params));
        async move {
            let found = lookup.await?;
            Ok(FetchByOffsetResults {
                fetch_parameters: params,
                results: options.map_items(found.results),
                done: found.done,
            })
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
        if self.filters_rows() {
            return future::ready(Ok(-1)).boxed();
        }
        self.inner.get_total_size()
    }

    fn is_empty(&self) -> IsEmpty {
        match self.inner.is_empty() {
            IsEmpty::No if self.filters_rows() => IsEmpty::Unknown,
            other => other,
        }
    }
}

impl<K: Key, D: Data> fmt::Debug for ListDataProviderView<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListDataProviderView")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ListDataProviderView<u64, String>: Send, Sync);
