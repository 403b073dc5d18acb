//! In-memory providers.
//!
//! [`ArrayDataProvider`] serves a `Vec` of rows, honouring page size, offset,
//! filter, sort and attribute projection. Its `add`, `remove`, `update` and
//! `reset` operations change the rows and dispatch the matching `mutate` or
//! `refresh` event.
//!
//! [`ArrayTreeDataProvider`] serves the same rows as a tree, reading each
//! row's children from a children attribute.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::StreamExt;
use horizon_data_core::logging::targets;
use horizon_data_core::{listener, EventTarget, EventTargetMixin};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;

use crate::abort::check_signal;
use crate::capability::{
    CachingType, Capability, CapabilityName, DedupType, EventFilteringType, FetchByKeysCapability,
    FetchByKeysImplementation, FetchByOffsetCapability, FetchByOffsetImplementation,
    FetchFirstCapability, FilterCapability, IterationSpeed, SortAttributes, SortCapability,
};
use crate::config::ProviderConfig;
use crate::error::DataResult;
use crate::filter::{self, CompiledFilter, FieldAccess};
use crate::mutation::{MutationEventDetail, MutationOperationDetail};
use crate::provider::{
    DataProvider, DataProviderEvent, FetchListStream, SharedTreeDataProvider, TreeDataProvider,
    DEFAULT_FETCH_SIZE, MUTATE, REFRESH,
};
use crate::types::{
    resolve_page_size, ContainsKeysParameters, ContainsKeysResults, Data, FetchByKeysParameters,
    FetchByKeysResults, FetchByOffsetParameters, FetchByOffsetResults, FetchListParameters,
    FetchListResult, FilterCriterion, IsEmpty, Item, ItemMetadata, Key, SortCriterion,
};

/// Extracts a row's key; rows without a key are not served.
pub type KeyFn<K, D> = Arc<dyn Fn(&D) -> Option<K> + Send + Sync>;

/// Extracts a row's children; `None` marks a leaf.
pub type ChildrenFn<D> = Arc<dyn Fn(&D) -> Option<Vec<D>> + Send + Sync>;

fn attribute_key_fn<K: Key + DeserializeOwned, D: FieldAccess>(key_attribute: &str) -> KeyFn<K, D> {
    let key_attribute = key_attribute.to_string();
    Arc::new(move |row: &D| {
        row.field(&key_attribute)
            .and_then(|value| serde_json::from_value(value).ok())
    })
}

/// Where a level of a tree sits.
struct TreeLevel<K, D> {
    depth: usize,
    parent_key: Option<K>,
    children_fn: ChildrenFn<D>,
}

struct ArrayState<K, D> {
    rows: RwLock<Vec<D>>,
    key_fn: KeyFn<K, D>,
    tree: Option<TreeLevel<K, D>>,
}

impl<K: Key, D: Data + FieldAccess> ArrayState<K, D> {
    fn item(&self, row: &D, attributes: Option<&[String]>) -> Option<Item<K, D>> {
        let Some(key) = (self.key_fn)(row) else {
            tracing::warn!(target: targets::ARRAY, "row without key skipped");
            return None;
        };
        let mut metadata = ItemMetadata::new(key);
        if let Some(tree) = &self.tree {
            metadata.tree_depth = Some(tree.depth);
            metadata.parent_key = tree.parent_key.clone();
            metadata.is_leaf = Some((tree.children_fn)(row).is_none());
        }
        let data = match attributes {
            Some(attributes) => row.project(attributes),
            None => row.clone(),
        };
        Some(Item { data, metadata })
    }

    /// Rows matching the criteria, sorted and projected.
    fn query(
        &self,
        filter_criterion: Option<&FilterCriterion>,
        sort_criteria: &[SortCriterion],
        attributes: Option<&[String]>,
    ) -> DataResult<Vec<Item<K, D>>> {
        let compiled = filter_criterion.map(CompiledFilter::compile).transpose()?;
        let rows = self.rows.read();
        let mut selected: Vec<&D> = rows
            .iter()
            .filter(|row| compiled.as_ref().is_none_or(|filter| filter.matches(*row)))
            .collect();
        if !sort_criteria.is_empty() {
            selected.sort_by(|a, b| filter::compare_rows(*a, *b, sort_criteria));
        }
        Ok(selected
            .into_iter()
            .filter_map(|row| self.item(row, attributes))
            .collect())
    }

    fn find(&self, key: &K) -> Option<D> {
        self.rows
            .read()
            .iter()
            .find(|row| (self.key_fn)(row).as_ref() == Some(key))
            .cloned()
    }
}

/// A provider over an in-memory `Vec`.
pub struct ArrayDataProvider<K: Key, D: Data> {
    state: Arc<ArrayState<K, D>>,
    default_fetch_size: usize,
    events: EventTarget<DataProviderEvent<K, D>>,
}

impl<K: Key + DeserializeOwned, D: Data + FieldAccess> ArrayDataProvider<K, D> {
    /// Rows keyed by the value of `key_attribute`.
    pub fn new(rows: Vec<D>, key_attribute: &str) -> Self {
        Self::with_key_fn(rows, attribute_key_fn(key_attribute))
    }
}

impl<K: Key, D: Data + FieldAccess> ArrayDataProvider<K, D> {
    /// Rows keyed by a custom extractor.
    pub fn with_key_fn(rows: Vec<D>, key_fn: KeyFn<K, D>) -> Self {
        Self::from_state(ArrayState {
            rows: RwLock::new(rows),
            key_fn,
            tree: None,
        })
    }

    fn from_state(state: ArrayState<K, D>) -> Self {
        Self {
            state: Arc::new(state),
            default_fetch_size: DEFAULT_FETCH_SIZE,
            events: EventTarget::new(),
        }
    }

    /// Page size used when a fetch does not specify one.
    pub fn with_default_fetch_size(mut self, size: usize) -> Self {
        self.default_fetch_size = size.max(1);
        self
    }

    /// Apply the array settings of a provider configuration.
    pub fn with_config(self, config: &ProviderConfig) -> Self {
        self.with_default_fetch_size(config.default_fetch_size)
    }

    /// Page size used when a fetch does not specify one.
    pub fn default_fetch_size(&self) -> usize {
        self.default_fetch_size
    }

    /// A copy of the current rows.
    pub fn rows(&self) -> Vec<D> {
        self.state.rows.read().clone()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.state.rows.read().len()
    }

    /// Append rows and dispatch a `mutate` add.
    pub fn add(&self, rows: Vec<D>) {
        let (items, indexes) = {
            let mut current = self.state.rows.write();
            let start = current.len();
            let items: Vec<Item<K, D>> = rows
                .iter()
                .filter_map(|row| self.state.item(row, None))
                .collect();
            current.extend(rows);
            let indexes = (start..start + items.len()).collect::<Vec<_>>();
            (items, indexes)
        };
        if items.is_empty() {
            return;
        }
        let add = MutationOperationDetail::from_items(items).with_indexes(indexes);
        self.dispatch_mutation(MutationEventDetail::new().with_add(add));
    }

    /// Remove the rows with the given keys and dispatch a `mutate` remove.
    ///
    /// Unknown keys are ignored.
    pub fn remove(&self, keys: impl IntoIterator<Item = K>) {
        let keys: indexmap::IndexSet<K> = keys.into_iter().collect();
        let removed: Vec<(usize, Item<K, D>)> = {
            let mut current = self.state.rows.write();
            let mut removed = Vec::new();
            let mut index = 0usize;
            current.retain(|row| {
                let position = index;
                index += 1;
                match (self.state.key_fn)(row) {
                    Some(key) if keys.contains(&key) => {
                        removed.push((position, Item::new(key, row.clone())));
                        false
                    }
                    _ => true,
                }
            });
            removed
        };
        if removed.is_empty() {
            return;
        }
        let (indexes, items): (Vec<usize>, Vec<Item<K, D>>) = removed.into_iter().unzip();
        let remove = MutationOperationDetail::from_items(items).with_indexes(indexes);
        self.dispatch_mutation(MutationEventDetail::new().with_remove(remove));
    }

    /// Replace rows that share a key with `rows` and dispatch a `mutate` update.
    ///
    /// Rows whose key is not present are ignored.
    pub fn update(&self, rows: Vec<D>) {
        let updated: Vec<(usize, Item<K, D>)> = {
            let mut current = self.state.rows.write();
            let positions: HashMap<K, usize> = current
                .iter()
                .enumerate()
                .filter_map(|(position, row)| (self.state.key_fn)(row).map(|key| (key, position)))
                .collect();
            rows.into_iter()
                .filter_map(|row| {
                    let key = (self.state.key_fn)(&row)?;
                    let position = *positions.get(&key)?;
                    let item = self.state.item(&row, None)?;
                    current[position] = row;
                    Some((position, item))
                })
                .collect()
        };
        if updated.is_empty() {
            return;
        }
        let (indexes, items): (Vec<usize>, Vec<Item<K, D>>) = updated.into_iter().unzip();
        let update = MutationOperationDetail::from_items(items).with_indexes(indexes);
        self.dispatch_mutation(MutationEventDetail::new().with_update(update));
    }

    /// Replace every row and dispatch `refresh`.
    pub fn reset(&self, rows: Vec<D>) {
        *self.state.rows.write() = rows;
        tracing::debug!(target: targets::ARRAY, "rows replaced");
        self.dispatch_event(&DataProviderEvent::Refresh);
    }

    /// Dispatch a `mutate` event without changing the rows.
    pub fn dispatch_mutation(&self, detail: MutationEventDetail<K, D>) {
        tracing::trace!(target: targets::ARRAY, "dispatching mutation");
        self.dispatch_event(&DataProviderEvent::Mutate(detail));
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>> for ArrayDataProvider<K, D> {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        &self.events
    }
}

impl<K: Key, D: Data + FieldAccess> DataProvider<K, D> for ArrayDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        let state = self.state.clone();
        let page_size = resolve_page_size(params.size, self.default_fetch_size);
        try_stream! {
            check_signal(params.signal.as_ref())?;
            let items = state.query(
                params.filter_criterion.as_ref(),
                &params.sort_criteria,
                params.attributes.as_deref(),
            )?;
            let page_size = page_size.unwrap_or(items.len()).max(1);
            for chunk in items.chunks(page_size) {
                check_signal(params.signal.as_ref())?;
                yield FetchListResult::from_items(chunk.to_vec(), params.clone());
            }
        }
        .boxed()
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        Some(match name {
            CapabilityName::FetchFirst => Capability::FetchFirst(FetchFirstCapability {
                caching: CachingType::All,
                iteration_speed: IterationSpeed::Immediate,
            }),
            CapabilityName::FetchByKeys => Capability::FetchByKeys(FetchByKeysCapability {
                implementation: FetchByKeysImplementation::Lookup,
                caching: CachingType::All,
            }),
            CapabilityName::FetchByOffset => Capability::FetchByOffset(FetchByOffsetCapability {
                implementation: FetchByOffsetImplementation::RandomAccess,
                caching: CachingType::All,
            }),
            CapabilityName::Dedup => Capability::dedup(DedupType::Global),
            CapabilityName::EventFiltering => {
                Capability::event_filtering(EventFilteringType::Global)
            }
            CapabilityName::Sort => Capability::Sort(SortCapability {
                attributes: SortAttributes::Multiple,
            }),
            CapabilityName::Filter => Capability::Filter(FilterCapability::all()),
        })
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        let state = self.state.clone();
        async move {
            check_signal(params.signal.as_ref())?;
            let mut by_key: HashMap<K, Item<K, D>> = state
                .query(None, &[], params.attributes.as_deref())?
                .into_iter()
                .map(|item| (item.key().clone(), item))
                .collect();
            let results: IndexMap<K, Item<K, D>> = params
                .keys
                .iter()
                .filter_map(|key| by_key.remove(key).map(|item| (key.clone(), item)))
                .collect();
            Ok(FetchByKeysResults {
                fetch_parameters: params,
                results,
            })
        }
        .boxed()
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        let state = self.state.clone();
        let size = resolve_page_size(params.size, self.default_fetch_size);
        async move {
            check_signal(params.signal.as_ref())?;
            let items = state.query(
                params.filter_criterion.as_ref(),
                &params.sort_criteria,
                params.attributes.as_deref(),
            )?;
            let total = items.len();
            let end = size.map_or(total, |size| params.offset.saturating_add(size).min(total));
            let start = params.offset.min(end);
            let results = items[start..end].to_vec();
            Ok(FetchByOffsetResults {
                fetch_parameters: params,
                results,
                done: end >= total,
            })
        }
        .boxed()
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        let state = self.state.clone();
        async move {
            check_signal(params.signal.as_ref())?;
            let present: std::collections::HashSet<K> = {
                let rows = state.rows.read();
                rows.iter().filter_map(|row| (state.key_fn)(row)).collect()
            };
            let results = params
                .keys
                .iter()
                .filter(|key| present.contains(*key))
                .cloned()
                .collect();
            Ok(ContainsKeysResults {
                contains_parameters: params,
                results,
            })
        }
        .boxed()
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        future::ready(Ok(self.len() as i64)).boxed()
    }

    fn is_empty(&self) -> IsEmpty {
        if self.state.rows.read().is_empty() {
            IsEmpty::Yes
        } else {
            IsEmpty::No
        }
    }
}

impl<K: Key, D: Data> fmt::Debug for ArrayDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayDataProvider")
            .field("rows", &self.state.rows.read().len())
            .field("default_fetch_size", &self.default_fetch_size)
            .finish()
    }
}

/// A tree provider over nested in-memory rows.
///
/// Each level is an [`ArrayDataProvider`]. Child providers are created on
/// first request and then reused, so listeners attached to them persist,
/// until the parent row is removed or updated or the level is reset.
pub struct ArrayTreeDataProvider<K: Key, D: Data> {
    level: ArrayDataProvider<K, D>,
    children_fn: ChildrenFn<D>,
    children: Arc<Mutex<ChildProviders<K, D>>>,
}

type ChildProviders<K, D> = HashMap<K, Arc<ArrayTreeDataProvider<K, D>>>;

impl<K, D> ArrayTreeDataProvider<K, D>
where
    K: Key + DeserializeOwned,
    D: Data + FieldAccess + DeserializeOwned,
{
    /// Rows keyed by `key_attribute` whose children are listed under
    /// `children_attribute`. A row without that attribute is a leaf.
    pub fn new(rows: Vec<D>, key_attribute: &str, children_attribute: &str) -> Self {
        let children_attribute = children_attribute.to_string();
        let children_fn: ChildrenFn<D> = Arc::new(move |row: &D| {
            let children = row.field(&children_attribute)?;
            match serde_json::from_value::<Vec<D>>(children) {
                Ok(children) => Some(children),
                Err(err) => {
                    tracing::warn!(
                        target: targets::ARRAY,
                        error = %err,
                        "unreadable children attribute, treated as leaf"
                    );
                    None
                }
            }
        });
        Self::with_fns(rows, attribute_key_fn(key_attribute), children_fn)
    }
}

impl<K: Key, D: Data + FieldAccess> ArrayTreeDataProvider<K, D> {
    /// Rows with custom key and children extractors.
    pub fn with_fns(rows: Vec<D>, key_fn: KeyFn<K, D>, children_fn: ChildrenFn<D>) -> Self {
        Self::at_level(rows, key_fn, children_fn, 0, None)
    }

    fn at_level(
        rows: Vec<D>,
        key_fn: KeyFn<K, D>,
        children_fn: ChildrenFn<D>,
        depth: usize,
        parent_key: Option<K>,
    ) -> Self {
        let level = ArrayDataProvider::from_state(ArrayState {
            rows: RwLock::new(rows),
            key_fn,
            tree: Some(TreeLevel {
                depth,
                parent_key,
                children_fn: children_fn.clone(),
            }),
        });
        let children: Arc<Mutex<ChildProviders<K, D>>> = Arc::default();

        let memo = children.clone();
        level.add_event_listener(
            MUTATE,
            listener(move |event: &DataProviderEvent<K, D>| {
                let Some(detail) = event.mutation() else {
                    return;
                };
                let mut memo = memo.lock();
                let operations = [detail.remove.as_ref(), detail.update.as_ref()];
                for operation in operations.into_iter().flatten() {
                    for key in &operation.keys {
                        if memo.remove(key).is_some() {
                            tracing::trace!(target: targets::ARRAY, ?key, "child provider dropped");
                        }
                    }
                }
            }),
        );
        let memo = children.clone();
        level.add_event_listener(
            REFRESH,
            listener(move |_: &DataProviderEvent<K, D>| memo.lock().clear()),
        );

        Self {
            level,
            children_fn,
            children,
        }
    }

    /// The flat provider of this level, for mutations.
    pub fn level(&self) -> &ArrayDataProvider<K, D> {
        &self.level
    }

    /// Page size of this level and of every child level.
    pub fn with_default_fetch_size(mut self, size: usize) -> Self {
        self.level.default_fetch_size = size.max(1);
        self
    }

    /// Apply the array settings of a provider configuration.
    pub fn with_config(self, config: &ProviderConfig) -> Self {
        self.with_default_fetch_size(config.default_fetch_size)
    }

    fn depth(&self) -> usize {
        self.level.state.tree.as_ref().map_or(0, |tree| tree.depth)
    }
}

impl<K: Key, D: Data> EventTargetMixin<DataProviderEvent<K, D>> for ArrayTreeDataProvider<K, D> {
    fn event_target(&self) -> &EventTarget<DataProviderEvent<K, D>> {
        self.level.event_target()
    }
}

impl<K: Key, D: Data + FieldAccess> DataProvider<K, D> for ArrayTreeDataProvider<K, D> {
    fn fetch_first(&self, params: FetchListParameters) -> FetchListStream<K, D> {
        self.level.fetch_first(params)
    }

    fn get_capability(&self, name: CapabilityName) -> Option<Capability> {
        self.level.get_capability(name)
    }

    fn fetch_by_keys(
        &self,
        params: FetchByKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<FetchByKeysResults<K, D>>> {
        self.level.fetch_by_keys(params)
    }

    fn fetch_by_offset(
        &self,
        params: FetchByOffsetParameters,
    ) -> BoxFuture<'static, DataResult<FetchByOffsetResults<K, D>>> {
        self.level.fetch_by_offset(params)
    }

    fn contains_keys(
        &self,
        params: ContainsKeysParameters<K>,
    ) -> BoxFuture<'static, DataResult<ContainsKeysResults<K>>> {
        self.level.contains_keys(params)
    }

    fn get_total_size(&self) -> BoxFuture<'static, DataResult<i64>> {
        self.level.get_total_size()
    }

    fn is_empty(&self) -> IsEmpty {
        self.level.is_empty()
    }
}

impl<K: Key, D: Data + FieldAccess> TreeDataProvider<K, D> for ArrayTreeDataProvider<K, D> {
    fn get_child_data_provider(&self, parent_key: &K) -> Option<SharedTreeDataProvider<K, D>> {
        if let Some(child) = self.children.lock().get(parent_key) {
            return Some(child.clone());
        }
        let row = self.level.state.find(parent_key)?;
        let rows = (self.children_fn)(&row)?;
        let child = Arc::new(
            Self::at_level(
                rows,
                self.level.state.key_fn.clone(),
                self.children_fn.clone(),
                self.depth() + 1,
                Some(parent_key.clone()),
            )
            .with_default_fetch_size(self.level.default_fetch_size),
        );
        let child = self
            .children
            .lock()
            .entry(parent_key.clone())
            .or_insert(child)
            .clone();
        Some(child)
    }
}

impl<K: Key, D: Data> fmt::Debug for ArrayTreeDataProvider<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayTreeDataProvider")
            .field("level", &self.level)
            .field("children", &self.children.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(ArrayDataProvider<u64, serde_json::Value>: Send, Sync);
static_assertions::assert_impl_all!(ArrayTreeDataProvider<u64, serde_json::Value>: Send, Sync);
