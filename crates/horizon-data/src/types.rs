//! Data model shared by every provider.
//!
//! A provider serves keyed rows. Each row is an [`Item`]: the row data plus
//! [`ItemMetadata`] carrying its key. Fetches are described by parameter
//! structs and answered with result structs that echo the parameters back.

use std::fmt::Debug;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abort::AbortSignal;

/// Row keys: opaque, comparable, hashable.
pub trait Key: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Key for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Row data.
pub trait Data: Clone + Debug + Send + Sync + 'static {}

impl<T> Data for T where T: Clone + Debug + Send + Sync + 'static {}

/// Metadata attached to one row.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMetadata<K> {
    /// The row key.
    pub key: K,
    /// Depth of the row in a tree, root rows being at depth 0.
    pub tree_depth: Option<usize>,
    /// Key of the parent row in a tree.
    pub parent_key: Option<K>,
    /// Whether the row is a tree leaf.
    pub is_leaf: Option<bool>,
    /// The sort criteria the row was ordered by.
    pub sort_criteria: Option<Vec<SortCriterion>>,
}

impl<K> ItemMetadata<K> {
    /// Metadata carrying only a key.
    pub fn new(key: K) -> Self {
        Self {
            key,
            tree_depth: None,
            parent_key: None,
            is_leaf: None,
            sort_criteria: None,
        }
    }

    /// Set the leaf flag.
    pub fn with_leaf(mut self, is_leaf: bool) -> Self {
        self.is_leaf = Some(is_leaf);
        self
    }

    /// Set the tree position.
    pub fn with_tree_position(mut self, depth: usize, parent_key: Option<K>) -> Self {
        self.tree_depth = Some(depth);
        self.parent_key = parent_key;
        self
    }
}

/// One row: data plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<K, D> {
    pub data: D,
    pub metadata: ItemMetadata<K>,
}

impl<K, D> Item<K, D> {
    /// An item with key-only metadata.
    pub fn new(key: K, data: D) -> Self {
        Self {
            data,
            metadata: ItemMetadata::new(key),
        }
    }

    /// The row key.
    pub fn key(&self) -> &K {
        &self.metadata.key
    }
}

/// Sort direction of one criterion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort by one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortCriterion {
    pub attribute: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortCriterion {
    /// Ascending sort on `attribute`.
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on `attribute`.
    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Operators of an attribute filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeOperator {
    #[serde(rename = "$eq")]
    Eq,
    #[serde(rename = "$ne")]
    Ne,
    #[serde(rename = "$lt")]
    Lt,
    #[serde(rename = "$le")]
    Le,
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$ge")]
    Ge,
    /// String contains.
    #[serde(rename = "$co")]
    Contains,
    /// String starts with.
    #[serde(rename = "$sw")]
    StartsWith,
    /// String ends with.
    #[serde(rename = "$ew")]
    EndsWith,
    /// Attribute present and not null.
    #[serde(rename = "$pr")]
    Present,
    #[serde(rename = "$regex")]
    Regex,
}

impl AttributeOperator {
    /// All operators, in declaration order.
    pub const ALL: [AttributeOperator; 11] = [
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Le,
        Self::Gt,
        Self::Ge,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Present,
        Self::Regex,
    ];
}

/// Operators combining filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompoundOperator {
    #[serde(rename = "$and")]
    And,
    #[serde(rename = "$or")]
    Or,
}

/// A row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCriterion {
    /// Compare one attribute against a value.
    Attribute {
        op: AttributeOperator,
        attribute: String,
        value: Value,
    },
    /// Combine several criteria.
    Compound {
        op: CompoundOperator,
        criteria: Vec<FilterCriterion>,
    },
    /// Case-insensitive match against any string attribute.
    Text { text: String },
}

impl FilterCriterion {
    /// Attribute filter.
    pub fn attribute(
        op: AttributeOperator,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::Attribute {
            op,
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// `attribute == value`.
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::attribute(AttributeOperator::Eq, attribute, value)
    }

    /// `attribute` is present.
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::attribute(AttributeOperator::Present, attribute, Value::Null)
    }

    /// All criteria match.
    pub fn and(criteria: Vec<FilterCriterion>) -> Self {
        Self::Compound {
            op: CompoundOperator::And,
            criteria,
        }
    }

    /// Any criterion matches.
    pub fn or(criteria: Vec<FilterCriterion>) -> Self {
        Self::Compound {
            op: CompoundOperator::Or,
            criteria,
        }
    }

    /// Text filter.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Parameters of [`fetch_first`](crate::DataProvider::fetch_first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchListParameters {
    /// Page size. `None` uses the provider default; a negative size fetches everything.
    pub size: Option<i64>,
    pub sort_criteria: Vec<SortCriterion>,
    pub filter_criterion: Option<FilterCriterion>,
    /// Attribute projection; `None` keeps every attribute.
    pub attributes: Option<Vec<String>>,
    pub signal: Option<AbortSignal>,
}

impl FetchListParameters {
    /// Default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = Some(size);
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

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Resolve a requested page size against a provider default.
///
/// Returns `None` when every row is requested.
pub fn resolve_page_size(size: Option<i64>, default_size: usize) -> Option<usize> {
    match size {
        None => Some(default_size),
        Some(size) if size < 0 => None,
        Some(size) => Some(size as usize),
    }
}

/// One page of a `fetch_first` iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchListResult<K, D> {
    pub data: Vec<D>,
    /// Parallel to `data`.
    pub metadata: Vec<ItemMetadata<K>>,
    pub fetch_parameters: FetchListParameters,
}

impl<K: Clone, D: Clone> FetchListResult<K, D> {
    /// Build a page from items.
    pub fn from_items(items: Vec<Item<K, D>>, fetch_parameters: FetchListParameters) -> Self {
        let (data, metadata) = items.into_iter().map(|item| (item.data, item.metadata)).unzip();
        Self {
            data,
            metadata,
            fetch_parameters,
        }
    }

    /// The rows of this page as items.
    pub fn items(&self) -> Vec<Item<K, D>> {
        self.data
            .iter()
            .cloned()
            .zip(self.metadata.iter().cloned())
            .map(|(data, metadata)| Item { data, metadata })
            .collect()
    }

    /// Consume the page into items.
    pub fn into_items(self) -> Vec<Item<K, D>> {
        self.data
            .into_iter()
            .zip(self.metadata)
            .map(|(data, metadata)| Item { data, metadata })
            .collect()
    }

    /// Keys of the page, in order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.metadata.iter().map(|metadata| &metadata.key)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Whether the page has no rows.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }
}

/// Parameters of [`fetch_by_keys`](crate::DataProvider::fetch_by_keys).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchByKeysParameters<K: Key> {
    pub keys: IndexSet<K>,
    pub attributes: Option<Vec<String>>,
    pub signal: Option<AbortSignal>,
}

impl<K: Key> FetchByKeysParameters<K> {
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            attributes: None,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Answer to a key fetch; keys that were not found are absent from `results`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchByKeysResults<K: Key, D> {
    pub fetch_parameters: FetchByKeysParameters<K>,
    pub results: IndexMap<K, Item<K, D>>,
}

/// Parameters of [`contains_keys`](crate::DataProvider::contains_keys).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainsKeysParameters<K: Key> {
    pub keys: IndexSet<K>,
    pub signal: Option<AbortSignal>,
}

impl<K: Key> ContainsKeysParameters<K> {
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            signal: None,
        }
    }
}

/// Answer to a containment check: the subset of requested keys that exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainsKeysResults<K: Key> {
    pub contains_parameters: ContainsKeysParameters<K>,
    pub results: IndexSet<K>,
}

/// Parameters of [`fetch_by_offset`](crate::DataProvider::fetch_by_offset).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchByOffsetParameters {
    pub offset: usize,
    /// Number of rows. `None` uses the provider default; a negative size fetches everything.
    pub size: Option<i64>,
    pub sort_criteria: Vec<SortCriterion>,
    pub filter_criterion: Option<FilterCriterion>,
    pub attributes: Option<Vec<String>>,
    pub signal: Option<AbortSignal>,
}

impl FetchByOffsetParameters {
    pub fn new(offset: usize, size: i64) -> Self {
        Self {
            offset,
            size: Some(size),
            ..Default::default()
        }
    }

    /// Offset parameters with the criteria of a list fetch.
    pub fn from_list(offset: usize, list: &FetchListParameters) -> Self {
        Self {
            offset,
            size: list.size,
            sort_criteria: list.sort_criteria.clone(),
            filter_criterion: list.filter_criterion.clone(),
            attributes: list.attributes.clone(),
            signal: list.signal.clone(),
        }
    }

    /// The equivalent list fetch parameters, without the offset.
    pub fn list_parameters(&self) -> FetchListParameters {
        FetchListParameters {
            size: self.size,
            sort_criteria: self.sort_criteria.clone(),
            filter_criterion: self.filter_criterion.clone(),
            attributes: self.attributes.clone(),
            signal: self.signal.clone(),
        }
    }

    pub fn with_sort(mut self, sort_criteria: Vec<SortCriterion>) -> Self {
        self.sort_criteria = sort_criteria;
        self
    }

    pub fn with_filter(mut self, filter_criterion: FilterCriterion) -> Self {
        self.filter_criterion = Some(filter_criterion);
        self
    }
}

/// Answer to an offset fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchByOffsetResults<K, D> {
    pub fetch_parameters: FetchByOffsetParameters,
    pub results: Vec<Item<K, D>>,
    /// No rows exist past the returned range.
    pub done: bool,
}

/// Tri-state emptiness report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsEmpty {
    Yes,
    No,
    Unknown,
}
