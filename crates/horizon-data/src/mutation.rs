//! Mutation event details.
//!
//! A `mutate` event carries up to three operations (add, remove, update).
//! Each operation lists its keys as an ordered set; the optional `data`,
//! `indexes`, `metadata`, `add_before_keys` and `parent_keys` arrays are
//! parallel to it, position `i` describing the `i`-th key.

use indexmap::IndexSet;

use crate::types::{Item, ItemMetadata, Key};

/// One operation of a mutation event.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOperationDetail<K: Key, D> {
    pub keys: IndexSet<K>,
    pub data: Option<Vec<D>>,
    pub indexes: Option<Vec<usize>>,
    pub metadata: Option<Vec<ItemMetadata<K>>>,
    /// For adds: the key each new row is inserted before, if any.
    pub add_before_keys: Option<Vec<Option<K>>>,
    /// For adds into a tree: the parent of each new row.
    pub parent_keys: Option<Vec<Option<K>>>,
}

impl<K: Key, D: Clone> MutationOperationDetail<K, D> {
    /// An operation over `keys` with no parallel arrays.
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            data: None,
            indexes: None,
            metadata: None,
            add_before_keys: None,
            parent_keys: None,
        }
    }

    /// An operation describing full items.
    pub fn from_items(items: Vec<Item<K, D>>) -> Self {
        let mut detail = Self::new(items.iter().map(|item| item.key().clone()));
        let (data, metadata) = items.into_iter().map(|item| (item.data, item.metadata)).unzip();
        detail.data = Some(data);
        detail.metadata = Some(metadata);
        detail
    }

    pub fn with_data(mut self, data: Vec<D>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<usize>) -> Self {
        self.indexes = Some(indexes);
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<ItemMetadata<K>>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_add_before_keys(mut self, add_before_keys: Vec<Option<K>>) -> Self {
        self.add_before_keys = Some(add_before_keys);
        self
    }

    pub fn with_parent_keys(mut self, parent_keys: Vec<Option<K>>) -> Self {
        self.parent_keys = Some(parent_keys);
        self
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the operation names no key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The data of the key at `position`, if data was supplied.
    pub fn data_at(&self, position: usize) -> Option<&D> {
        self.data.as_ref()?.get(position)
    }

    /// A new detail keeping only the keys accepted by `keep`.
    ///
    /// Parallel arrays shrink at the same positions. Arrays shorter than the
    /// key set keep whatever entries line up with retained keys.
    pub fn retain_keys(&self, mut keep: impl FnMut(&K) -> bool) -> Self {
        let kept: Vec<usize> = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(position, key)| keep(key).then_some(position))
            .collect();

        fn pick<T: Clone>(values: &Option<Vec<T>>, kept: &[usize]) -> Option<Vec<T>> {
            values
                .as_ref()
                .map(|values| kept.iter().filter_map(|&i| values.get(i).cloned()).collect())
        }

        Self {
            keys: kept.iter().filter_map(|&i| self.keys.get_index(i).cloned()).collect(),
            data: pick(&self.data, &kept),
            indexes: pick(&self.indexes, &kept),
            metadata: pick(&self.metadata, &kept),
            add_before_keys: pick(&self.add_before_keys, &kept),
            parent_keys: pick(&self.parent_keys, &kept),
        }
    }

    /// The operation as items, when data was supplied.
    pub fn items(&self) -> Option<Vec<Item<K, D>>> {
        let data = self.data.as_ref()?;
        Some(
            self.keys
                .iter()
                .zip(data)
                .enumerate()
                .map(|(position, (key, data))| Item {
                    data: data.clone(),
                    metadata: self
                        .metadata
                        .as_ref()
                        .and_then(|metadata| metadata.get(position).cloned())
                        .unwrap_or_else(|| ItemMetadata::new(key.clone())),
                })
                .collect(),
        )
    }
}

/// Payload of a `mutate` event.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationEventDetail<K: Key, D> {
    pub add: Option<MutationOperationDetail<K, D>>,
    pub remove: Option<MutationOperationDetail<K, D>>,
    pub update: Option<MutationOperationDetail<K, D>>,
}

impl<K: Key, D> Default for MutationEventDetail<K, D> {
    fn default() -> Self {
        Self {
            add: None,
            remove: None,
            update: None,
        }
    }
}

impl<K: Key, D: Clone> MutationEventDetail<K, D> {
    /// A detail with no operations.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add(mut self, add: MutationOperationDetail<K, D>) -> Self {
        self.add = Some(add);
        self
    }

    pub fn with_remove(mut self, remove: MutationOperationDetail<K, D>) -> Self {
        self.remove = Some(remove);
        self
    }

    pub fn with_update(mut self, update: MutationOperationDetail<K, D>) -> Self {
        self.update = Some(update);
        self
    }

    /// Whether every operation is absent or names no key.
    pub fn is_empty(&self) -> bool {
        [&self.add, &self.remove, &self.update]
            .into_iter()
            .all(|operation| operation.as_ref().is_none_or(MutationOperationDetail::is_empty))
    }
}
