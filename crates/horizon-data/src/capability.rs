//! Capability descriptors.
//!
//! Providers advertise what they already do through
//! [`get_capability`](crate::DataProvider::get_capability). The enhancement
//! factory reads these descriptors to decide which decorator layers a
//! provider still needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::types::AttributeOperator;

/// Names accepted by `get_capability`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityName {
    FetchFirst,
    FetchByKeys,
    FetchByOffset,
    Dedup,
    EventFiltering,
    Sort,
    Filter,
}

impl CapabilityName {
    /// The wire name, e.g. `"eventFiltering"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchFirst => "fetchFirst",
            Self::FetchByKeys => "fetchByKeys",
            Self::FetchByOffset => "fetchByOffset",
            Self::Dedup => "dedup",
            Self::EventFiltering => "eventFiltering",
            Self::Sort => "sort",
            Self::Filter => "filter",
        }
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityName {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "fetchFirst" => Self::FetchFirst,
            "fetchByKeys" => Self::FetchByKeys,
            "fetchByOffset" => Self::FetchByOffset,
            "dedup" => Self::Dedup,
            "eventFiltering" => Self::EventFiltering,
            "sort" => Self::Sort,
            "filter" => Self::Filter,
            other => {
                return Err(DataError::InvalidParameters(format!(
                    "unknown capability '{other}'"
                )))
            }
        })
    }
}

/// How much of the fetched data a provider keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachingType {
    #[default]
    None,
    /// Every row is held in memory.
    All,
    /// Rows visited by the live iteration are held.
    VisitedByCurrentIterator,
}

/// How fast the iteration produces pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationSpeed {
    #[default]
    Delayed,
    Immediate,
}

/// Scope in which a provider guarantees unique keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupType {
    #[default]
    None,
    /// Keys are unique across the whole data set.
    Global,
    /// Keys are unique within one iteration.
    Iterator,
}

/// Scope in which a provider filters mutation events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFilteringType {
    #[default]
    None,
    /// Only events about existing rows are dispatched.
    Global,
    /// Only events about rows the live iteration visited are dispatched.
    Iterator,
}

/// How key lookups are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchByKeysImplementation {
    #[default]
    Iteration,
    Lookup,
}

/// How offset fetches are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchByOffsetImplementation {
    #[default]
    Iteration,
    RandomAccess,
}

/// Sort support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortAttributes {
    #[default]
    None,
    Single,
    Multiple,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFirstCapability {
    pub caching: CachingType,
    pub iteration_speed: IterationSpeed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchByKeysCapability {
    pub implementation: FetchByKeysImplementation,
    pub caching: CachingType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchByOffsetCapability {
    pub implementation: FetchByOffsetImplementation,
    pub caching: CachingType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupCapability {
    #[serde(rename = "type")]
    pub dedup_type: DedupType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilteringCapability {
    #[serde(rename = "type")]
    pub filtering_type: EventFilteringType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCapability {
    pub attributes: SortAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCapability {
    pub operators: Vec<AttributeOperator>,
    pub text_filter: bool,
}

impl FilterCapability {
    /// Every attribute operator plus text filtering.
    pub fn all() -> Self {
        Self {
            operators: AttributeOperator::ALL.to_vec(),
            text_filter: true,
        }
    }
}

/// A capability descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    FetchFirst(FetchFirstCapability),
    FetchByKeys(FetchByKeysCapability),
    FetchByOffset(FetchByOffsetCapability),
    Dedup(DedupCapability),
    EventFiltering(EventFilteringCapability),
    Sort(SortCapability),
    Filter(FilterCapability),
}

impl Capability {
    /// The name this descriptor answers.
    pub fn name(&self) -> CapabilityName {
        match self {
            Self::FetchFirst(_) => CapabilityName::FetchFirst,
            Self::FetchByKeys(_) => CapabilityName::FetchByKeys,
            Self::FetchByOffset(_) => CapabilityName::FetchByOffset,
            Self::Dedup(_) => CapabilityName::Dedup,
            Self::EventFiltering(_) => CapabilityName::EventFiltering,
            Self::Sort(_) => CapabilityName::Sort,
            Self::Filter(_) => CapabilityName::Filter,
        }
    }

    /// Iteration caching capability.
    pub fn caching(caching: CachingType) -> Self {
        Self::FetchFirst(FetchFirstCapability {
            caching,
            ..Default::default()
        })
    }

    /// Dedup capability.
    pub fn dedup(dedup_type: DedupType) -> Self {
        Self::Dedup(DedupCapability { dedup_type })
    }

    /// Event filtering capability.
    pub fn event_filtering(filtering_type: EventFilteringType) -> Self {
        Self::EventFiltering(EventFilteringCapability { filtering_type })
    }
}

/// Caching advertised by an optional descriptor; absent means none.
pub fn caching_of(capability: Option<&Capability>) -> CachingType {
    match capability {
        Some(Capability::FetchFirst(fetch_first)) => fetch_first.caching,
        _ => CachingType::None,
    }
}

/// Dedup scope advertised by an optional descriptor; absent means none.
pub fn dedup_of(capability: Option<&Capability>) -> DedupType {
    match capability {
        Some(Capability::Dedup(dedup)) => dedup.dedup_type,
        _ => DedupType::None,
    }
}

/// Event filtering scope advertised by an optional descriptor; absent means none.
pub fn event_filtering_of(capability: Option<&Capability>) -> EventFilteringType {
    match capability {
        Some(Capability::EventFiltering(filtering)) => filtering.filtering_type,
        _ => EventFilteringType::None,
    }
}
