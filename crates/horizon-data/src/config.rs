//! Provider configuration.
//!
//! Enhancement options and provider settings are plain serde types, so they
//! can be embedded in an application's own configuration or read from TOML:
//!
//! ```
//! use horizon_data::config::ProviderConfig;
//! use horizon_data::capability::{CachingType, DedupType};
//!
//! let config = ProviderConfig::from_toml_str(r#"
//! defaultFetchSize = 50
//! suppressNode = "ifEmptyChildren"
//!
//! [enhancement.fetchFirst]
//! caching = "none"
//!
//! [enhancement.dedup]
//! type = "iterator"
//! "#)?;
//!
//! assert_eq!(config.default_fetch_size, 50);
//! assert_eq!(config.enhancement.fetch_first.caching, Some(CachingType::None));
//! assert_eq!(config.enhancement.dedup.dedup_type, Some(DedupType::Iterator));
//! # Ok::<(), horizon_data::DataError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::capability::{CachingType, DedupType, EventFilteringType};
use crate::error::DataResult;
use crate::provider::DEFAULT_FETCH_SIZE;
use crate::suppress::SuppressNode;

/// Requested caching of the `fetch_first` layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchFirstOptions {
    /// `none` disables the caching layer; anything else leaves it to negotiation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caching: Option<CachingType>,
}

/// Requested dedup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupOptions {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub dedup_type: Option<DedupType>,
}

/// Requested mutation event filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilteringOptions {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub filtering_type: Option<EventFilteringType>,
}

/// Options of [`get_enhanced_data_provider`](crate::get_enhanced_data_provider).
///
/// A capability set to `none` is never added. Unset capabilities are added
/// when the provider lacks them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancementOptions {
    pub fetch_first: FetchFirstOptions,
    pub dedup: DedupOptions,
    pub event_filtering: EventFilteringOptions,
}

impl EnhancementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caching(mut self, caching: CachingType) -> Self {
        self.fetch_first.caching = Some(caching);
        self
    }

    pub fn with_dedup(mut self, dedup_type: DedupType) -> Self {
        self.dedup.dedup_type = Some(dedup_type);
        self
    }

    pub fn with_event_filtering(mut self, filtering_type: EventFilteringType) -> Self {
        self.event_filtering.filtering_type = Some(filtering_type);
        self
    }

    pub(crate) fn caching_disabled(&self) -> bool {
        self.fetch_first.caching == Some(CachingType::None)
    }

    pub(crate) fn dedup_disabled(&self) -> bool {
        self.dedup.dedup_type == Some(DedupType::None)
    }

    pub(crate) fn event_filtering_disabled(&self) -> bool {
        self.event_filtering.filtering_type == Some(EventFilteringType::None)
    }
}

/// Settings of a provider pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// Page size of array providers when a fetch names none.
    pub default_fetch_size: usize,
    pub suppress_node: SuppressNode,
    pub enhancement: EnhancementOptions,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_fetch_size: DEFAULT_FETCH_SIZE,
            suppress_node: SuppressNode::None,
            enhancement: EnhancementOptions::default(),
        }
    }
}

impl ProviderConfig {
    /// Parse a configuration from TOML.
    pub fn from_toml_str(source: &str) -> DataResult<Self> {
        let config: Self = toml::from_str(source)?;
        tracing::debug!(
            target: horizon_data_core::logging::targets::DATA,
            ?config,
            "provider configuration loaded"
        );
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> DataResult<String> {
        Ok(toml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = ProviderConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.default_fetch_size, 25);
        assert!(!config.enhancement.caching_disabled());
    }

    #[test]
    fn test_disabled_capabilities() {
        let config = ProviderConfig::from_toml_str(
            r#"
            [enhancement.eventFiltering]
            type = "none"
            "#,
        )
        .unwrap();
        assert!(config.enhancement.event_filtering_disabled());
        assert!(!config.enhancement.dedup_disabled());
    }

    #[test]
    fn test_unknown_value_is_config_error() {
        let err =
            ProviderConfig::from_toml_str("[enhancement.dedup]\ntype = \"sometimes\"").unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    #[test]
    fn test_written_config_reads_back() {
        let config = ProviderConfig {
            default_fetch_size: 10,
            suppress_node: SuppressNode::IfEmptyChildren,
            enhancement: EnhancementOptions::new().with_caching(CachingType::None),
        };
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("defaultFetchSize = 10"));
        assert_eq!(ProviderConfig::from_toml_str(&text).unwrap(), config);
    }
}
