//! Element metadata.
//!
//! Metadata describes a custom element's public surface: its properties
//! (with types, default values and nested sub-properties), events, methods
//! and slots. It is usually authored as JSON next to the component and
//! loaded with [`ElementMetadata::from_json`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;

/// Metadata for one custom element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementMetadata {
    /// Component name, if declared.
    pub name: Option<String>,
    /// Component version, if declared.
    pub version: Option<String>,
    /// Properties in declaration order.
    pub properties: IndexMap<String, PropertyMetadata>,
    /// Events, kept as raw JSON.
    pub events: IndexMap<String, Value>,
    /// Methods, kept as raw JSON.
    pub methods: IndexMap<String, Value>,
    /// Slots, kept as raw JSON.
    pub slots: IndexMap<String, Value>,
}

/// Metadata for one property or sub-property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyMetadata {
    /// Declared type, e.g. `"string"`, `"number"`, `"object"`.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    /// Default value.
    pub value: Option<Value>,
    /// Nested sub-properties for object-typed properties.
    pub properties: Option<IndexMap<String, PropertyMetadata>>,
    /// The property can only be changed by the component itself.
    pub read_only: bool,
    /// The component writes user-driven changes back to this property.
    pub writeback: bool,
    /// Allowed values, if restricted.
    pub enum_values: Option<Vec<Value>>,
}

impl ElementMetadata {
    /// Parse metadata from a JSON document.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Look up a property by dotted path, e.g. `"display.density"`.
    pub fn property(&self, path: &str) -> Option<&PropertyMetadata> {
        let mut segments = path.split('.');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            current = current.properties.as_ref()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether the metadata declares no properties at all.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertyMetadata {
    /// Create property metadata with a type and no default.
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Default::default()
        }
    }

    /// Set the default value.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Add a sub-property.
    pub fn with_sub_property(
        mut self,
        name: impl Into<String>,
        property: PropertyMetadata,
    ) -> Self {
        self.properties
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), property);
        self
    }

    /// Mark the property read-only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Whether the property has nested sub-properties.
    pub fn has_sub_properties(&self) -> bool {
        self.properties.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Whether `value` is allowed by `enum_values`.
    pub fn allows(&self, value: &Value) -> bool {
        match &self.enum_values {
            Some(allowed) => allowed.contains(value),
            None => true,
        }
    }
}
