//! Element instances.
//!
//! An [`ElementInstance`] is the property bag of one custom element: the
//! class defaults resolved by the [`DefaultsRegistry`](crate::defaults::DefaultsRegistry)
//! plus the values set on this instance. Writes are validated against the
//! element metadata and announced through a `"{property}Changed"` event.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::defaults::{merge_tiers, Defaults};
use crate::error::{CoreResult, PropertyError, RegistryError};
use crate::event::{Event, EventTarget, EventTargetMixin};
use crate::logging::targets;
use crate::metadata::ElementMetadata;
use crate::registry::ElementRegistry;

/// Notification that a property value changed.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangedEvent {
    event_type: String,
    /// Top-level property name.
    pub property: String,
    /// Full dotted path when a sub-property was written.
    pub sub_property: Option<String>,
    /// The new top-level value.
    pub value: Value,
    /// The previous top-level value.
    pub previous_value: Value,
}

impl PropertyChangedEvent {
    /// The event type dispatched for a property, e.g. `"sizeChanged"`.
    pub fn event_type_for(property: &str) -> String {
        format!("{property}Changed")
    }
}

impl Event for PropertyChangedEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }
}

/// The property state of one element.
pub struct ElementInstance {
    tag: String,
    metadata: Arc<ElementMetadata>,
    defaults: Defaults,
    values: RwLock<Map<String, Value>>,
    events: EventTarget<PropertyChangedEvent>,
}

impl ElementInstance {
    /// Create an instance with explicit metadata and defaults.
    pub fn new(tag: impl Into<String>, metadata: Arc<ElementMetadata>, defaults: Defaults) -> Self {
        Self {
            tag: tag.into().to_lowercase(),
            metadata,
            defaults,
            values: RwLock::new(Map::new()),
            events: EventTarget::new(),
        }
    }

    /// Create an instance of a registered element.
    pub fn from_registry(
        registry: &ElementRegistry,
        tag: &str,
        defaults: Defaults,
    ) -> CoreResult<Self> {
        let metadata = registry
            .metadata(tag)
            .ok_or_else(|| RegistryError::not_registered(tag))?;
        Ok(Self::new(tag, metadata, defaults))
    }

    /// The lowercased tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The element metadata.
    pub fn metadata(&self) -> &Arc<ElementMetadata> {
        &self.metadata
    }

    /// The class defaults this instance falls back to.
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Read a property by dotted path: the instance value, else the default.
    pub fn get(&self, path: &str) -> Option<Value> {
        let (top, rest) = split_path(path);
        let values = self.values.read();
        let root = values.get(top).or_else(|| self.defaults.get(top))?;
        lookup(root, rest).cloned()
    }

    /// Whether the property has a value set on this instance.
    pub fn is_set(&self, property: &str) -> bool {
        self.values.read().contains_key(property)
    }

    /// Write a property by dotted path.
    ///
    /// Returns `Ok(true)` and dispatches `"{property}Changed"` when the
    /// effective value changed, `Ok(false)` when it was already equal.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> CoreResult<bool> {
        let value = value.into();
        let (top, rest) = split_path(path);
        self.check_writable(path, top, &value)?;

        let event = {
            let mut values = self.values.write();
            let previous = values
                .get(top)
                .or_else(|| self.defaults.get(top))
                .cloned()
                .unwrap_or(Value::Null);

            let updated = match rest {
                None => value,
                Some(rest) => {
                    let mut root = match &previous {
                        Value::Null => Value::Object(Map::new()),
                        other => other.clone(),
                    };
                    write_nested(&mut root, rest, value).map_err(|()| PropertyError::NotAnObject {
                        name: top.to_string(),
                    })?;
                    root
                }
            };

            if updated == previous {
                return Ok(false);
            }
            values.insert(top.to_string(), updated.clone());
            PropertyChangedEvent {
                event_type: PropertyChangedEvent::event_type_for(top),
                property: top.to_string(),
                sub_property: rest.map(|_| path.to_string()),
                value: updated,
                previous_value: previous,
            }
        };

        tracing::trace!(
            target: targets::ELEMENT,
            tag = self.tag.as_str(),
            property = path,
            "property changed"
        );
        self.events.dispatch_event(&event);
        Ok(true)
    }

    /// Remove the instance value so the property reverts to its default.
    ///
    /// Returns whether the effective value changed.
    pub fn unset(&self, property: &str) -> bool {
        let event = {
            let mut values = self.values.write();
            let Some(previous) = values.remove(property) else {
                return false;
            };
            let value = self.defaults.get(property).cloned().unwrap_or(Value::Null);
            if value == previous {
                return false;
            }
            PropertyChangedEvent {
                event_type: PropertyChangedEvent::event_type_for(property),
                property: property.to_string(),
                sub_property: None,
                value,
                previous_value: previous,
            }
        };
        self.events.dispatch_event(&event);
        true
    }

    /// All effective top-level values.
    pub fn properties(&self) -> Map<String, Value> {
        merge_tiers(&self.defaults, &self.values.read())
    }

    fn check_writable(&self, path: &str, top: &str, value: &Value) -> Result<(), PropertyError> {
        let property = self.metadata.property(path).ok_or_else(|| PropertyError::NotFound {
            name: path.to_string(),
        })?;
        let top_read_only = self.metadata.property(top).is_some_and(|p| p.read_only);
        if property.read_only || top_read_only {
            return Err(PropertyError::ReadOnly { name: path.to_string() });
        }
        if !property.allows(value) {
            return Err(PropertyError::InvalidValue {
                name: path.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

impl EventTargetMixin<PropertyChangedEvent> for ElementInstance {
    fn event_target(&self) -> &EventTarget<PropertyChangedEvent> {
        &self.events
    }
}

impl fmt::Debug for ElementInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementInstance")
            .field("tag", &self.tag)
            .field("values", &*self.values.read())
            .finish()
    }
}

static_assertions::assert_impl_all!(ElementInstance: Send, Sync);

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((top, rest)) => (top, Some(rest)),
        None => (path, None),
    }
}

fn lookup<'a>(root: &'a Value, rest: Option<&str>) -> Option<&'a Value> {
    let Some(rest) = rest else {
        return Some(root);
    };
    rest.split('.').try_fold(root, |current, segment| current.as_object()?.get(segment))
}

fn write_nested(root: &mut Value, rest: &str, value: Value) -> Result<(), ()> {
    let mut segments = rest.split('.').peekable();
    let mut current = root;
    while let Some(segment) = segments.next() {
        let object = current.as_object_mut().ok_or(())?;
        if segments.peek().is_none() {
            object.insert(segment.to_string(), value);
            return Ok(());
        }
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::listener;
    use crate::metadata::PropertyMetadata;
    use parking_lot::Mutex;
    use serde_json::json;

    fn avatar() -> ElementInstance {
        let metadata = ElementMetadata {
            properties: [
                (
                    "size".to_string(),
                    PropertyMetadata {
                        enum_values: Some(vec![json!("sm"), json!("md"), json!("lg")]),
                        ..PropertyMetadata::of_type("string").with_value("md")
                    },
                ),
                ("initials".to_string(), PropertyMetadata::of_type("string")),
                ("status".to_string(), PropertyMetadata::of_type("string").read_only()),
                (
                    "display".to_string(),
                    PropertyMetadata::of_type("object")
                        .with_sub_property(
                            "shape",
                            PropertyMetadata::of_type("string").with_value("square"),
                        )
                        .with_sub_property("border", PropertyMetadata::of_type("boolean")),
                ),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let defaults = json!({ "size": "md", "display": { "shape": "square" } });
        let Value::Object(defaults) = defaults else { unreachable!() };
        ElementInstance::new("Demo-Avatar", Arc::new(metadata), Arc::new(defaults))
    }

    #[test]
    fn test_get_falls_back_to_defaults() {
        let element = avatar();
        assert_eq!(element.tag(), "demo-avatar");
        assert_eq!(element.get("size"), Some(json!("md")));
        assert_eq!(element.get("display.shape"), Some(json!("square")));
        assert_eq!(element.get("initials"), None);
    }

    #[test]
    fn test_set_reports_change_and_dispatches() {
        let element = avatar();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        element.add_event_listener(
            "sizeChanged",
            listener(move |event: &PropertyChangedEvent| {
                events_clone.lock().push((event.value.clone(), event.previous_value.clone()));
            }),
        );

        assert!(element.set("size", "lg").unwrap());
        assert!(!element.set("size", "lg").unwrap());
        assert_eq!(element.get("size"), Some(json!("lg")));
        assert_eq!(*events.lock(), vec![(json!("lg"), json!("md"))]);
    }

    #[test]
    fn test_setting_default_value_is_not_a_change() {
        let element = avatar();
        assert!(!element.set("size", "md").unwrap());
        assert!(!element.is_set("size"));
    }

    #[test]
    fn test_sub_property_write_merges_with_default() {
        let element = avatar();
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        element.add_event_listener(
            "displayChanged",
            listener(move |event: &PropertyChangedEvent| {
                events_clone.lock().push(event.sub_property.clone())
            }),
        );

        assert!(element.set("display.border", true).unwrap());
        assert_eq!(element.get("display"), Some(json!({ "shape": "square", "border": true })));
        assert_eq!(*events.lock(), vec![Some("display.border".to_string())]);
    }

    #[test]
    fn test_rejected_writes() {
        let element = avatar();
        assert_eq!(
            element.set("unknown", 1).unwrap_err().to_string(),
            "Property error: Property 'unknown' not found"
        );
        assert!(matches!(
            element.set("status", "busy"),
            Err(crate::error::CoreError::Property(PropertyError::ReadOnly { .. }))
        ));
        assert!(matches!(
            element.set("size", "xxl"),
            Err(crate::error::CoreError::Property(PropertyError::InvalidValue { .. }))
        ));
        assert_eq!(element.get("size"), Some(json!("md")));
    }

    #[test]
    fn test_sub_property_of_scalar_is_rejected() {
        let element = avatar();
        element.set("display", "flat").unwrap();
        assert!(matches!(
            element.set("display.shape", "circle"),
            Err(crate::error::CoreError::Property(PropertyError::NotAnObject { .. }))
        ));
    }

    #[test]
    fn test_unset_reverts_to_default() {
        let element = avatar();
        element.set("size", "sm").unwrap();
        assert!(element.unset("size"));
        assert_eq!(element.get("size"), Some(json!("md")));
        assert!(!element.unset("size"));
    }

    #[test]
    fn test_properties_merges_values_over_defaults() {
        let element = avatar();
        element.set("initials", "AB").unwrap();
        let properties = element.properties();
        assert_eq!(properties.get("initials"), Some(&json!("AB")));
        assert_eq!(properties.get("size"), Some(&json!("md")));
    }

    #[test]
    fn test_from_registry_requires_registration() {
        let registry = ElementRegistry::new();
        let result =
            ElementInstance::from_registry(&registry, "missing-element", Arc::new(Map::new()));
        assert!(result.is_err());
    }
}
