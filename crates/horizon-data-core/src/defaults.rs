//! Default-value resolution for element properties.
//!
//! Defaults come from three tiers, lowest precedence first:
//!
//! 1. **Dynamic defaults**: per-class values that depend on the runtime
//!    environment (e.g. theme), from [`ElementClass::dynamic_defaults`].
//!    They only fill properties the static tier leaves undefined.
//! 2. **Static defaults**: computed once per element class, either from a
//!    props-defaults provider (virtual-DOM components) or by rolling up the
//!    `value` entries of the element metadata, recursing into sub-properties.
//! 3. **Instance overrides**: values set on one element instance.
//!
//! Tiers 1 and 2 are merged lazily, once per class, and memoized in a
//! [`DefaultsRegistry`] keyed by the class's `TypeId`. The merged map is
//! shared behind an `Arc` and never mutated afterwards.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::logging::targets;
use crate::metadata::{ElementMetadata, PropertyMetadata};

/// An immutable, shared map of property defaults.
pub type Defaults = Arc<Map<String, Value>>;

/// A class of custom elements whose defaults can be resolved.
pub trait ElementClass: 'static {
    /// Element metadata, if the class is metadata-driven.
    fn metadata() -> Option<Arc<ElementMetadata>> {
        None
    }

    /// Defaults declared by a props class.
    ///
    /// When this returns `Some`, metadata defaults are not consulted.
    fn props_defaults() -> Option<Map<String, Value>> {
        None
    }

    /// Environment-dependent defaults, used for properties without a static default.
    fn dynamic_defaults() -> Map<String, Value> {
        Map::new()
    }
}

/// Roll up the default values declared in a property metadata map.
///
/// Object properties without a `value` contribute an object built from their
/// sub-property defaults, if any sub-property declares one.
pub fn rollup_metadata_defaults(
    properties: &IndexMap<String, PropertyMetadata>,
) -> Map<String, Value> {
    let mut defaults = Map::new();
    for (name, property) in properties {
        if let Some(value) = &property.value {
            defaults.insert(name.clone(), value.clone());
        } else if let Some(sub_properties) = &property.properties {
            let nested = rollup_metadata_defaults(sub_properties);
            if !nested.is_empty() {
                defaults.insert(name.clone(), Value::Object(nested));
            }
        }
    }
    defaults
}

/// Compute the static tier.
pub fn static_defaults(
    metadata: Option<&ElementMetadata>,
    props_defaults: Option<Map<String, Value>>,
) -> Map<String, Value> {
    match props_defaults {
        Some(defaults) => defaults,
        None => metadata
            .map(|metadata| rollup_metadata_defaults(&metadata.properties))
            .unwrap_or_default(),
    }
}

/// Merge the tiers; later tiers win per top-level property.
pub fn merge_tiers(
    base: &Map<String, Value>,
    overrides: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = base.clone();
    for (name, value) in overrides {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

struct ResolvedDefaults {
    static_defaults: Defaults,
    defaults: Defaults,
}

/// Memoized defaults per element class.
pub struct DefaultsRegistry {
    entries: RwLock<HashMap<TypeId, Arc<ResolvedDefaults>>>,
}

impl Default for DefaultsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_DEFAULTS: OnceLock<DefaultsRegistry> = OnceLock::new();

/// The process-wide defaults registry.
pub fn global_defaults() -> &'static DefaultsRegistry {
    GLOBAL_DEFAULTS.get_or_init(DefaultsRegistry::new)
}

impl DefaultsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn resolved<T: ElementClass>(&self) -> Arc<ResolvedDefaults> {
        let key = TypeId::of::<T>();
        if let Some(entry) = self.entries.read().get(&key) {
            return entry.clone();
        }

        // Computed outside the lock: class hooks may consult other registries.
        let metadata = T::metadata();
        let static_tier = static_defaults(metadata.as_deref(), T::props_defaults());
        let merged = merge_tiers(&T::dynamic_defaults(), &static_tier);
        let computed = Arc::new(ResolvedDefaults {
            static_defaults: Arc::new(static_tier),
            defaults: Arc::new(merged),
        });

        let mut entries = self.entries.write();
        let entry = entries.entry(key).or_insert_with(|| {
            tracing::debug!(
                target: targets::DEFAULTS,
                class = type_name::<T>(),
                count = computed.defaults.len(),
                "defaults resolved"
            );
            computed
        });
        entry.clone()
    }

    /// Static defaults of `T`, without the dynamic tier.
    pub fn static_defaults<T: ElementClass>(&self) -> Defaults {
        self.resolved::<T>().static_defaults.clone()
    }

    /// Class defaults of `T` (static over dynamic).
    pub fn defaults<T: ElementClass>(&self) -> Defaults {
        self.resolved::<T>().defaults.clone()
    }

    /// Effective values for an instance of `T` with the given overrides.
    pub fn resolve<T: ElementClass>(&self, overrides: &Map<String, Value>) -> Map<String, Value> {
        merge_tiers(&self.defaults::<T>(), overrides)
    }

    /// Whether defaults for `T` have been computed.
    pub fn is_resolved<T: ElementClass>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of classes with memoized defaults.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no class has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    struct Avatar;

    impl ElementClass for Avatar {
        fn metadata() -> Option<Arc<ElementMetadata>> {
            let metadata = ElementMetadata::from_json(
                r#"{ "properties": {
                    "size": { "type": "string", "value": "md" },
                    "shape": { "type": "string", "value": "square" },
                    "initials": { "type": "string" },
                    "display": { "type": "object", "properties": {
                        "border": { "type": "boolean", "value": false },
                        "label": { "type": "string" }
                    } },
                    "empty": { "type": "object", "properties": { "x": { "type": "string" } } }
                } }"#,
            )
            .ok()?;
            Some(Arc::new(metadata))
        }

        fn dynamic_defaults() -> Map<String, Value> {
            object(json!({ "shape": "circle", "theme": "dark" }))
        }
    }

    struct Counted;

    static COUNTED_DYNAMIC_CALLS: AtomicUsize = AtomicUsize::new(0);

    impl ElementClass for Counted {
        fn dynamic_defaults() -> Map<String, Value> {
            COUNTED_DYNAMIC_CALLS.fetch_add(1, Ordering::SeqCst);
            object(json!({ "tone": "neutral" }))
        }
    }

    struct PropsComponent;

    impl ElementClass for PropsComponent {
        fn metadata() -> Option<Arc<ElementMetadata>> {
            Some(Arc::new(ElementMetadata {
                properties: [(
                    "ignored".to_string(),
                    PropertyMetadata::of_type("string").with_value("x"),
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }))
        }

        fn props_defaults() -> Option<Map<String, Value>> {
            Some(object(json!({ "value": 50, "max": 100 })))
        }
    }

    struct Bare;

    impl ElementClass for Bare {}

    #[test]
    fn test_rollup_metadata_defaults() {
        let metadata = Avatar::metadata().unwrap();
        let rolled = rollup_metadata_defaults(&metadata.properties);
        assert_eq!(
            Value::Object(rolled),
            json!({ "size": "md", "shape": "square", "display": { "border": false } })
        );
    }

    #[test]
    fn test_static_defaults_win_over_dynamic() {
        let registry = DefaultsRegistry::new();
        let defaults = registry.defaults::<Avatar>();
        assert_eq!(defaults.get("shape"), Some(&json!("square")));
        assert_eq!(defaults.get("theme"), Some(&json!("dark")));
        assert_eq!(defaults.get("size"), Some(&json!("md")));

        let statics = registry.static_defaults::<Avatar>();
        assert!(statics.get("theme").is_none());
    }

    #[test]
    fn test_instance_overrides_win() {
        let registry = DefaultsRegistry::new();
        let overrides = object(json!({ "shape": "circle", "theme": "light", "initials": "AB" }));
        let resolved = registry.resolve::<Avatar>(&overrides);
        assert_eq!(resolved.get("shape"), Some(&json!("circle")));
        assert_eq!(resolved.get("theme"), Some(&json!("light")));
        assert_eq!(resolved.get("initials"), Some(&json!("AB")));
        assert_eq!(resolved.get("size"), Some(&json!("md")));
    }

    #[test]
    fn test_defaults_are_memoized() {
        let registry = DefaultsRegistry::new();
        assert!(!registry.is_resolved::<Counted>());

        let first = registry.defaults::<Counted>();
        let second = registry.defaults::<Counted>();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(COUNTED_DYNAMIC_CALLS.load(Ordering::SeqCst), 1);
        assert!(registry.is_resolved::<Counted>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_props_defaults_take_precedence_over_metadata() {
        let registry = DefaultsRegistry::new();
        let defaults = registry.defaults::<PropsComponent>();
        assert_eq!(defaults.get("value"), Some(&json!(50)));
        assert!(defaults.get("ignored").is_none());
    }

    #[test]
    fn test_class_without_hooks_has_no_defaults() {
        let registry = DefaultsRegistry::new();
        assert!(registry.defaults::<Bare>().is_empty());
    }
}
