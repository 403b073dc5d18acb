//! Custom element registry.
//!
//! The registry maps tag names to element descriptors. Tag names are
//! case-insensitive: they are canonicalized to lowercase once, and every
//! lookup goes through the canonical form.
//!
//! # Key Types
//!
//! - [`ElementRegistry`] - The tag name to element map
//! - [`ElementDescriptor`] - Metadata and render function of an element
//! - [`ElementRegistration`] - Descriptor plus the composite/VComponent flags
//! - [`RegisteredElement`] - A stored registration with resolved metadata
//!
//! # Registration Rules
//!
//! - Registering without a descriptor fails with
//!   [`RegistryError::MissingDescriptor`].
//! - Registration is idempotent: the first registration of a tag wins and
//!   later attempts are silently ignored.
//! - Metadata resolves through the compiled metadata, then the public
//!   metadata, then an empty metadata object.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_data_core::metadata::ElementMetadata;
//! use horizon_data_core::registry::{ElementDescriptor, ElementRegistration, ElementRegistry};
//!
//! let registry = ElementRegistry::new();
//! let descriptor = ElementDescriptor::new().with_metadata(Arc::new(ElementMetadata::default()));
//! registry.register("demo-badge", ElementRegistration::new(descriptor)).unwrap();
//!
//! assert!(registry.is_registered("DEMO-BADGE"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::RegistryError;
use crate::logging::targets;
use crate::metadata::{ElementMetadata, PropertyMetadata};

/// A render function: resolved properties in, virtual node out.
pub type RenderFn = Arc<dyn Fn(&Map<String, Value>) -> Value + Send + Sync>;

/// Global registry instance.
static GLOBAL_REGISTRY: OnceLock<ElementRegistry> = OnceLock::new();

/// The process-wide element registry.
pub fn global_element_registry() -> &'static ElementRegistry {
    GLOBAL_REGISTRY.get_or_init(ElementRegistry::new)
}

/// Describes a custom element implementation.
#[derive(Clone, Default)]
pub struct ElementDescriptor {
    /// Metadata generated at build time; takes precedence over `metadata`.
    pub compiled_metadata: Option<Arc<ElementMetadata>>,
    /// Metadata declared by the component author.
    pub metadata: Option<Arc<ElementMetadata>>,
    /// Render function, for elements that render through the registry.
    pub render: Option<RenderFn>,
}

impl ElementDescriptor {
    /// Create an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the author metadata.
    pub fn with_metadata(mut self, metadata: Arc<ElementMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Set the compiled metadata.
    pub fn with_compiled_metadata(mut self, metadata: Arc<ElementMetadata>) -> Self {
        self.compiled_metadata = Some(metadata);
        self
    }

    /// Set the render function.
    pub fn with_render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    /// Resolve metadata: compiled, then author, then empty.
    pub fn resolved_metadata(&self) -> Arc<ElementMetadata> {
        self.compiled_metadata
            .clone()
            .or_else(|| self.metadata.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementDescriptor")
            .field("compiled_metadata", &self.compiled_metadata.is_some())
            .field("metadata", &self.metadata.is_some())
            .field("render", &self.render.is_some())
            .finish()
    }
}

/// Input to [`ElementRegistry::register`].
#[derive(Clone, Debug, Default)]
pub struct ElementRegistration {
    /// The element descriptor. Required.
    pub descriptor: Option<ElementDescriptor>,
    /// The element is a composite component.
    pub composite: bool,
    /// The element is a virtual-DOM component.
    pub vcomp: bool,
}

impl ElementRegistration {
    /// A plain custom element registration.
    pub fn new(descriptor: ElementDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            ..Default::default()
        }
    }

    /// Mark the registration as a composite component.
    pub fn composite(mut self) -> Self {
        self.composite = true;
        self
    }

    /// Mark the registration as a virtual-DOM component.
    pub fn vcomponent(mut self) -> Self {
        self.vcomp = true;
        self
    }
}

/// A registered element.
#[derive(Clone, Debug)]
pub struct RegisteredElement {
    tag: String,
    descriptor: ElementDescriptor,
    metadata: Arc<ElementMetadata>,
    composite: bool,
    vcomp: bool,
}

impl RegisteredElement {
    /// The canonical (lowercase) tag name.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The descriptor supplied at registration.
    pub fn descriptor(&self) -> &ElementDescriptor {
        &self.descriptor
    }

    /// The resolved metadata.
    pub fn metadata(&self) -> &Arc<ElementMetadata> {
        &self.metadata
    }

    /// Whether this is a composite component.
    pub fn is_composite(&self) -> bool {
        self.composite
    }

    /// Whether this is a virtual-DOM component.
    pub fn is_vcomponent(&self) -> bool {
        self.vcomp
    }

    /// The render function, or an error naming `component_id`.
    pub fn render_function(&self, component_id: &str) -> Result<RenderFn, RegistryError> {
        self.descriptor
            .render
            .clone()
            .ok_or_else(|| RegistryError::MissingRenderFunction {
                component_id: component_id.to_string(),
            })
    }
}

/// Case-insensitive map from tag names to registered elements.
pub struct ElementRegistry {
    elements: RwLock<HashMap<String, Arc<RegisteredElement>>>,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            elements: RwLock::new(HashMap::new()),
        }
    }

    fn canonical(tag: &str) -> String {
        tag.to_lowercase()
    }

    /// Register an element under `tag`.
    ///
    /// Re-registering a tag is a no-op; the first registration wins.
    pub fn register(
        &self,
        tag: &str,
        registration: ElementRegistration,
    ) -> Result<(), RegistryError> {
        if tag.trim().is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(RegistryError::InvalidTagName {
                tag: tag.to_string(),
            });
        }
        let descriptor = registration
            .descriptor
            .ok_or_else(|| RegistryError::missing_descriptor(tag))?;

        let canonical = Self::canonical(tag);
        let mut elements = self.elements.write();
        if elements.contains_key(&canonical) {
            tracing::debug!(
                target: targets::REGISTRY,
                tag = canonical.as_str(),
                "already registered, ignoring"
            );
            return Ok(());
        }

        let metadata = descriptor.resolved_metadata();
        elements.insert(
            canonical.clone(),
            Arc::new(RegisteredElement {
                tag: canonical.clone(),
                descriptor,
                metadata,
                composite: registration.composite,
                vcomp: registration.vcomp,
            }),
        );
        tracing::debug!(
            target: targets::REGISTRY,
            tag = canonical.as_str(),
            composite = registration.composite,
            vcomp = registration.vcomp,
            "element registered"
        );
        Ok(())
    }

    /// Whether `tag` is registered.
    pub fn is_registered(&self, tag: &str) -> bool {
        self.elements.read().contains_key(&Self::canonical(tag))
    }

    /// Look up a registered element.
    pub fn get(&self, tag: &str) -> Option<Arc<RegisteredElement>> {
        self.elements.read().get(&Self::canonical(tag)).cloned()
    }

    /// Resolved metadata of `tag`.
    pub fn metadata(&self, tag: &str) -> Option<Arc<ElementMetadata>> {
        self.get(tag).map(|element| element.metadata().clone())
    }

    /// Metadata of a property of `tag`, by dotted path.
    pub fn property_metadata(&self, tag: &str, path: &str) -> Option<PropertyMetadata> {
        self.metadata(tag)
            .and_then(|metadata| metadata.property(path).cloned())
    }

    /// The render function of `tag`.
    ///
    /// `component_id` identifies the requesting component instance in the error.
    pub fn render_function(
        &self,
        tag: &str,
        component_id: &str,
    ) -> Result<RenderFn, RegistryError> {
        self.get(tag)
            .ok_or_else(|| RegistryError::not_registered(tag))?
            .render_function(component_id)
    }

    /// All registered tag names, sorted.
    pub fn registered_tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.elements.read().keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }
}

impl fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRegistry")
            .field("tags", &self.registered_tags())
            .finish()
    }
}

static_assertions::assert_impl_all!(ElementRegistry: Send, Sync);
