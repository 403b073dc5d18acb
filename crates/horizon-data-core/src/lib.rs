//! Core systems for Horizon Data.
//!
//! This crate provides the foundational components shared by the Horizon data
//! layer and the components that consume it:
//!
//! - **Event Targets**: Case-insensitive, snapshot-based listener dispatch
//! - **Element Registry**: Custom element descriptors keyed by tag name
//! - **Element Metadata**: Property, event, method and slot declarations
//! - **Defaults Resolution**: Static, dynamic and instance-level defaults
//! - **Element Instances**: Validated property writes with change events
//!
//! # Event Target Example
//!
//! ```
//! use horizon_data_core::{listener, EventTarget, NamedEvent};
//!
//! let target = EventTarget::new();
//! let id = target.add_event_listener("refresh", listener(|event: &NamedEvent| {
//!     println!("received {:?}", event);
//! }));
//!
//! assert!(target.dispatch_event(&NamedEvent::new("Refresh")));
//! target.remove_event_listener("refresh", id);
//! ```
//!
//! # Registry Example
//!
//! ```
//! use std::sync::Arc;
//! use horizon_data_core::{
//!     ElementDescriptor, ElementMetadata, ElementRegistration, ElementRegistry,
//! };
//!
//! let registry = ElementRegistry::new();
//! let metadata = ElementMetadata::from_json(
//!     r#"{ "properties": { "size": { "type": "string", "value": "md" } } }"#,
//! )?;
//! let descriptor = ElementDescriptor::new().with_metadata(Arc::new(metadata));
//!
//! registry.register("demo-avatar", ElementRegistration::new(descriptor))?;
//! assert!(registry.is_registered("DEMO-AVATAR"));
//! assert!(registry.property_metadata("demo-avatar", "size").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod defaults;
pub mod element;
mod error;
pub mod event;
pub mod logging;
pub mod metadata;
pub mod registry;

pub use defaults::{global_defaults, Defaults, DefaultsRegistry, ElementClass};
pub use element::{ElementInstance, PropertyChangedEvent};
pub use error::{CoreError, CoreResult, PropertyError, RegistryError};
pub use event::{
    listener, Event, EventListener, EventTarget, EventTargetMixin, ListenerId, NamedEvent,
    Propagation,
};
pub use metadata::{ElementMetadata, PropertyMetadata};
pub use registry::{
    global_element_registry, ElementDescriptor, ElementRegistration, ElementRegistry,
    RegisteredElement, RenderFn,
};
