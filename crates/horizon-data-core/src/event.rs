//! Event targets for Horizon Data.
//!
//! This module provides the pub/sub primitive shared by every data provider
//! and element instance. Listeners are registered per event type and invoked
//! in registration order when a matching event is dispatched.
//!
//! # Key Types
//!
//! - [`EventTarget<E>`] - Listener storage and dispatch
//! - [`EventTargetMixin`] - Gives any type holding an [`EventTarget`] the
//!   `add_event_listener` / `remove_event_listener` / `dispatch_event` surface
//! - [`ListenerId`] - Handle returned on registration, used for removal
//! - [`Propagation`] - A listener's verdict; [`Propagation::Stop`] cancels dispatch
//!
//! # Dispatch Semantics
//!
//! - Event types are matched case-insensitively (`"Mutate"` reaches listeners
//!   registered for `"mutate"`).
//! - Dispatch iterates a snapshot of the listener list. Listeners added or
//!   removed while a dispatch is running do not affect that dispatch.
//! - A listener returning [`Propagation::Stop`] (or `false`) ends the dispatch
//!   immediately and [`EventTarget::dispatch_event`] returns `false`.
//!
//! # Example
//!
//! ```
//! use horizon_data_core::event::{listener, Event, EventTarget};
//!
//! struct Ping;
//!
//! impl Event for Ping {
//!     fn event_type(&self) -> &str {
//!         "ping"
//!     }
//! }
//!
//! let target = EventTarget::<Ping>::new();
//! let id = target.add_event_listener("PING", listener(|_: &Ping| println!("pong")));
//!
//! assert!(target.dispatch_event(&Ping));
//! assert!(target.remove_event_listener("ping", id));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a registered listener.
    ///
    /// Closures carry no identity, so the id stands in for the listener
    /// reference when calling [`EventTarget::remove_event_listener`].
    pub struct ListenerId;
}

/// What a listener asks the dispatcher to do next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Keep delivering the event to the remaining listeners.
    #[default]
    Continue,
    /// Stop delivery; `dispatch_event` returns `false`.
    Stop,
}

impl From<()> for Propagation {
    fn from(_: ()) -> Self {
        Self::Continue
    }
}

impl From<bool> for Propagation {
    fn from(keep_going: bool) -> Self {
        if keep_going { Self::Continue } else { Self::Stop }
    }
}

/// An event that can be dispatched through an [`EventTarget`].
pub trait Event: Send + Sync {
    /// The event type used to select listeners.
    fn event_type(&self) -> &str;
}

/// A type-erased listener.
pub type EventListener<E> = Arc<dyn Fn(&E) -> Propagation + Send + Sync>;

/// Wrap a closure as an [`EventListener`].
///
/// The closure may return `()` (always continue), `bool` (`false` stops
/// propagation) or a [`Propagation`].
pub fn listener<E, F, R>(f: F) -> EventListener<E>
where
    E: 'static,
    F: Fn(&E) -> R + Send + Sync + 'static,
    R: Into<Propagation>,
{
    Arc::new(move |event: &E| f(event).into())
}

struct Registration<E> {
    /// Lowercased event type.
    event_type: String,
    listener: EventListener<E>,
}

struct Listeners<E> {
    slots: SlotMap<ListenerId, Registration<E>>,
    /// Registration order; slot iteration order is not stable across removals.
    order: Vec<ListenerId>,
}

/// Listener storage with case-insensitive, snapshot-based dispatch.
pub struct EventTarget<E> {
    listeners: Mutex<Listeners<E>>,
}

impl<E: Event + 'static> Default for EventTarget<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event + 'static> EventTarget<E> {
    /// Create a target with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners {
                slots: SlotMap::with_key(),
                order: Vec::new(),
            }),
        }
    }

    /// Register a listener for `event_type`.
    pub fn add_event_listener(&self, event_type: &str, listener: EventListener<E>) -> ListenerId {
        let mut listeners = self.listeners.lock();
        let id = listeners.slots.insert(Registration {
            event_type: event_type.to_lowercase(),
            listener,
        });
        listeners.order.push(id);
        tracing::trace!(target: targets::EVENT, event_type, "listener added");
        id
    }

    /// Remove a listener previously registered for `event_type`.
    ///
    /// Returns `false` if the id is unknown or was registered for another type.
    pub fn remove_event_listener(&self, event_type: &str, id: ListenerId) -> bool {
        let event_type = event_type.to_lowercase();
        let mut listeners = self.listeners.lock();
        match listeners.slots.get(id) {
            Some(registration) if registration.event_type == event_type => {
                listeners.slots.remove(id);
                listeners.order.retain(|existing| *existing != id);
                true
            }
            _ => false,
        }
    }

    /// Dispatch an event to every listener registered for its type.
    ///
    /// Returns `false` if a listener stopped propagation, `true` otherwise.
    #[tracing::instrument(skip_all, target = "horizon_data_core::event", level = "trace")]
    pub fn dispatch_event(&self, event: &E) -> bool {
        let event_type = event.event_type().to_lowercase();
        let snapshot: Vec<EventListener<E>> = {
            let listeners = self.listeners.lock();
            listeners
                .order
                .iter()
                .filter_map(|id| listeners.slots.get(*id))
                .filter(|registration| registration.event_type == event_type)
                .map(|registration| registration.listener.clone())
                .collect()
        };

        tracing::trace!(
            target: targets::EVENT,
            event_type = event_type.as_str(),
            listener_count = snapshot.len(),
            "dispatching event"
        );

        for listener in snapshot {
            if listener(event) == Propagation::Stop {
                tracing::trace!(
                    target: targets::EVENT,
                    event_type = event_type.as_str(),
                    "propagation stopped"
                );
                return false;
            }
        }
        true
    }

    /// Whether any listener is registered for `event_type`.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        let event_type = event_type.to_lowercase();
        self.listeners
            .lock()
            .slots
            .values()
            .any(|registration| registration.event_type == event_type)
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().slots.len()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        let mut listeners = self.listeners.lock();
        listeners.slots.clear();
        listeners.order.clear();
    }
}

impl<E> fmt::Debug for EventTarget<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listener_count", &self.listeners.lock().slots.len())
            .finish()
    }
}

/// Event surface for types that own an [`EventTarget`].
///
/// Implementors only provide [`event_target`](Self::event_target); the
/// listener operations come for free.
pub trait EventTargetMixin<E: Event + 'static> {
    /// The target holding this object's listeners.
    fn event_target(&self) -> &EventTarget<E>;

    /// Register a listener for `event_type`.
    fn add_event_listener(&self, event_type: &str, listener: EventListener<E>) -> ListenerId {
        self.event_target().add_event_listener(event_type, listener)
    }

    /// Remove a listener by id.
    fn remove_event_listener(&self, event_type: &str, id: ListenerId) -> bool {
        self.event_target().remove_event_listener(event_type, id)
    }

    /// Dispatch an event to this object's listeners.
    fn dispatch_event(&self, event: &E) -> bool {
        self.event_target().dispatch_event(event)
    }
}

static_assertions::assert_impl_all!(EventTarget<NamedEvent>: Send, Sync);

/// A payload-free event identified only by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEvent {
    event_type: String,
}

impl NamedEvent {
    /// Create an event of the given type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
        }
    }
}

impl Event for NamedEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }
}
