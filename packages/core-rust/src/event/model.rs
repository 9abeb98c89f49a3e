//! Event values and their type tags.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

/// Root of every event type chain.
pub static ROOT_EVENT: EventType = EventType::root("event");

/// Type tag for an event.
///
/// Each tag names at most one parent, forming a finite chain that ends at
/// [`ROOT_EVENT`]. A listener registered for a tag receives events whose own
/// tag is that tag or any descendant of it. Equality and hashing use the
/// name only, so names must be unique per process.
#[derive(Clone, Copy)]
pub struct EventType {
    name: &'static str,
    parent: Option<&'static EventType>,
}

impl EventType {
    /// Declares a type with no parent. Only [`ROOT_EVENT`] should use this.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Declares a subtype of `parent`.
    #[must_use]
    pub const fn new(name: &'static str, parent: &'static EventType) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn parent(&self) -> Option<&'static EventType> {
        self.parent
    }

    /// Walks from this type up to the root, starting with `self`.
    pub fn ancestors(&self) -> impl Iterator<Item = &EventType> {
        std::iter::successors(Some(self), |t| t.parent.map(|p| p as &EventType))
    }

    /// Returns `true` if an event tagged `other` should reach a listener
    /// registered for `self`.
    #[must_use]
    pub fn is_assignable_from(&self, other: &EventType) -> bool {
        other.ancestors().any(|t| t == self)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An immutable occurrence delivered to listeners.
///
/// Implementations are plain data: created by whatever detects the
/// occurrence and never mutated afterwards.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// The concrete type tag of this event.
    fn event_type(&self) -> &'static EventType;

    /// Describes the component that raised the event.
    fn source(&self) -> &str;

    /// Creation time in milliseconds since the Unix epoch.
    fn timestamp(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Event {
    /// Downcasts to a concrete event struct.
    #[must_use]
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Returns `true` if this event is tagged `event_type` or a subtype of it.
    #[must_use]
    pub fn is_instance_of(&self, event_type: &EventType) -> bool {
        event_type.is_assignable_from(self.event_type())
    }
}

/// Source and creation time shared by every event struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    pub source: String,
    pub timestamp: u64,
}

impl EventMetadata {
    /// Stamps `source` with the current wall-clock time.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            source: source.into(),
            timestamp: u64::try_from(timestamp).unwrap_or(u64::MAX),
        }
    }
}

/// An event tagged with the root type and carrying a free-form payload.
#[derive(Debug, Clone)]
pub struct GenericEvent {
    pub meta: EventMetadata,
    pub payload: String,
}

impl GenericEvent {
    #[must_use]
    pub fn new(source: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            meta: EventMetadata::new(source),
            payload: payload.into(),
        }
    }
}

impl Event for GenericEvent {
    fn event_type(&self) -> &'static EventType {
        &ROOT_EVENT
    }

    fn source(&self) -> &str {
        &self.meta.source
    }

    fn timestamp(&self) -> u64 {
        self.meta.timestamp
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
